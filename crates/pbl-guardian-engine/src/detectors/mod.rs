//! One detector per layer.
//!
//! Each module exposes a unit-struct detector plus the pure functions it is
//! built from, so the statistics can be tested without a context.

pub mod corpus;
pub mod equity;
pub mod forensics;
pub mod peer;
pub mod proofs;
pub mod public_code;
pub mod quality;
pub mod similarity;
pub mod synthetic;
pub mod timing;

pub use corpus::CorpusDetector;
pub use equity::EquityDetector;
pub use forensics::ForensicsDetector;
pub use peer::PeerDetector;
pub use proofs::ProofsDetector;
pub use public_code::PublicCodeDetector;
pub use quality::QualityDetector;
pub use synthetic::SyntheticOriginDetector;
pub use timing::TimingDetector;

/// Round to `places` decimals for display and stable digests.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
