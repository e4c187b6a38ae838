//! PBL Guardian evaluation engine.
//!
//! Runs one detector per layer against a pushed commit and aggregates the
//! results into a single report:
//! - Timing, quality, proofs and contribution equity
//! - L1 reference corpus, L2 peer and L3 public-code similarity
//! - L4 synthetic-origin heuristics and L5 history forensics
//!
//! Detectors run in parallel, each bounded by a per-layer timeout. Missing
//! prerequisites, tool failures and timeouts become skipped signals;
//! internal faults abort the evaluation before anything is published.
//!
//! External systems (git, pylint, code search, report storage) sit behind
//! the collaborator traits in [`collaborators`]; [`fakes`] holds in-memory
//! versions for tests.

pub mod aggregate;
pub mod cache;
pub mod collaborators;
pub mod context;
pub mod detector;
pub mod detectors;
pub mod error;
pub mod fakes;
pub mod language;
pub mod obs;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod telemetry;

pub use aggregate::{aggregate, normalize, DetectorOutcome};
pub use cache::{CacheStats, QueryCache, QueryKey};
pub use collaborators::{Collaborators, HistoryRange, PublishOutcome, ReportSink};
pub use context::EvaluationContext;
pub use detector::{standard_detectors, Detector, DetectorResult};
pub use error::{CollaboratorError, CollaboratorResult, DetectorError};
pub use language::LanguageProfile;
pub use pipeline::{EvaluationPipeline, EvaluationResult};
pub use render::RenderedReport;
pub use source::load_tree;
pub use telemetry::init_tracing;

/// PBL Guardian engine version, shown in rendered report footers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
