//! PBL Guardian Domain Model
//!
//! Versioned contracts shared by the evaluation engine and its callers:
//! - TeamConfig: team calendar, thresholds and policy knobs (validated on load)
//! - Submission: one pushed commit plus its source tree snapshot
//! - CommitRecord: version-control history consumed by equity and forensics
//! - Signal: normalized output of one detector (status, score, evidence)
//! - Report: exactly one signal per layer in canonical order, plus a verdict
//!
//! Reports are content-addressed (SHA-256) so re-runs for the same commit
//! can be recognized as updates rather than duplicates.

pub mod config;
pub mod digest;
pub mod error;
pub mod report;
pub mod signal;
pub mod submission;

pub use config::{
    FeatureWeights, ForensicsPolicy, Milestone, SyntheticPolicy, TeamConfig, TimeoutPolicy,
    CONFIG_SCHEMA_VERSION, MAX_WINDOW_HOURS,
};
pub use digest::ContentDigest;
pub use error::{GuardianError, Result};
pub use report::{Report, ReportMeta, Verdict, REPORT_SCHEMA_VERSION};
pub use signal::{Layer, Signal, SignalStatus};
pub use submission::{CommitRecord, FileDelta, SourceFile, SourceTree, Submission};

/// PBL Guardian domain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
