//! Per-commit report assembled from exactly one signal per layer.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::error::{GuardianError, Result};
use crate::signal::{Layer, Signal, SignalStatus};

/// Report contract version. Bump when the serialized shape changes.
pub const REPORT_SCHEMA_VERSION: &str = "pbl-guardian.report.v1";

/// Overall verdict of one evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl Verdict {
    /// Fold signal statuses: any fail wins, then any warn. Skipped signals
    /// never move the verdict.
    pub fn from_signals<'a, I>(signals: I) -> Verdict
    where
        I: IntoIterator<Item = &'a Signal>,
    {
        let worst = signals
            .into_iter()
            .map(|s| s.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(SignalStatus::Pass);
        match worst {
            SignalStatus::Fail => Verdict::Fail,
            SignalStatus::Warn => Verdict::Warn,
            SignalStatus::Pass | SignalStatus::Skipped => Verdict::Pass,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Verdict::Pass => "✅",
            Verdict::Warn => "⚠️",
            Verdict::Fail => "🚨",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Warn => write!(f, "warn"),
            Verdict::Fail => write!(f, "fail"),
        }
    }
}

/// Submission metadata carried into the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub team_id: String,
    pub team_name: String,
    pub commit_sha: String,
    pub author: String,
    pub committed_at: DateTime<FixedOffset>,
    /// Milestone phase the commit was attributed to, if any.
    pub phase: Option<String>,
    /// Weekday name when the commit landed on a configured class day.
    #[serde(default)]
    pub class_day: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// The rendered-once aggregation of all signals for one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub meta: ReportMeta,
    /// One per layer, in `Layer::CANONICAL` order.
    pub signals: Vec<Signal>,
    pub verdict: Verdict,
    /// Digest of the commit id and signals, excluding the evaluation time.
    /// Identical re-runs produce identical digests.
    pub content_digest: ContentDigest,
}

impl Report {
    /// Build a report, enforcing exactly one signal per layer and sorting
    /// into canonical order regardless of completion order.
    pub fn assemble(meta: ReportMeta, signals: Vec<Signal>) -> Result<Report> {
        let mut slots: Vec<Option<Signal>> = vec![None; Layer::CANONICAL.len()];
        for signal in signals {
            let slot = &mut slots[signal.layer.ordinal()];
            if slot.is_some() {
                return Err(GuardianError::DuplicateSignal(signal.layer));
            }
            *slot = Some(signal);
        }

        let mut ordered = Vec::with_capacity(slots.len());
        for (layer, slot) in Layer::CANONICAL.into_iter().zip(slots) {
            ordered.push(slot.ok_or(GuardianError::MissingSignal(layer))?);
        }

        let verdict = Verdict::from_signals(&ordered);
        let content_digest = compute_content_digest(&meta.commit_sha, &ordered)?;

        Ok(Report {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            meta,
            signals: ordered,
            verdict,
            content_digest,
        })
    }

    /// Key under which sinks store this report. Re-runs for the same
    /// commit replace the earlier rendering.
    pub fn idempotency_key(&self) -> &str {
        &self.meta.commit_sha
    }

    pub fn signal(&self, layer: Layer) -> &Signal {
        // assemble() guarantees one signal per ordinal.
        &self.signals[layer.ordinal()]
    }

    /// Signals that ran and did not pass.
    pub fn flagged(&self) -> impl Iterator<Item = &Signal> {
        self.signals
            .iter()
            .filter(|s| matches!(s.status, SignalStatus::Warn | SignalStatus::Fail))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn compute_content_digest(commit_sha: &str, signals: &[Signal]) -> Result<ContentDigest> {
    let mut parts = vec![commit_sha.as_bytes().to_vec()];
    for signal in signals {
        parts.push(serde_json::to_vec(signal)?);
    }
    Ok(ContentDigest::from_parts(parts))
}
