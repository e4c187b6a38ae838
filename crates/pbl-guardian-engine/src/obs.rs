//! Structured lifecycle events for one evaluation.
//!
//! Every function here emits a single event with an `event` field so that
//! JSON log consumers can filter on it. Skips are `info`, tool failures are
//! `warn`, fatal faults are `error`.

use pbl_guardian_domain::{Layer, Signal, SignalStatus, Verdict};
use tracing::{error, info, warn};

use crate::collaborators::PublishOutcome;

/// Span tagging everything logged during an evaluation with the commit and
/// evaluation id. Attach it with `Instrument::instrument`.
pub fn evaluation_span(evaluation_id: &str, commit_sha: &str) -> tracing::Span {
    tracing::info_span!(
        "pbl_guardian.evaluation",
        evaluation_id = %evaluation_id,
        commit = %commit_sha,
    )
}

pub fn emit_evaluation_started(team_id: &str, commit_sha: &str, detectors: usize) {
    info!(
        event = "evaluation.started",
        team = %team_id,
        commit = %commit_sha,
        detectors = detectors,
    );
}

/// One detector produced its signal. Tool failures carry their reason in
/// the evidence and are raised to `warn`.
pub fn emit_detector_finished(signal: &Signal, duration_ms: u64, tool_failure: bool) {
    if tool_failure {
        warn!(
            event = "detector.finished",
            layer = %signal.layer,
            status = %signal.status,
            duration_ms = duration_ms,
            reason = signal.skip_reason.as_deref().unwrap_or(""),
        );
    } else if signal.status == SignalStatus::Skipped {
        info!(
            event = "detector.finished",
            layer = %signal.layer,
            status = %signal.status,
            duration_ms = duration_ms,
            reason = signal.skip_reason.as_deref().unwrap_or(""),
        );
    } else {
        info!(
            event = "detector.finished",
            layer = %signal.layer,
            status = %signal.status,
            duration_ms = duration_ms,
            score = signal.score.unwrap_or(0.0),
        );
    }
}

pub fn emit_detector_timed_out(layer: Layer, timeout_secs: u64) {
    warn!(event = "detector.timed_out", layer = %layer, timeout_secs = timeout_secs);
}

pub fn emit_detector_fault(layer: Layer, message: &dyn std::fmt::Display) {
    error!(event = "detector.fault", layer = %layer, error = %message);
}

pub fn emit_evaluation_finished(commit_sha: &str, verdict: Verdict, duration_ms: u64) {
    info!(
        event = "evaluation.finished",
        commit = %commit_sha,
        verdict = %verdict,
        duration_ms = duration_ms,
    );
}

pub fn emit_report_published(key: &str, outcome: PublishOutcome) {
    info!(event = "report.published", key = %key, outcome = %outcome);
}

pub fn emit_evaluation_failed(commit_sha: &str, error: &dyn std::fmt::Display) {
    error!(event = "evaluation.failed", commit = %commit_sha, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_inside_evaluation_span() {
        let _entered = evaluation_span("eval-1", "abc1234").entered();
        emit_detector_finished(&Signal::skipped(Layer::PublicCode, "no token"), 3, false);
        emit_detector_timed_out(Layer::Corpus, 90);
    }
}
