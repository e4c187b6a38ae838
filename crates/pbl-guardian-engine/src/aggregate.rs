//! Turning raw detector outcomes into a complete report.
//!
//! Prerequisite gaps, tool failures and timeouts all become skipped
//! signals. Internal errors, wrong-layer signals and panics become a fatal
//! `GuardianError::DetectorFault`, and the caller builds no report.

use std::time::Duration;

use pbl_guardian_domain::{GuardianError, Layer, Report, ReportMeta, Result, Signal};

use crate::error::DetectorError;

/// How one detector task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutcome {
    Finished(std::result::Result<Signal, DetectorError>),
    TimedOut(Duration),
    /// The task panicked or was cancelled.
    Aborted(String),
}

/// Normalize one outcome into the layer's signal.
pub fn normalize(layer: Layer, outcome: DetectorOutcome) -> Result<Signal> {
    match outcome {
        DetectorOutcome::Finished(Ok(signal)) => {
            if signal.layer != layer {
                return Err(GuardianError::DetectorFault {
                    layer,
                    message: format!("detector returned a signal for {}", signal.layer),
                });
            }
            Ok(signal)
        }
        DetectorOutcome::Finished(Err(DetectorError::Unavailable(reason))) => {
            Ok(Signal::skipped(layer, reason))
        }
        DetectorOutcome::Finished(Err(DetectorError::ToolFailure(reason))) => {
            Ok(Signal::skipped(layer, "external tool failed")
                .with_evidence([format!("Tool failure: {}", reason)]))
        }
        DetectorOutcome::Finished(Err(DetectorError::Internal(message))) => {
            Err(GuardianError::DetectorFault { layer, message })
        }
        DetectorOutcome::TimedOut(limit) => Ok(Signal::skipped(
            layer,
            format!("timed out after {}s", limit.as_secs()),
        )),
        DetectorOutcome::Aborted(message) => Err(GuardianError::DetectorFault { layer, message }),
    }
}

/// Whether the outcome is an external tool failure, for log levels.
pub fn is_tool_failure(outcome: &DetectorOutcome) -> bool {
    matches!(
        outcome,
        DetectorOutcome::Finished(Err(DetectorError::ToolFailure(_)))
    )
}

/// Build the report from normalized signals. Layers without a registered
/// detector are filled in as skipped.
pub fn aggregate(meta: ReportMeta, mut signals: Vec<Signal>) -> Result<Report> {
    for layer in Layer::CANONICAL {
        if !signals.iter().any(|s| s.layer == layer) {
            signals.push(Signal::skipped(layer, "detector not configured"));
        }
    }
    Report::assemble(meta, signals)
}
