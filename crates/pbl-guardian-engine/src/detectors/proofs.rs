//! Proof-of-work artifacts committed alongside code.

use async_trait::async_trait;
use pbl_guardian_domain::{Layer, Signal, SignalStatus};

use crate::collaborators::ProofSummary;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::DetectorError;

/// Shown in evidence when proofs are missing.
const PROOF_HINT: &str = "Add a screenshot or log of the change working to the proof directory";

pub fn proofs_signal(summary: &ProofSummary, proof_directory: &str) -> Signal {
    let mut evidence: Vec<String> = summary
        .proof_files
        .iter()
        .map(|f| format!("Proof: {}", f))
        .collect();
    if let Some(total) = summary.total_in_repository {
        evidence.push(format!("{} proof artifacts in {}", total, proof_directory));
    }

    if summary.code_files_changed == 0 {
        return Signal::pass(Layer::Proofs, 0.0, "No code changes, proof not required")
            .with_evidence(evidence);
    }

    if summary.total_proofs() == 0 {
        evidence.insert(
            0,
            format!(
                "{} code files changed, no files added under {}",
                summary.code_files_changed, proof_directory
            ),
        );
        evidence.push(PROOF_HINT.to_string());
        return Signal::new(
            Layer::Proofs,
            SignalStatus::Fail,
            1.0,
            "Code changed without proof",
        )
        .with_evidence(evidence);
    }

    let summary_line = format!(
        "{} proofs ({} screenshots, {} documents, {} other)",
        summary.total_proofs(),
        summary.screenshots,
        summary.documents,
        summary.other
    );
    Signal::pass(Layer::Proofs, 0.0, summary_line).with_evidence(evidence)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProofsDetector;

#[async_trait]
impl Detector for ProofsDetector {
    fn layer(&self) -> Layer {
        Layer::Proofs
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let checker = ctx
            .collaborators
            .proofs
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("proof checker not configured"))?;
        let summary = checker
            .check(&ctx.submission.changed_files, &ctx.config.proof_directory)
            .await?;
        Ok(proofs_signal(&summary, &ctx.config.proof_directory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_without_proof_fails() {
        let summary = ProofSummary {
            code_files_changed: 3,
            ..Default::default()
        };
        let signal = proofs_signal(&summary, "proofs/");
        assert_eq!(signal.status, SignalStatus::Fail);
        assert_eq!(
            signal.evidence[0],
            "3 code files changed, no files added under proofs/"
        );
    }

    #[test]
    fn test_no_code_changes_needs_no_proof() {
        let signal = proofs_signal(&ProofSummary::default(), "proofs/");
        assert_eq!(signal.status, SignalStatus::Pass);
        assert!(signal.summary.contains("not required"));
    }

    #[test]
    fn test_proofs_listed() {
        let summary = ProofSummary {
            screenshots: 1,
            documents: 1,
            code_files_changed: 2,
            proof_files: vec!["proofs/login.png".into(), "proofs/run.log".into()],
            total_in_repository: Some(9),
            ..Default::default()
        };
        let signal = proofs_signal(&summary, "proofs/");
        assert_eq!(signal.status, SignalStatus::Pass);
        assert_eq!(signal.summary, "2 proofs (1 screenshots, 1 documents, 0 other)");
        assert_eq!(
            signal.evidence,
            vec![
                "Proof: proofs/login.png".to_string(),
                "Proof: proofs/run.log".to_string(),
                "9 proof artifacts in proofs/".to_string(),
            ]
        );
    }
}
