//! Code quality from the configured linter.

use async_trait::async_trait;
use pbl_guardian_domain::{Layer, Signal, SignalStatus, SourceFile};

use super::round_to;
use crate::collaborators::QualityOutcome;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::DetectorError;

/// Map a linter outcome onto a signal. Signal score is `10 - quality`.
pub fn quality_signal(outcome: &QualityOutcome, min_score: f64, warn_margin: f64) -> Signal {
    let status = if outcome.score < min_score {
        SignalStatus::Fail
    } else if outcome.score < min_score + warn_margin {
        SignalStatus::Warn
    } else {
        SignalStatus::Pass
    };
    let concern = round_to((10.0 - outcome.score).clamp(0.0, 10.0), 2);
    let summary = format!(
        "Score {:.2}/10 (minimum {:.1}), {} issues",
        outcome.score, min_score, outcome.total_issues
    );

    let mut evidence = vec![format!("Files checked: {}", outcome.files_checked)];
    if outcome.total_issues > outcome.issues.len() {
        evidence.push(format!(
            "Top {} of {} issues:",
            outcome.issues.len(),
            outcome.total_issues
        ));
    }
    evidence.extend(
        outcome
            .issues
            .iter()
            .map(|i| format!("{}:{} [{}] {}", i.path, i.line, i.symbol, i.message)),
    );
    Signal::new(Layer::Quality, status, concern, summary).with_evidence(evidence)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QualityDetector;

#[async_trait]
impl Detector for QualityDetector {
    fn layer(&self) -> Layer {
        Layer::Quality
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let checker = ctx
            .collaborators
            .quality
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("code-quality checker not configured"))?;
        if !checker.supports(&ctx.config.language) {
            return Err(DetectorError::Unavailable(format!(
                "{} does not support {}",
                checker.name(),
                ctx.config.language
            )));
        }
        let files: Vec<SourceFile> = ctx.eligible_files().into_iter().cloned().collect();
        if files.is_empty() {
            return Err(DetectorError::unavailable("no eligible source files"));
        }

        let outcome = checker.check(&files).await?;
        Ok(quality_signal(
            &outcome,
            ctx.config.min_quality_score,
            ctx.config.quality_warn_margin,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Collaborators, QualityIssue};
    use crate::error::CollaboratorError;
    use crate::fakes::{submission_at, StaticQualityChecker};
    use chrono::DateTime;
    use pbl_guardian_domain::TeamConfig;
    use std::sync::Arc;

    fn outcome(score: f64, issues: usize, total: usize) -> QualityOutcome {
        QualityOutcome {
            score,
            issues: (0..issues)
                .map(|i| QualityIssue {
                    path: "app.py".into(),
                    line: i as u32 + 1,
                    symbol: "unused-variable".into(),
                    message: "Unused variable 'x'".into(),
                })
                .collect(),
            total_issues: total,
            files_checked: 3,
        }
    }

    fn ctx(files: Vec<SourceFile>, checker: Option<StaticQualityChecker>) -> EvaluationContext {
        let submission = submission_at(
            DateTime::parse_from_rfc3339("2026-03-01T10:00:00+05:30").unwrap(),
            files,
        );
        let mut collaborators = Collaborators::new();
        if let Some(c) = checker {
            collaborators = collaborators.with_quality(Arc::new(c));
        }
        let config = TeamConfig::from_json_str(r#"{"team_id": "t1"}"#).unwrap();
        EvaluationContext::new(Arc::new(submission), Arc::new(config), collaborators).unwrap()
    }

    #[test]
    fn test_status_bands() {
        assert_eq!(quality_signal(&outcome(6.9, 0, 0), 7.0, 1.0).status, SignalStatus::Fail);
        assert_eq!(quality_signal(&outcome(7.5, 0, 0), 7.0, 1.0).status, SignalStatus::Warn);
        assert_eq!(quality_signal(&outcome(8.0, 0, 0), 7.0, 1.0).status, SignalStatus::Pass);
    }

    #[test]
    fn test_score_is_inverted_and_issues_listed() {
        let signal = quality_signal(&outcome(6.42, 5, 17), 7.0, 1.0);
        assert_eq!(signal.score, Some(3.58));
        assert!(signal.evidence.contains(&"Top 5 of 17 issues:".to_string()));
        assert!(signal
            .evidence
            .contains(&"app.py:1 [unused-variable] Unused variable 'x'".to_string()));
        assert_eq!(signal.evidence.len(), 7);
    }

    #[tokio::test]
    async fn test_zero_files_is_skipped() {
        let ctx = ctx(
            vec![SourceFile::new("README.md", "# notes\n")],
            Some(StaticQualityChecker::new(9.0)),
        );
        let err = QualityDetector.evaluate(&ctx).await.unwrap_err();
        assert_eq!(err, DetectorError::unavailable("no eligible source files"));
    }

    #[tokio::test]
    async fn test_missing_checker_is_unavailable() {
        let ctx = ctx(vec![SourceFile::new("app.py", "x = 1\n")], None);
        assert!(matches!(
            QualityDetector.evaluate(&ctx).await,
            Err(DetectorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_checker_failure_is_tool_failure() {
        let ctx = ctx(
            vec![SourceFile::new("app.py", "x = 1\n")],
            Some(StaticQualityChecker::failing(CollaboratorError::Timeout { secs: 60 })),
        );
        assert!(matches!(
            QualityDetector.evaluate(&ctx).await,
            Err(DetectorError::ToolFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_checker_score_flows_into_signal() {
        let ctx = ctx(
            vec![
                SourceFile::new("app.py", "x = 1\n"),
                SourceFile::new("venv/lib/site.py", "y = 2\n"),
            ],
            Some(StaticQualityChecker::new(8.5)),
        );
        let signal = QualityDetector.evaluate(&ctx).await.unwrap();
        assert_eq!(signal.status, SignalStatus::Pass);
        assert_eq!(signal.evidence[0], "Files checked: 1");
    }
}
