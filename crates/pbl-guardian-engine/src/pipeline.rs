//! Evaluation orchestration.
//!
//! One tokio task per detector, each bounded by its layer's timeout. The
//! pipeline waits for every task before building the report, so a report
//! is either complete or not produced at all.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use pbl_guardian_domain::{GuardianError, Layer, Report, ReportMeta, Result};
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregate::{aggregate, is_tool_failure, normalize, DetectorOutcome};
use crate::collaborators::{PublishOutcome, ReportSink};
use crate::context::EvaluationContext;
use crate::detector::{standard_detectors, Detector};
use crate::detectors::timing::attribute;
use crate::obs;
use crate::render::RenderedReport;

/// Result of one complete evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub evaluation_id: String,
    pub report: Report,
    pub rendered: RenderedReport,
    /// `None` when the pipeline has no sink.
    pub publish: Option<PublishOutcome>,
    pub duration_ms: u64,
}

/// Runs a fixed set of detectors against one evaluation context.
pub struct EvaluationPipeline {
    detectors: Vec<Arc<dyn Detector>>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl std::fmt::Debug for EvaluationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layers: Vec<Layer> = self.detectors.iter().map(|d| d.layer()).collect();
        f.debug_struct("EvaluationPipeline")
            .field("layers", &layers)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl EvaluationPipeline {
    /// Build a pipeline. Two detectors for the same layer is a
    /// configuration fault.
    pub fn new(detectors: Vec<Arc<dyn Detector>>) -> Result<Self> {
        let mut seen = Vec::with_capacity(detectors.len());
        for detector in &detectors {
            let layer = detector.layer();
            if seen.contains(&layer) {
                return Err(GuardianError::invalid_config(format!(
                    "more than one detector registered for {}",
                    layer
                )));
            }
            seen.push(layer);
        }
        Ok(EvaluationPipeline {
            detectors,
            sink: None,
        })
    }

    /// Pipeline with one built-in detector per layer.
    pub fn standard() -> Self {
        EvaluationPipeline {
            detectors: standard_detectors(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.detectors.iter().map(|d| d.layer()).collect()
    }

    /// Evaluate one submission and publish the rendering.
    ///
    /// Fatal errors (bad config, detector faults, sink failures) are
    /// returned as `GuardianError` and nothing is published.
    pub async fn run(&self, ctx: EvaluationContext) -> Result<EvaluationResult> {
        let evaluation_id = Uuid::new_v4().to_string();
        let commit_sha = ctx.submission.commit_sha.clone();
        let span = obs::evaluation_span(&evaluation_id, &commit_sha);

        let result = self
            .run_inner(Arc::new(ctx), evaluation_id)
            .instrument(span)
            .await;
        if let Err(err) = &result {
            obs::emit_evaluation_failed(&commit_sha, err);
        }
        result
    }

    async fn run_inner(
        &self,
        ctx: Arc<EvaluationContext>,
        evaluation_id: String,
    ) -> Result<EvaluationResult> {
        let start = Instant::now();
        ctx.config.validate()?;
        let attribution = attribute(&ctx.config, ctx.submission.timestamp)?;

        obs::emit_evaluation_started(
            &ctx.config.team_id,
            &ctx.submission.commit_sha,
            self.detectors.len(),
        );

        let tasks = self.detectors.iter().map(|detector| {
            let layer = detector.layer();
            let limit = ctx.config.timeouts.timeout_for(layer);
            let detector = Arc::clone(detector);
            let task_ctx = Arc::clone(&ctx);
            let handle = tokio::spawn(
                async move {
                    let started = Instant::now();
                    let outcome =
                        match tokio::time::timeout(limit, detector.evaluate(&task_ctx)).await {
                            Ok(result) => DetectorOutcome::Finished(result),
                            Err(_) => DetectorOutcome::TimedOut(limit),
                        };
                    (outcome, started.elapsed())
                }
                .in_current_span(),
            );
            async move {
                match handle.await {
                    Ok((outcome, elapsed)) => (layer, outcome, elapsed.as_millis() as u64),
                    Err(join_err) => (
                        layer,
                        DetectorOutcome::Aborted(format!("detector task failed: {}", join_err)),
                        0,
                    ),
                }
            }
        });
        let outcomes = join_all(tasks).await;

        let mut signals = Vec::with_capacity(outcomes.len());
        let mut fault = None;
        for (layer, outcome, duration_ms) in outcomes {
            if let DetectorOutcome::TimedOut(limit) = &outcome {
                obs::emit_detector_timed_out(layer, limit.as_secs());
            }
            let tool_failure = is_tool_failure(&outcome);
            match normalize(layer, outcome) {
                Ok(signal) => {
                    obs::emit_detector_finished(&signal, duration_ms, tool_failure);
                    signals.push(signal);
                }
                Err(err) => {
                    obs::emit_detector_fault(layer, &err);
                    fault.get_or_insert(err);
                }
            }
        }
        if let Some(err) = fault {
            return Err(err);
        }

        let meta = ReportMeta {
            team_id: ctx.config.team_id.clone(),
            team_name: ctx.config.display_name().to_string(),
            commit_sha: ctx.submission.commit_sha.clone(),
            author: ctx.submission.author.clone(),
            committed_at: ctx.submission.timestamp,
            phase: attribution.phase(),
            class_day: attribution.class_day.clone(),
            evaluated_at: Utc::now(),
        };
        let report = aggregate(meta, signals)?;
        let rendered = RenderedReport::from_report(&report)?;

        let publish = match &self.sink {
            Some(sink) => {
                let outcome = sink
                    .publish(&rendered)
                    .await
                    .map_err(|e| GuardianError::Sink(e.to_string()))?;
                obs::emit_report_published(&rendered.key, outcome);
                Some(outcome)
            }
            None => None,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_evaluation_finished(&report.meta.commit_sha, report.verdict, duration_ms);

        Ok(EvaluationResult {
            evaluation_id,
            report,
            rendered,
            publish,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Collaborators;
    use crate::error::DetectorError;
    use crate::fakes::{submission_at, FixedDetector, MemoryReportSink, PanickingDetector};
    use chrono::DateTime;
    use pbl_guardian_domain::{Signal, SignalStatus, TeamConfig, Verdict};

    fn ctx() -> EvaluationContext {
        let submission = submission_at(
            DateTime::parse_from_rfc3339("2026-03-01T10:00:00+05:30").unwrap(),
            vec![],
        );
        EvaluationContext::new(
            Arc::new(submission),
            Arc::new(
                TeamConfig::from_json_str(r#"{"team_id": "team-07", "team_name": "Byte Wizards"}"#)
                    .unwrap(),
            ),
            Collaborators::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_layer_is_rejected() {
        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(FixedDetector::signal(Signal::pass(Layer::Timing, 0.0, "ok"))),
            Arc::new(FixedDetector::signal(Signal::pass(Layer::Timing, 0.0, "ok"))),
        ];
        let err = EvaluationPipeline::new(detectors).unwrap_err();
        assert!(matches!(err, GuardianError::InvalidConfig(_)));
    }

    #[test]
    fn test_standard_pipeline_covers_every_layer() {
        assert_eq!(
            EvaluationPipeline::standard().layers(),
            Layer::CANONICAL.to_vec()
        );
    }

    #[tokio::test]
    async fn test_partial_registration_fills_remaining_layers() {
        let sink = Arc::new(MemoryReportSink::new());
        let pipeline = EvaluationPipeline::new(vec![Arc::new(FixedDetector::signal(
            Signal::new(Layer::Peer, SignalStatus::Fail, 62.0, "Max similarity 62%"),
        ))])
        .unwrap()
        .with_sink(sink.clone());

        let result = pipeline.run(ctx()).await.unwrap();
        assert_eq!(result.report.verdict, Verdict::Fail);
        assert_eq!(result.report.meta.team_name, "Byte Wizards");
        assert_eq!(result.publish, Some(PublishOutcome::Created));
        assert_eq!(
            result.report.signal(Layer::Quality).skip_reason.as_deref(),
            Some("detector not configured")
        );
        assert_eq!(sink.visible_count(), 1);
    }

    #[tokio::test]
    async fn test_internal_error_publishes_nothing() {
        let sink = Arc::new(MemoryReportSink::new());
        let pipeline = EvaluationPipeline::new(vec![
            Arc::new(FixedDetector::signal(Signal::pass(Layer::Timing, 0.0, "ok"))),
            Arc::new(FixedDetector::new(
                Layer::Contribution,
                Err(DetectorError::Internal("share out of range".into())),
            )),
        ])
        .unwrap()
        .with_sink(sink.clone());

        let err = pipeline.run(ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            GuardianError::DetectorFault { layer: Layer::Contribution, .. }
        ));
        assert_eq!(sink.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_detector_is_fatal() {
        let pipeline = EvaluationPipeline::new(vec![Arc::new(PanickingDetector {
            layer: Layer::SyntheticOrigin,
        })])
        .unwrap();
        let err = pipeline.run(ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            GuardianError::DetectorFault { layer: Layer::SyntheticOrigin, .. }
        ));
    }
}
