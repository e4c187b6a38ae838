//! End-to-end pipeline behavior with in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use pbl_guardian_domain::{
    CommitRecord, GuardianError, Layer, Signal, SignalStatus, SourceFile, TeamConfig, Verdict,
};
use pbl_guardian_engine::collaborators::ProofSummary;
use pbl_guardian_engine::fakes::{
    submission_at, FixedDetector, MemoryReportSink, PanickingDetector, SlowDetector,
    StaticCorpusProvider, StaticHistory, StaticProofChecker, StaticQualityChecker,
    StaticSimilarityTool,
};
use pbl_guardian_engine::{
    Collaborators, Detector, EvaluationContext, EvaluationPipeline, PublishOutcome,
};

const APP_PY: &str = "\
import json

# TODO: move to settings
DEFAULT_RATE = 0.18


def load(path):
    with open(path) as fh:
        return json.load(fh)


def total(items):
    acc = 0
    for it in items:
        acc += it['price'] * it['qty']
    print(acc)
    return acc
";

fn ts(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

fn config(json: &str) -> Arc<TeamConfig> {
    Arc::new(TeamConfig::from_json_str(json).unwrap())
}

fn two_author_history() -> Vec<CommitRecord> {
    vec![
        CommitRecord::new("a1b2c3d", "asha", ts("2026-02-20T10:00:00+05:30"), 60, 0),
        CommitRecord::new("b2c3d4e", "ravi", ts("2026-02-22T15:00:00+05:30"), 45, 5),
        CommitRecord::new("c3d4e5f", "asha", ts("2026-02-25T11:00:00+05:30"), 30, 2),
        CommitRecord::new("d4e5f6a", "ravi", ts("2026-02-27T16:00:00+05:30"), 38, 4),
    ]
}

fn full_context(config: Arc<TeamConfig>) -> EvaluationContext {
    let submission = submission_at(
        ts("2026-02-27T16:00:00+05:30"),
        vec![
            SourceFile::new("src/app.py", APP_PY),
            SourceFile::new("proofs/run.png", ""),
        ],
    );
    let proofs = ProofSummary {
        screenshots: 1,
        code_files_changed: 1,
        proof_files: vec!["proofs/run.png".to_string()],
        ..ProofSummary::default()
    };
    let collaborators = Collaborators::new()
        .with_history(Arc::new(StaticHistory::new(two_author_history())))
        .with_quality(Arc::new(StaticQualityChecker::new(8.6)))
        .with_proofs(Arc::new(StaticProofChecker::new(proofs)))
        .with_similarity(Arc::new(StaticSimilarityTool::matching(
            "owner-ref",
            "src/app.py",
            12.0,
        )))
        .with_corpus(Arc::new(StaticCorpusProvider::from_sources([(
            "owner-ref",
            "ref.py",
            "def unrelated():\n    return 0\n",
        )])));
    EvaluationContext::new(Arc::new(submission), config, collaborators).unwrap()
}

fn bare_context(config: Arc<TeamConfig>, files: Vec<SourceFile>) -> EvaluationContext {
    let submission = submission_at(ts("2026-03-01T10:00:00+05:30"), files);
    EvaluationContext::new(Arc::new(submission), config, Collaborators::new()).unwrap()
}

const TEAM: &str = r#"{
    "team_id": "team-07",
    "team_name": "Byte Wizards",
    "timezone": "Asia/Kolkata",
    "milestones": [{"phase": "Phase 1 - Setup", "deadline": "2026-03-10"}]
}"#;

#[tokio::test]
async fn test_rerender_same_commit_is_not_a_duplicate() {
    let sink = Arc::new(MemoryReportSink::new());
    let pipeline = EvaluationPipeline::standard().with_sink(sink.clone());

    let first = pipeline.run(full_context(config(TEAM))).await.unwrap();
    let second = pipeline.run(full_context(config(TEAM))).await.unwrap();

    assert_eq!(first.publish, Some(PublishOutcome::Created));
    assert_eq!(second.publish, Some(PublishOutcome::Unchanged));
    assert_eq!(sink.visible_count(), 1);
    assert_eq!(sink.publish_count(), 2);
    assert_eq!(first.rendered.markdown, second.rendered.markdown);
    assert_ne!(first.evaluation_id, second.evaluation_id);
}

#[tokio::test]
async fn test_full_evaluation_runs_every_layer() {
    let result = EvaluationPipeline::standard()
        .run(full_context(config(TEAM)))
        .await
        .unwrap();
    let report = &result.report;

    assert_eq!(report.meta.team_name, "Byte Wizards");
    assert_eq!(report.meta.phase.as_deref(), Some("Phase 1 - Setup"));
    assert_eq!(report.signal(Layer::Timing).status, SignalStatus::Pass);
    assert_eq!(report.signal(Layer::Quality).status, SignalStatus::Pass);
    assert_eq!(report.signal(Layer::Proofs).status, SignalStatus::Pass);
    assert_eq!(report.signal(Layer::Corpus).status, SignalStatus::Pass);
    assert!(!report.signal(Layer::Contribution).is_skipped());
    assert!(!report.signal(Layer::HistoryForensics).is_skipped());
    assert!(!report.signal(Layer::SyntheticOrigin).is_skipped());
    // No peer store and no search credentials.
    assert!(report.signal(Layer::Peer).is_skipped());
    assert!(report.signal(Layer::PublicCode).is_skipped());
    assert!(result.rendered.markdown.contains("team-07"));
}

#[tokio::test]
async fn test_single_author_code_dump_escalates_verdict() {
    let history = vec![
        CommitRecord::new("a1b2c3d", "asha", ts("2026-02-20T10:00:00+05:30"), 40, 0),
        CommitRecord::new("b2c3d4e", "asha", ts("2026-02-22T15:00:00+05:30"), 25, 3),
        CommitRecord::new("c3d4e5f", "asha", ts("2026-02-27T23:10:00+05:30"), 2096, 0),
        CommitRecord::new("d4e5f6a", "asha", ts("2026-02-28T09:00:00+05:30"), 13, 1),
    ];
    let submission = submission_at(ts("2026-02-28T09:00:00+05:30"), vec![]);
    let collaborators = Collaborators::new().with_history(Arc::new(StaticHistory::new(history)));
    let ctx =
        EvaluationContext::new(Arc::new(submission), config(TEAM), collaborators).unwrap();

    let result = EvaluationPipeline::standard().run(ctx).await.unwrap();
    let forensics = result.report.signal(Layer::HistoryForensics);

    assert_eq!(forensics.status, SignalStatus::Fail);
    assert!(forensics.evidence.iter().any(|line| line.contains("2096")));
    assert_ne!(result.report.verdict, Verdict::Pass);
    // One author: perfectly balanced by definition.
    assert_eq!(result.report.signal(Layer::Contribution).score, Some(0.0));
}

#[tokio::test]
async fn test_missing_search_credentials_skip_without_affecting_verdict() {
    let result = EvaluationPipeline::standard()
        .run(bare_context(
            config(r#"{"team_id": "team-07"}"#),
            vec![SourceFile::new("app.py", APP_PY)],
        ))
        .await
        .unwrap();
    let l3 = result.report.signal(Layer::PublicCode);
    assert_eq!(l3.status, SignalStatus::Skipped);
    assert_eq!(
        l3.skip_reason.as_deref(),
        Some("search credentials not configured")
    );
    assert_eq!(result.report.verdict, Verdict::Pass);
}

#[tokio::test]
async fn test_zero_milestones_yield_timing_pass() {
    let result = EvaluationPipeline::standard()
        .run(bare_context(config(r#"{"team_id": "team-07"}"#), vec![]))
        .await
        .unwrap();
    assert_eq!(
        result.report.signal(Layer::Timing).status,
        SignalStatus::Pass
    );
    assert_eq!(result.report.meta.phase, None);
}

#[tokio::test]
async fn test_zero_eligible_files_skip_quality_and_synthetic() {
    let submission = submission_at(
        ts("2026-03-01T10:00:00+05:30"),
        vec![
            SourceFile::new("README.md", "# Team 07\n"),
            SourceFile::new("venv/lib/site.py", "x = 1\n"),
        ],
    );
    let collaborators =
        Collaborators::new().with_quality(Arc::new(StaticQualityChecker::new(9.5)));
    let ctx = EvaluationContext::new(
        Arc::new(submission),
        config(r#"{"team_id": "team-07"}"#),
        collaborators,
    )
    .unwrap();

    let result = EvaluationPipeline::standard().run(ctx).await.unwrap();
    assert_eq!(
        result.report.signal(Layer::Quality).status,
        SignalStatus::Skipped
    );
    assert_eq!(
        result.report.signal(Layer::SyntheticOrigin).status,
        SignalStatus::Skipped
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_layer_times_out_without_touching_others() {
    let detectors: Vec<Arc<dyn Detector>> = vec![
        Arc::new(FixedDetector::signal(Signal::new(
            Layer::Timing,
            SignalStatus::Warn,
            0.0,
            "Due in 5 hours",
        ))),
        Arc::new(SlowDetector {
            layer: Layer::Corpus,
            delay: Duration::from_secs(600),
        }),
        Arc::new(FixedDetector::signal(Signal::pass(
            Layer::Peer,
            8.0,
            "Max similarity 8%",
        ))),
    ];
    let pipeline = EvaluationPipeline::new(detectors).unwrap();
    let ctx = bare_context(
        config(r#"{"team_id": "team-07", "timeouts": {"per_layer": {"l1_corpus": 1}}}"#),
        vec![],
    );

    let report = pipeline.run(ctx).await.unwrap().report;
    let corpus = report.signal(Layer::Corpus);
    assert_eq!(corpus.status, SignalStatus::Skipped);
    assert_eq!(corpus.skip_reason.as_deref(), Some("timed out after 1s"));
    assert_eq!(report.signal(Layer::Timing).summary, "Due in 5 hours");
    assert_eq!(report.signal(Layer::Peer).score, Some(8.0));
    assert_eq!(report.verdict, Verdict::Warn);
}

#[tokio::test]
async fn test_panicking_detector_aborts_without_publishing() {
    let sink = Arc::new(MemoryReportSink::new());
    let detectors: Vec<Arc<dyn Detector>> = vec![
        Arc::new(FixedDetector::signal(Signal::pass(Layer::Timing, 0.0, "ok"))),
        Arc::new(PanickingDetector {
            layer: Layer::Contribution,
        }),
    ];
    let pipeline = EvaluationPipeline::new(detectors)
        .unwrap()
        .with_sink(sink.clone());

    let err = pipeline
        .run(bare_context(config(r#"{"team_id": "team-07"}"#), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GuardianError::DetectorFault {
            layer: Layer::Contribution,
            ..
        }
    ));
    assert_eq!(sink.publish_count(), 0);
}

#[tokio::test]
async fn test_report_order_is_canonical_regardless_of_registration() {
    let detectors: Vec<Arc<dyn Detector>> = Layer::CANONICAL
        .into_iter()
        .rev()
        .map(|layer| {
            Arc::new(FixedDetector::signal(Signal::pass(layer, 0.0, "ok"))) as Arc<dyn Detector>
        })
        .collect();
    let report = EvaluationPipeline::new(detectors)
        .unwrap()
        .run(bare_context(config(r#"{"team_id": "team-07"}"#), vec![]))
        .await
        .unwrap()
        .report;
    let layers: Vec<Layer> = report.signals.iter().map(|s| s.layer).collect();
    assert_eq!(layers, Layer::CANONICAL.to_vec());
}
