//! Detector contracts against real collaborators: a git repository in a
//! temp dir, the filesystem corpus and the filesystem report sink.

use std::path::Path;
use std::process::Command as StdCommand;
use std::sync::Arc;

use chrono::DateTime;
use pbl_guardian_domain::{Layer, SignalStatus, Submission, TeamConfig};
use pbl_guardian_engine::collaborators::corpus::FsCorpusProvider;
use pbl_guardian_engine::collaborators::git::{changed_files, commit_metadata, head_sha, GitHistory};
use pbl_guardian_engine::collaborators::proofs::ChangedFilesProofChecker;
use pbl_guardian_engine::collaborators::similarity::FingerprintSimilarity;
use pbl_guardian_engine::collaborators::sink::FsReportSink;
use pbl_guardian_engine::fakes::submission_at;
use pbl_guardian_engine::{
    load_tree, standard_detectors, Collaborators, DetectorError, EvaluationContext,
    EvaluationPipeline, PublishOutcome,
};

const CART_PY: &str = "\
def cart_total(items, tax_rate):
    subtotal = 0
    for item in items:
        subtotal += item.price * item.quantity
    tax = subtotal * tax_rate
    return round(subtotal + tax, 2)


def apply_discount(total, code):
    if code == 'STUDENT10':
        return total * 0.9
    if code == 'HALF':
        return total * 0.5
    return total


def format_receipt(items, total):
    lines = []
    for item in items:
        lines.append(f'{item.name}: {item.price}')
    lines.append(f'Total: {total}')
    return '\\n'.join(lines)
";

fn run_git(repo_dir: &Path, args: &[&str], date: Option<&str>) {
    let mut cmd = StdCommand::new("git");
    cmd.args(args).current_dir(repo_dir);
    if let Some(date) = date {
        cmd.env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date);
    }
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn commit_files(repo: &Path, files: &[(&str, &str)], author: &str, date: &str) {
    for (name, content) in files {
        let path = repo.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        run_git(repo, &["add", name], None);
    }
    let author_arg = format!("--author={} <{}@example.com>", author, author);
    run_git(
        repo,
        &["commit", "-q", &author_arg, "-m", "progress"],
        Some(date),
    );
}

fn make_team_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "-q"], None);
    run_git(dir.path(), &["config", "user.name", "test-user"], None);
    run_git(dir.path(), &["config", "user.email", "test@example.com"], None);
    commit_files(
        dir.path(),
        &[("src/cart.py", CART_PY)],
        "asha",
        "2026-02-24T11:00:00+05:30",
    );
    commit_files(
        dir.path(),
        &[
            ("src/__init__.py", "\n"),
            ("proofs/cart-demo.png", "png"),
        ],
        "ravi",
        "2026-02-26T18:30:00+05:30",
    );
    dir
}

async fn submission_from_repo(repo: &Path) -> Submission {
    let sha = head_sha(repo).await.unwrap();
    let (author, timestamp) = commit_metadata(repo, &sha).await.unwrap();
    Submission {
        changed_files: changed_files(repo, &sha).await.unwrap(),
        tree: load_tree(repo).unwrap(),
        commit_sha: sha,
        author,
        timestamp,
    }
}

fn reference_corpus() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let owner = dir.path().join("owner-ref");
    std::fs::create_dir_all(&owner).unwrap();
    std::fs::write(owner.join("solution.py"), CART_PY).unwrap();
    dir
}

fn collaborators(repo: &Path, corpus: &Path) -> Collaborators {
    Collaborators::new()
        .with_history(Arc::new(GitHistory::new(repo)))
        .with_proofs(Arc::new(ChangedFilesProofChecker::new().with_repo_root(repo)))
        .with_similarity(Arc::new(FingerprintSimilarity::default()))
        .with_corpus(Arc::new(FsCorpusProvider::new(corpus)))
}

fn config(threshold: u32) -> Arc<TeamConfig> {
    Arc::new(
        TeamConfig::from_json_str(&format!(
            r#"{{"team_id": "team-07", "timezone": "Asia/Kolkata", "plagiarism_threshold": {}}}"#,
            threshold
        ))
        .unwrap(),
    )
}

#[tokio::test]
async fn test_repository_evaluation_end_to_end() {
    let repo = make_team_repo();
    let corpus = reference_corpus();
    let reports = tempfile::tempdir().unwrap();

    let submission = Arc::new(submission_from_repo(repo.path()).await);
    assert_eq!(submission.author, "ravi");
    assert!(submission
        .changed_files
        .contains(&"proofs/cart-demo.png".to_string()));

    let pipeline = EvaluationPipeline::standard()
        .with_sink(Arc::new(FsReportSink::new(reports.path())));
    let ctx = EvaluationContext::new(
        submission.clone(),
        config(30),
        collaborators(repo.path(), corpus.path()),
    )
    .unwrap();
    let result = pipeline.run(ctx).await.unwrap();
    let report = &result.report;

    // The team copied the reference solution verbatim.
    let l1 = report.signal(Layer::Corpus);
    assert_eq!(l1.status, SignalStatus::Fail);
    assert!(l1.score.unwrap() >= 30.0);

    assert_eq!(report.signal(Layer::Proofs).status, SignalStatus::Pass);
    let equity = report.signal(Layer::Contribution);
    assert!(equity.evidence.iter().any(|l| l.contains("ravi")));
    assert!(!report.signal(Layer::HistoryForensics).is_skipped());

    let md = reports
        .path()
        .join(format!("{}.md", submission.commit_sha));
    let on_disk = std::fs::read_to_string(md).unwrap();
    assert_eq!(on_disk, result.rendered.markdown);
}

#[tokio::test]
async fn test_filesystem_sink_keeps_one_rendering_per_commit() {
    let repo = make_team_repo();
    let corpus = reference_corpus();
    let reports = tempfile::tempdir().unwrap();
    let submission = Arc::new(submission_from_repo(repo.path()).await);
    let pipeline = EvaluationPipeline::standard()
        .with_sink(Arc::new(FsReportSink::new(reports.path())));

    let run = |threshold| {
        EvaluationContext::new(
            submission.clone(),
            config(threshold),
            collaborators(repo.path(), corpus.path()),
        )
        .unwrap()
    };

    let first = pipeline.run(run(30)).await.unwrap();
    let again = pipeline.run(run(30)).await.unwrap();
    assert_eq!(first.publish, Some(PublishOutcome::Created));
    assert_eq!(again.publish, Some(PublishOutcome::Unchanged));

    // A policy change alters the signals, so the rendering is replaced.
    let changed = pipeline.run(run(100)).await.unwrap();
    assert_eq!(changed.publish, Some(PublishOutcome::Updated));

    let md_files = std::fs::read_dir(reports.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
        .count();
    assert_eq!(md_files, 1);
}

#[tokio::test]
async fn test_missing_prerequisites_never_fault() {
    let submission = submission_at(
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00+05:30").unwrap(),
        vec![],
    );
    let ctx = EvaluationContext::new(
        Arc::new(submission),
        Arc::new(TeamConfig::from_json_str(r#"{"team_id": "team-07"}"#).unwrap()),
        Collaborators::new(),
    )
    .unwrap();

    for detector in standard_detectors() {
        match detector.evaluate(&ctx).await {
            Ok(signal) => assert_eq!(signal.layer, detector.layer()),
            Err(DetectorError::Unavailable(reason)) => assert!(!reason.is_empty()),
            Err(other) => panic!("{} faulted: {}", detector.layer(), other),
        }
    }
}
