//! In-memory fakes for collaborator traits (testing only)
//!
//! Every collaborator trait has a fake here that answers from canned data
//! and counts how often it was called, plus detector stubs for exercising
//! the pipeline's timeout and fault handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use pbl_guardian_domain::{CommitRecord, Layer, Signal, SourceFile, SourceTree, Submission};

use crate::collaborators::*;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::render::RenderedReport;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A submission with the given files, authored by `asha` at `timestamp`.
pub fn submission_at(timestamp: DateTime<FixedOffset>, files: Vec<SourceFile>) -> Submission {
    Submission {
        commit_sha: "4f2a9c1e7b3d5a8f0c6e2b9d1a7f3c5e8b0d2a4f".to_string(),
        author: "asha".to_string(),
        timestamp,
        changed_files: files.iter().map(|f| f.path.clone()).collect(),
        tree: SourceTree::new(files),
    }
}

// ---------------------------------------------------------------------------
// StaticHistory
// ---------------------------------------------------------------------------

/// History provider returning a fixed commit list.
#[derive(Debug, Default)]
pub struct StaticHistory {
    commits: Vec<CommitRecord>,
    error: Option<CollaboratorError>,
    calls: AtomicUsize,
}

impl StaticHistory {
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        StaticHistory {
            commits,
            ..Default::default()
        }
    }

    pub fn failing(error: CollaboratorError) -> Self {
        StaticHistory {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryProvider for StaticHistory {
    async fn commits(&self, _range: &HistoryRange) -> CollaboratorResult<Vec<CommitRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.commits.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticQualityChecker
// ---------------------------------------------------------------------------

/// Quality checker with a fixed score, issue list and per-revision scores.
#[derive(Debug)]
pub struct StaticQualityChecker {
    languages: Vec<String>,
    score: f64,
    issues: Vec<QualityIssue>,
    error: Option<CollaboratorError>,
    revisions: Vec<RevisionScore>,
}

impl StaticQualityChecker {
    /// Supports python only.
    pub fn new(score: f64) -> Self {
        StaticQualityChecker {
            languages: vec!["python".to_string()],
            score,
            issues: Vec::new(),
            error: None,
            revisions: Vec::new(),
        }
    }

    pub fn failing(error: CollaboratorError) -> Self {
        StaticQualityChecker {
            error: Some(error),
            ..StaticQualityChecker::new(0.0)
        }
    }

    pub fn with_issues(mut self, issues: Vec<QualityIssue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_revisions<I, S>(mut self, scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.revisions = scores
            .into_iter()
            .map(|(sha, score)| RevisionScore {
                sha: sha.into(),
                score,
            })
            .collect();
        self
    }
}

#[async_trait]
impl QualityChecker for StaticQualityChecker {
    fn name(&self) -> &str {
        "static-quality"
    }

    fn supports(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    async fn check(&self, files: &[SourceFile]) -> CollaboratorResult<QualityOutcome> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        Ok(QualityOutcome {
            score: self.score,
            issues: self.issues.clone(),
            total_issues: self.issues.len(),
            files_checked: files.len(),
        })
    }

    async fn score_revisions(
        &self,
        _commits: &[CommitRecord],
    ) -> CollaboratorResult<Vec<RevisionScore>> {
        Ok(self.revisions.clone())
    }
}

// ---------------------------------------------------------------------------
// StaticProofChecker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct StaticProofChecker {
    summary: ProofSummary,
}

impl StaticProofChecker {
    pub fn new(summary: ProofSummary) -> Self {
        StaticProofChecker { summary }
    }
}

#[async_trait]
impl ProofChecker for StaticProofChecker {
    async fn check(
        &self,
        _changed_files: &[String],
        _proof_directory: &str,
    ) -> CollaboratorResult<ProofSummary> {
        Ok(self.summary.clone())
    }
}

// ---------------------------------------------------------------------------
// StaticSimilarityTool
// ---------------------------------------------------------------------------

/// Similarity tool returning a fixed report for any input.
#[derive(Debug, Default)]
pub struct StaticSimilarityTool {
    report: SimilarityReport,
    error: Option<CollaboratorError>,
    calls: AtomicUsize,
}

impl StaticSimilarityTool {
    pub fn new(report: SimilarityReport) -> Self {
        StaticSimilarityTool {
            report,
            ..Default::default()
        }
    }

    /// One match against `source_id` at `percentage`.
    pub fn matching(source_id: &str, subject_path: &str, percentage: f64) -> Self {
        StaticSimilarityTool::new(SimilarityReport::from_matches(vec![SimilarityMatch {
            source_id: source_id.to_string(),
            subject_path: subject_path.to_string(),
            percentage,
        }]))
    }

    pub fn failing(error: CollaboratorError) -> Self {
        StaticSimilarityTool {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimilarityTool for StaticSimilarityTool {
    fn name(&self) -> &str {
        "static-similarity"
    }

    async fn compare(
        &self,
        _subject: &[SourceFile],
        _corpus: &Corpus,
    ) -> CollaboratorResult<SimilarityReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.report.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticCorpusProvider
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StaticCorpusProvider {
    corpus: Corpus,
}

impl StaticCorpusProvider {
    pub fn new(corpus: Corpus) -> Self {
        StaticCorpusProvider { corpus }
    }

    /// Corpus of single-file sources, `(id, path, content)`.
    pub fn from_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        StaticCorpusProvider::new(Corpus {
            id: "reference".to_string(),
            sources: sources
                .into_iter()
                .map(|(id, path, content)| CorpusSource {
                    id: id.to_string(),
                    files: vec![SourceFile::new(path, content)],
                })
                .collect(),
        })
    }
}

#[async_trait]
impl CorpusProvider for StaticCorpusProvider {
    async fn load(&self, selection: &[String]) -> CollaboratorResult<Corpus> {
        let sources = self
            .corpus
            .sources
            .iter()
            .filter(|s| selection.is_empty() || selection.contains(&s.id))
            .cloned()
            .collect();
        Ok(Corpus {
            id: self.corpus.id.clone(),
            sources,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryPeerScanStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPeerScanStore {
    latest: Mutex<Option<PeerScanSnapshot>>,
}

impl MemoryPeerScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PeerScanSnapshot) -> Self {
        MemoryPeerScanStore {
            latest: Mutex::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl PeerScanStore for MemoryPeerScanStore {
    async fn latest(&self) -> CollaboratorResult<Option<PeerScanSnapshot>> {
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &PeerScanSnapshot) -> CollaboratorResult<()> {
        *self.latest.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticCodeSearch
// ---------------------------------------------------------------------------

/// Code search answering from a needle table: a query containing a needle
/// returns that needle's hits, anything else returns no hits.
#[derive(Debug, Default)]
pub struct StaticCodeSearch {
    hits: Vec<(String, SearchHits)>,
    rate_limit_after: Option<usize>,
    calls: AtomicUsize,
}

impl StaticCodeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, needle: &str, sources: &[&str]) -> Self {
        self.hits.push((
            needle.to_string(),
            SearchHits {
                total_count: sources.len() as u64,
                sources: sources.iter().map(|s| s.to_string()).collect(),
            },
        ));
        self
    }

    /// Answer `n` queries, then report rate limiting.
    pub fn rate_limited_after(mut self, n: usize) -> Self {
        self.rate_limit_after = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeSearchIndex for StaticCodeSearch {
    fn name(&self) -> &str {
        "static-search"
    }

    async fn search(&self, fragment: &CodeFragment) -> CollaboratorResult<SearchHits> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rate_limit_after.is_some_and(|limit| n >= limit) {
            return Err(CollaboratorError::RateLimited(
                "search quota exhausted".to_string(),
            ));
        }
        Ok(self
            .hits
            .iter()
            .find(|(needle, _)| fragment.query.contains(needle.as_str()))
            .map(|(_, hits)| hits.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryReportSink
// ---------------------------------------------------------------------------

/// Sink keeping one rendering per key, like a PR comment that gets edited.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    entries: Mutex<HashMap<String, RenderedReport>>,
    publishes: AtomicUsize,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct visible renderings.
    pub fn visible_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<RenderedReport> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn publish(&self, report: &RenderedReport) -> CollaboratorResult<PublishOutcome> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        let outcome = match entries.get(&report.key) {
            Some(existing) if existing.digest == report.digest => PublishOutcome::Unchanged,
            Some(_) => PublishOutcome::Updated,
            None => PublishOutcome::Created,
        };
        entries.insert(report.key.clone(), report.clone());
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Detector stubs
// ---------------------------------------------------------------------------

/// Detector returning a fixed outcome.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    layer: Layer,
    outcome: DetectorResult,
}

impl FixedDetector {
    pub fn new(layer: Layer, outcome: DetectorResult) -> Self {
        FixedDetector { layer, outcome }
    }

    pub fn signal(signal: Signal) -> Self {
        FixedDetector::new(signal.layer, Ok(signal))
    }
}

#[async_trait]
impl Detector for FixedDetector {
    fn layer(&self) -> Layer {
        self.layer
    }

    async fn evaluate(&self, _ctx: &EvaluationContext) -> DetectorResult {
        self.outcome.clone()
    }
}

/// Detector that sleeps before passing, for timeout tests.
#[derive(Debug, Clone)]
pub struct SlowDetector {
    pub layer: Layer,
    pub delay: Duration,
}

#[async_trait]
impl Detector for SlowDetector {
    fn layer(&self) -> Layer {
        self.layer
    }

    async fn evaluate(&self, _ctx: &EvaluationContext) -> DetectorResult {
        tokio::time::sleep(self.delay).await;
        Ok(Signal::pass(self.layer, 0.0, "finished late"))
    }
}

/// Detector that panics, standing in for an unhandled internal fault.
#[derive(Debug, Clone)]
pub struct PanickingDetector {
    pub layer: Layer,
}

#[async_trait]
impl Detector for PanickingDetector {
    fn layer(&self) -> Layer {
        self.layer
    }

    async fn evaluate(&self, _ctx: &EvaluationContext) -> DetectorResult {
        panic!("detector bug in {}", self.layer)
    }
}
