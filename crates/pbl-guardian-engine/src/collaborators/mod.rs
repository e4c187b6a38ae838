//! Narrow interfaces to the external collaborators detectors consume.
//!
//! Each trait has one concrete adapter in this module tree and an
//! in-memory fake in [`crate::fakes`].

pub mod command;
pub mod corpus;
pub mod git;
pub mod peer_store;
pub mod proofs;
pub mod quality;
pub mod search;
pub mod similarity;
pub mod sink;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pbl_guardian_domain::{CommitRecord, ContentDigest, SourceFile};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorResult;
use crate::render::RenderedReport;

// ---------------------------------------------------------------------------
// Version control history
// ---------------------------------------------------------------------------

/// Ref range bounding the evaluation window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryRange {
    /// Exclusive lower bound (last evaluated commit). `None` means project start.
    pub since: Option<String>,
    /// Inclusive upper bound, usually the evaluated commit.
    pub until: String,
}

impl HistoryRange {
    pub fn until(until: impl Into<String>) -> Self {
        HistoryRange {
            since: None,
            until: until.into(),
        }
    }

    pub fn between(since: impl Into<String>, until: impl Into<String>) -> Self {
        HistoryRange {
            since: Some(since.into()),
            until: until.into(),
        }
    }
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Commits in the range, oldest first.
    async fn commits(&self, range: &HistoryRange) -> CollaboratorResult<Vec<CommitRecord>>;
}

// ---------------------------------------------------------------------------
// Code quality
// ---------------------------------------------------------------------------

/// One linter finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub path: String,
    pub line: u32,
    /// Short rule identifier, e.g. `unused-import`.
    pub symbol: String,
    pub message: String,
}

/// Quality checker output for one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityOutcome {
    /// 0-10, higher is better.
    pub score: f64,
    /// Most relevant issues first, bounded by the checker.
    pub issues: Vec<QualityIssue>,
    /// Issue count before bounding.
    pub total_issues: usize,
    pub files_checked: usize,
}

/// Quality score of the tree at one historical commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionScore {
    pub sha: String,
    pub score: f64,
}

#[async_trait]
pub trait QualityChecker: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this checker can score files of the given language.
    fn supports(&self, language: &str) -> bool;

    async fn check(&self, files: &[SourceFile]) -> CollaboratorResult<QualityOutcome>;

    /// Scores per historical commit, used for skill-consistency analysis.
    /// Checkers that cannot reconstruct past trees report none.
    async fn score_revisions(
        &self,
        _commits: &[CommitRecord],
    ) -> CollaboratorResult<Vec<RevisionScore>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Proofs
// ---------------------------------------------------------------------------

/// Classification of a commit's changed files against the proof directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSummary {
    pub screenshots: usize,
    pub documents: usize,
    pub other: usize,
    /// Changed files that count as code (outside proof and tooling dirs).
    pub code_files_changed: usize,
    pub proof_files: Vec<String>,
    /// Proof artifacts present in the whole proof directory, when known.
    pub total_in_repository: Option<usize>,
}

impl ProofSummary {
    pub fn total_proofs(&self) -> usize {
        self.screenshots + self.documents + self.other
    }
}

#[async_trait]
pub trait ProofChecker: Send + Sync {
    async fn check(
        &self,
        changed_files: &[String],
        proof_directory: &str,
    ) -> CollaboratorResult<ProofSummary>;
}

// ---------------------------------------------------------------------------
// Text similarity (L1, L2)
// ---------------------------------------------------------------------------

/// One comparison source: a reference repository or a sibling submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSource {
    pub id: String,
    pub files: Vec<SourceFile>,
}

/// A named set of comparison sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub id: String,
    pub sources: Vec<CorpusSource>,
}

impl Corpus {
    pub fn is_empty(&self) -> bool {
        self.sources.iter().all(|s| s.files.is_empty())
    }

    /// Fingerprint of the corpus content, stable across load order.
    pub fn digest(&self) -> ContentDigest {
        let mut parts: Vec<String> = self
            .sources
            .iter()
            .flat_map(|s| {
                s.files
                    .iter()
                    .map(move |f| format!("{}:{}:{}", s.id, f.path, f.digest()))
            })
            .collect();
        parts.sort();
        ContentDigest::from_parts(parts)
    }
}

/// One subject file matched against one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub source_id: String,
    pub subject_path: String,
    /// 0-100
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub max_percentage: f64,
    /// Sorted by descending percentage.
    pub matches: Vec<SimilarityMatch>,
}

impl SimilarityReport {
    /// Build from raw matches, sorting and computing the maximum.
    pub fn from_matches(mut matches: Vec<SimilarityMatch>) -> Self {
        matches.sort_by(|a, b| {
            b.percentage
                .total_cmp(&a.percentage)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.subject_path.cmp(&b.subject_path))
        });
        let max_percentage = matches.first().map(|m| m.percentage).unwrap_or(0.0);
        SimilarityReport {
            max_percentage,
            matches,
        }
    }
}

#[async_trait]
pub trait SimilarityTool: Send + Sync {
    fn name(&self) -> &str;

    async fn compare(
        &self,
        subject: &[SourceFile],
        corpus: &Corpus,
    ) -> CollaboratorResult<SimilarityReport>;
}

#[async_trait]
pub trait CorpusProvider: Send + Sync {
    /// Load the reference corpus. `selection` restricts which sources are
    /// included; empty means every available source.
    async fn load(&self, selection: &[String]) -> CollaboratorResult<Corpus>;
}

// ---------------------------------------------------------------------------
// Peer scans (L2)
// ---------------------------------------------------------------------------

/// Scheduled cross-team comparison result for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerScanEntry {
    pub team_id: String,
    pub peers_compared: usize,
    pub report: SimilarityReport,
}

/// Output of one scheduled peer scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerScanSnapshot {
    pub generated_at: DateTime<Utc>,
    pub tool: String,
    pub entries: Vec<PeerScanEntry>,
}

impl PeerScanSnapshot {
    pub fn entry_for(&self, team_id: &str) -> Option<&PeerScanEntry> {
        self.entries.iter().find(|e| e.team_id == team_id)
    }
}

#[async_trait]
pub trait PeerScanStore: Send + Sync {
    /// Most recent snapshot, if any scan has run.
    async fn latest(&self) -> CollaboratorResult<Option<PeerScanSnapshot>>;

    async fn save(&self, snapshot: &PeerScanSnapshot) -> CollaboratorResult<()>;
}

// ---------------------------------------------------------------------------
// Public code search (L3)
// ---------------------------------------------------------------------------

/// A distinctive piece of the submission sent to a search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFragment {
    pub path: String,
    pub function: String,
    /// Non-comment body line count.
    pub lines: usize,
    /// Search query derived from the fragment.
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHits {
    pub total_count: u64,
    /// External source identifiers (e.g. `owner/repo:path`), bounded.
    pub sources: Vec<String>,
}

#[async_trait]
pub trait CodeSearchIndex: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, fragment: &CodeFragment) -> CollaboratorResult<SearchHits>;
}

// ---------------------------------------------------------------------------
// Report sink
// ---------------------------------------------------------------------------

/// What a sink did with a rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishOutcome {
    Created,
    Updated,
    /// Same key and same content digest as the visible rendering.
    Unchanged,
}

impl std::fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishOutcome::Created => write!(f, "created"),
            PublishOutcome::Updated => write!(f, "updated"),
            PublishOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Accepts rendered reports keyed by commit. At most one visible
/// rendering per key.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &RenderedReport) -> CollaboratorResult<PublishOutcome>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The collaborators available to one evaluation. Absent entries make the
/// dependent detectors report skipped.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub history: Option<Arc<dyn HistoryProvider>>,
    pub quality: Option<Arc<dyn QualityChecker>>,
    pub proofs: Option<Arc<dyn ProofChecker>>,
    pub similarity: Option<Arc<dyn SimilarityTool>>,
    pub corpus: Option<Arc<dyn CorpusProvider>>,
    pub peer_scans: Option<Arc<dyn PeerScanStore>>,
    pub code_search: Option<Arc<dyn CodeSearchIndex>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_quality(mut self, quality: Arc<dyn QualityChecker>) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_proofs(mut self, proofs: Arc<dyn ProofChecker>) -> Self {
        self.proofs = Some(proofs);
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityTool>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_corpus(mut self, corpus: Arc<dyn CorpusProvider>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    pub fn with_peer_scans(mut self, store: Arc<dyn PeerScanStore>) -> Self {
        self.peer_scans = Some(store);
        self
    }

    pub fn with_code_search(mut self, index: Arc<dyn CodeSearchIndex>) -> Self {
        self.code_search = Some(index);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("history", &self.history.is_some())
            .field("quality", &self.quality.as_ref().map(|q| q.name().to_string()))
            .field("proofs", &self.proofs.is_some())
            .field("similarity", &self.similarity.as_ref().map(|s| s.name().to_string()))
            .field("corpus", &self.corpus.is_some())
            .field("peer_scans", &self.peer_scans.is_some())
            .field("code_search", &self.code_search.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(source: &str, path: &str, pct: f64) -> SimilarityMatch {
        SimilarityMatch {
            source_id: source.to_string(),
            subject_path: path.to_string(),
            percentage: pct,
        }
    }

    #[test]
    fn test_similarity_report_sorted_desc() {
        let report = SimilarityReport::from_matches(vec![
            m("ref-a", "app.py", 12.0),
            m("ref-b", "db.py", 48.5),
            m("ref-a", "db.py", 30.0),
        ]);
        assert_eq!(report.max_percentage, 48.5);
        assert_eq!(report.matches[0].source_id, "ref-b");
        assert_eq!(report.matches[2].percentage, 12.0);
    }

    #[test]
    fn test_empty_report_has_zero_max() {
        assert_eq!(SimilarityReport::from_matches(vec![]).max_percentage, 0.0);
    }

    #[test]
    fn test_corpus_digest_independent_of_source_order() {
        let a = CorpusSource {
            id: "a".into(),
            files: vec![SourceFile::new("x.py", "print(1)")],
        };
        let b = CorpusSource {
            id: "b".into(),
            files: vec![SourceFile::new("y.py", "print(2)")],
        };
        let one = Corpus {
            id: "refs".into(),
            sources: vec![a.clone(), b.clone()],
        };
        let two = Corpus {
            id: "refs".into(),
            sources: vec![b, a],
        };
        assert_eq!(one.digest(), two.digest());
    }

    #[test]
    fn test_proof_total() {
        let summary = ProofSummary {
            screenshots: 2,
            documents: 1,
            other: 1,
            ..Default::default()
        };
        assert_eq!(summary.total_proofs(), 4);
    }
}
