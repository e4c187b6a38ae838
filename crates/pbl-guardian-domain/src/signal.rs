//! Layer identifiers and the normalized detector output.

use serde::{Deserialize, Serialize};

/// One evaluation dimension. Declaration order is the canonical rendering
/// order of a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Milestone-relative commit timing
    Timing,

    /// Static code quality (external linter)
    Quality,

    /// Proof-of-progress artifacts
    Proofs,

    /// Contribution equity across authors
    Contribution,

    /// L1: similarity against the owner-supplied reference corpus
    #[serde(rename = "l1_corpus")]
    Corpus,

    /// L2: similarity against sibling submissions (scheduled)
    #[serde(rename = "l2_peer")]
    Peer,

    /// L3: matches in a public code-search index
    #[serde(rename = "l3_public_code")]
    PublicCode,

    /// L4: synthetic-origin stylistic heuristic
    #[serde(rename = "l4_synthetic")]
    SyntheticOrigin,

    /// L5: commit-history forensics
    #[serde(rename = "l5_history")]
    HistoryForensics,
}

impl Layer {
    /// Every layer, in the order reports render them.
    pub const CANONICAL: [Layer; 9] = [
        Layer::Timing,
        Layer::Quality,
        Layer::Proofs,
        Layer::Contribution,
        Layer::Corpus,
        Layer::Peer,
        Layer::PublicCode,
        Layer::SyntheticOrigin,
        Layer::HistoryForensics,
    ];

    /// Stable machine identifier (matches the serde name).
    pub fn id(&self) -> &'static str {
        match self {
            Layer::Timing => "timing",
            Layer::Quality => "quality",
            Layer::Proofs => "proofs",
            Layer::Contribution => "contribution",
            Layer::Corpus => "l1_corpus",
            Layer::Peer => "l2_peer",
            Layer::PublicCode => "l3_public_code",
            Layer::SyntheticOrigin => "l4_synthetic",
            Layer::HistoryForensics => "l5_history",
        }
    }

    /// Human-readable title used in rendered reports.
    pub fn title(&self) -> &'static str {
        match self {
            Layer::Timing => "Timing",
            Layer::Quality => "Code Quality",
            Layer::Proofs => "Proofs",
            Layer::Contribution => "Contribution",
            Layer::Corpus => "Plagiarism (L1 Corpus)",
            Layer::Peer => "Plagiarism (L2 Peers)",
            Layer::PublicCode => "Plagiarism (L3 Public Code)",
            Layer::SyntheticOrigin => "Synthetic Origin (L4)",
            Layer::HistoryForensics => "Commit Patterns (L5)",
        }
    }

    /// Parse a layer from its identifier.
    pub fn from_id(id: &str) -> Option<Layer> {
        Layer::CANONICAL.into_iter().find(|l| l.id() == id)
    }

    /// Position in the canonical order.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Outcome category of one detector invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pass,
    Warn,
    Fail,
    /// The detector could not run. Never affects the overall verdict.
    Skipped,
}

impl SignalStatus {
    /// Severity rank used when folding statuses into a verdict.
    /// `Skipped` ranks below `Pass` so it can never raise a verdict.
    pub fn severity(&self) -> u8 {
        match self {
            SignalStatus::Skipped => 0,
            SignalStatus::Pass => 1,
            SignalStatus::Warn => 2,
            SignalStatus::Fail => 3,
        }
    }

    /// Status glyph used in Markdown output.
    pub fn glyph(&self) -> &'static str {
        match self {
            SignalStatus::Pass => "✅",
            SignalStatus::Warn => "⚠️",
            SignalStatus::Fail => "🚨",
            SignalStatus::Skipped => "⏭️",
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalStatus::Pass => write!(f, "pass"),
            SignalStatus::Warn => write!(f, "warn"),
            SignalStatus::Fail => write!(f, "fail"),
            SignalStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Normalized output of one detector.
///
/// `score` is layer-specific but monotonic: higher is more concerning.
/// Skipped signals carry no score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub layer: Layer,
    pub status: SignalStatus,
    pub score: Option<f64>,
    /// One-line summary shown in the report table.
    pub summary: String,
    /// Literal evidence lines, in the order the detector produced them.
    pub evidence: Vec<String>,
    pub skip_reason: Option<String>,
}

impl Signal {
    /// A signal that ran and produced a status.
    pub fn new(layer: Layer, status: SignalStatus, score: f64, summary: impl Into<String>) -> Self {
        Signal {
            layer,
            status,
            score: Some(score),
            summary: summary.into(),
            evidence: Vec::new(),
            skip_reason: None,
        }
    }

    pub fn pass(layer: Layer, score: f64, summary: impl Into<String>) -> Self {
        Signal::new(layer, SignalStatus::Pass, score, summary)
    }

    /// A detector that could not run.
    pub fn skipped(layer: Layer, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Signal {
            layer,
            status: SignalStatus::Skipped,
            score: None,
            summary: format!("Skipped: {}", reason),
            evidence: Vec::new(),
            skip_reason: Some(reason),
        }
    }

    /// Append evidence lines.
    pub fn with_evidence<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.evidence.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Append a single evidence line.
    pub fn push_evidence(&mut self, line: impl Into<String>) {
        self.evidence.push(line.into());
    }

    pub fn is_skipped(&self) -> bool {
        self.status == SignalStatus::Skipped
    }
}
