//! Shared plumbing of the three similarity layers.

use pbl_guardian_domain::{Layer, Signal, SignalStatus, SourceFile};

use super::round_to;
use crate::cache::QueryKey;
use crate::collaborators::{Corpus, SimilarityReport, SimilarityTool};
use crate::context::EvaluationContext;
use crate::error::{CollaboratorResult, DetectorError};

/// Percentage points below the threshold that still warn.
pub const WARN_BAND: f64 = 10.0;

/// Matches listed in evidence.
const MAX_LISTED_MATCHES: usize = 5;

pub fn status_for_percentage(percentage: f64, threshold: f64) -> SignalStatus {
    if percentage >= threshold {
        SignalStatus::Fail
    } else if percentage >= threshold - WARN_BAND {
        SignalStatus::Warn
    } else {
        SignalStatus::Pass
    }
}

/// Signal for a similarity report, `what` naming the comparison set.
pub fn similarity_signal(
    layer: Layer,
    report: &SimilarityReport,
    threshold: f64,
    what: &str,
) -> Signal {
    let status = status_for_percentage(report.max_percentage, threshold);
    let pct = round_to(report.max_percentage, 1);
    let summary = match report.matches.first() {
        Some(top) if pct > 0.0 => format!("{:.1}% similar to {} ({})", pct, what, top.source_id),
        _ => format!("{:.1}% similar to {}", pct, what),
    };
    let mut evidence = vec![format!(
        "Max similarity: {:.1}% (threshold {}%)",
        pct, threshold
    )];
    evidence.extend(
        report
            .matches
            .iter()
            .filter(|m| m.percentage > 0.0)
            .take(MAX_LISTED_MATCHES)
            .map(|m| format!("{} vs {}: {:.1}%", m.subject_path, m.source_id, m.percentage)),
    );
    Signal::new(layer, status, pct, summary).with_evidence(evidence)
}

/// Eligible files of the submission, or unavailable when there are none.
pub fn comparable_files(ctx: &EvaluationContext) -> Result<Vec<SourceFile>, DetectorError> {
    let files: Vec<SourceFile> = ctx.eligible_files().into_iter().cloned().collect();
    if files.is_empty() {
        return Err(DetectorError::unavailable("no eligible source files"));
    }
    Ok(files)
}

/// Run a comparison through the evaluation's query cache. Identical file
/// sets against the same corpus with the same tool share one call.
pub async fn compare_cached(
    ctx: &EvaluationContext,
    tool: &dyn SimilarityTool,
    subject: &[SourceFile],
    corpus: &Corpus,
) -> CollaboratorResult<SimilarityReport> {
    let mut parts: Vec<String> = subject
        .iter()
        .map(|f| format!("{}:{}", f.path, f.digest()))
        .collect();
    parts.sort();
    parts.insert(0, corpus.digest().as_str().to_string());
    parts.insert(0, tool.name().to_string());
    let key = QueryKey::new("similarity", parts);
    ctx.cache
        .get_or_fetch(key, || tool.compare(subject, corpus))
        .await
}
