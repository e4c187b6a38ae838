//! Contribution equity across team members.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pbl_guardian_domain::{CommitRecord, Layer, Signal, SignalStatus};

use super::round_to;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};

/// Share of commits above which one author is called out as dominant.
const DOMINANCE_SHARE: f64 = 0.70;

/// Gini coefficient of non-negative contributions. Zero for fewer than two
/// contributors or a zero total.
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n <= 1 || total <= 0.0 {
        return 0.0;
    }
    let mut pair_sum = 0.0;
    for a in values {
        for b in values {
            pair_sum += (a - b).abs();
        }
    }
    pair_sum / (2.0 * n as f64 * total)
}

/// Aggregated activity of one author over the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorStats {
    pub author: String,
    pub commits: usize,
    pub additions: u64,
    pub deletions: u64,
}

/// Per-author totals, largest contributor first.
pub fn author_stats(commits: &[CommitRecord]) -> Vec<AuthorStats> {
    let mut by_author: BTreeMap<&str, AuthorStats> = BTreeMap::new();
    for commit in commits {
        let stats = by_author
            .entry(commit.author.as_str())
            .or_insert_with(|| AuthorStats {
                author: commit.author.clone(),
                ..Default::default()
            });
        stats.commits += 1;
        stats.additions += commit.additions;
        stats.deletions += commit.deletions;
    }
    let mut stats: Vec<AuthorStats> = by_author.into_values().collect();
    stats.sort_by(|a, b| {
        b.additions
            .cmp(&a.additions)
            .then_with(|| b.commits.cmp(&a.commits))
            .then_with(|| a.author.cmp(&b.author))
    });
    stats
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Equity signal for a window of commits. `None` when the window is empty.
pub fn evaluate_equity(commits: &[CommitRecord], min_contribution_pct: f64) -> Option<Signal> {
    if commits.is_empty() {
        return None;
    }
    let stats = author_stats(commits);
    let additions: Vec<f64> = stats.iter().map(|s| s.additions as f64).collect();
    let total_additions: f64 = additions.iter().sum();
    let total_commits = commits.len() as f64;
    let raw_gini = gini(&additions);
    let g = round_to(raw_gini, 3);

    let (mut status, label) = if raw_gini <= 0.3 {
        (SignalStatus::Pass, "Balanced")
    } else if raw_gini <= 0.6 {
        (SignalStatus::Warn, "Imbalanced")
    } else {
        (SignalStatus::Fail, "Highly imbalanced")
    };

    let mut evidence = vec![format!(
        "Gini coefficient: {:.3} over {} authors, {} commits",
        g,
        stats.len(),
        commits.len()
    )];
    for s in &stats {
        evidence.push(format!(
            "{}: {} commits, +{}/-{} lines ({:.1}% of additions, {:.1}% of commits)",
            s.author,
            s.commits,
            s.additions,
            s.deletions,
            percent(s.additions as f64, total_additions),
            percent(s.commits as f64, total_commits),
        ));
    }

    let mut flagged = 0;
    if stats.len() > 1 {
        for s in &stats {
            let share = percent(s.additions as f64, total_additions);
            if share < min_contribution_pct {
                flagged += 1;
                evidence.push(format!(
                    "{} holds {:.1}% of additions, below the {}% minimum",
                    s.author, share, min_contribution_pct
                ));
            }
        }
        if let Some(top) = stats.iter().max_by_key(|s| s.commits) {
            let share = top.commits as f64 / total_commits;
            if share > DOMINANCE_SHARE {
                evidence.push(format!(
                    "{} authored {:.0}% of commits",
                    top.author,
                    share * 100.0
                ));
            }
        }
    }
    if flagged > 0 && status == SignalStatus::Pass {
        status = SignalStatus::Warn;
    }

    let mut summary = format!("{} (Gini {:.3})", label, g);
    if flagged > 0 {
        summary.push_str(&format!(", {} below minimum share", flagged));
    }
    Some(Signal::new(Layer::Contribution, status, g, summary).with_evidence(evidence))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EquityDetector;

#[async_trait]
impl Detector for EquityDetector {
    fn layer(&self) -> Layer {
        Layer::Contribution
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let commits = ctx.history().await?;
        Ok(
            evaluate_equity(&commits, ctx.config.min_contribution_pct).unwrap_or_else(|| {
                Signal::skipped(Layer::Contribution, "no commit history in evaluation window")
            }),
        )
    }
}
