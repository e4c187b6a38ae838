//! L5: commit-history forensics.
//!
//! Each check runs independently and may fire any number of flags. Every
//! fired flag is reported with its measured values; reviewers audit this
//! list, so nothing that fired is ever summarized away.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike};
use chrono_tz::Tz;
use pbl_guardian_domain::{CommitRecord, ForensicsPolicy, Layer, Milestone, Signal, SignalStatus};
use tracing::warn;

use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    CodeDump,
    LowFrequency,
    MidnightRush,
    LateTimeline,
    SkillInconsistency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    pub kind: FlagKind,
    pub detail: String,
}

impl Flag {
    fn new(kind: FlagKind, detail: String) -> Self {
        Flag { kind, detail }
    }
}

/// Inputs to the forensic checks besides the commits themselves.
#[derive(Debug, Clone)]
pub struct ForensicsInput<'a> {
    pub policy: &'a ForensicsPolicy,
    pub timezone: Tz,
    pub deadlines: &'a [(Milestone, DateTime<Tz>)],
    /// Per-commit quality scores, or why they are not available.
    pub skill_scores: Result<Vec<f64>, String>,
}

/// Whether `hour` lies in `[start, end)`, wrapping past midnight.
pub fn in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn code_dumps(commits: &[CommitRecord], policy: &ForensicsPolicy) -> Vec<Flag> {
    commits
        .iter()
        .filter(|c| c.additions > policy.code_dump_lines)
        .map(|c| {
            Flag::new(
                FlagKind::CodeDump,
                format!(
                    "Code dump: commit {} by {} added {} lines (threshold {})",
                    c.short_sha(),
                    c.author,
                    c.additions,
                    policy.code_dump_lines
                ),
            )
        })
        .collect()
}

fn low_frequency(commits: &[CommitRecord], policy: &ForensicsPolicy) -> Option<Flag> {
    let added: u64 = commits.iter().map(|c| c.additions).sum();
    let avg = added as f64 / commits.len() as f64;
    (commits.len() < policy.low_frequency_max_commits && avg > policy.low_frequency_avg_lines)
        .then(|| {
            Flag::new(
                FlagKind::LowFrequency,
                format!(
                    "Low commit frequency: {} commits averaging {:.1} added lines (flagged below {} commits above {} lines)",
                    commits.len(),
                    avg,
                    policy.low_frequency_max_commits,
                    policy.low_frequency_avg_lines
                ),
            )
        })
}

fn midnight_rush(commits: &[CommitRecord], input: &ForensicsInput<'_>) -> Option<Flag> {
    let policy = input.policy;
    let lookback = Duration::try_hours(policy.rush_lookback_hours).unwrap_or(Duration::MAX);
    let rush = commits
        .iter()
        .filter(|c| {
            let local = c.timestamp.with_timezone(&input.timezone);
            in_window(local.hour(), policy.rush_start_hour, policy.rush_end_hour)
                && input.deadlines.iter().any(|(_, deadline)| {
                    let before = deadline.signed_duration_since(local);
                    before >= Duration::zero() && before <= lookback
                })
        })
        .count();
    let share = rush as f64 / commits.len() as f64;
    (rush >= policy.rush_min_commits && share >= policy.rush_share).then(|| {
        Flag::new(
            FlagKind::MidnightRush,
            format!(
                "Midnight rush: {} of {} commits ({:.0}%) between {:02}:00 and {:02}:00 within {}h of a deadline",
                rush,
                commits.len(),
                share * 100.0,
                policy.rush_start_hour,
                policy.rush_end_hour,
                policy.rush_lookback_hours
            ),
        )
    })
}

fn late_timeline(commits: &[CommitRecord], policy: &ForensicsPolicy) -> Option<Flag> {
    if commits.len() <= 3 {
        return None;
    }
    let first = commits.iter().map(|c| c.timestamp).min()?;
    let last = commits.iter().map(|c| c.timestamp).max()?;
    let span = last.signed_duration_since(first);
    if span <= Duration::zero() {
        return None;
    }
    let tail_ms = (span.num_milliseconds() as f64 * policy.late_timeline_fraction) as i64;
    let cutoff = last - Duration::milliseconds(tail_ms);
    let total: u64 = commits.iter().map(|c| c.additions).sum();
    if total == 0 {
        return None;
    }
    let late: u64 = commits
        .iter()
        .filter(|c| c.timestamp >= cutoff)
        .map(|c| c.additions)
        .sum();
    let share = late as f64 / total as f64;
    (share > policy.late_timeline_share).then(|| {
        Flag::new(
            FlagKind::LateTimeline,
            format!(
                "Late-timeline rush: {:.0}% of added lines ({} of {}) landed in the final {:.0}% of the window",
                share * 100.0,
                late,
                total,
                policy.late_timeline_fraction * 100.0
            ),
        )
    })
}

fn skill_inconsistency(scores: &[f64], policy: &ForensicsPolicy) -> Option<Flag> {
    if scores.len() < policy.skill_min_samples {
        return None;
    }
    let sd = std_dev(scores);
    (sd > policy.skill_stddev_threshold).then(|| {
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Flag::new(
            FlagKind::SkillInconsistency,
            format!(
                "Skill inconsistency: quality std-dev {:.2} across {} commits (range {:.1}-{:.1}, threshold {})",
                sd,
                scores.len(),
                min,
                max,
                policy.skill_stddev_threshold
            ),
        )
    })
}

/// Every flag that fires over the window, code dumps first.
pub fn collect_flags(commits: &[CommitRecord], input: &ForensicsInput<'_>) -> Vec<Flag> {
    if commits.is_empty() {
        return Vec::new();
    }
    let mut flags = code_dumps(commits, input.policy);
    flags.extend(low_frequency(commits, input.policy));
    flags.extend(midnight_rush(commits, input));
    flags.extend(late_timeline(commits, input.policy));
    if let Ok(scores) = &input.skill_scores {
        flags.extend(skill_inconsistency(scores, input.policy));
    }
    flags
}

/// L5 signal for the window. `None` when the window is empty.
pub fn evaluate_forensics(commits: &[CommitRecord], input: &ForensicsInput<'_>) -> Option<Signal> {
    if commits.is_empty() {
        return None;
    }
    let flags = collect_flags(commits, input);
    let status = if flags.iter().any(|f| f.kind == FlagKind::CodeDump) {
        SignalStatus::Fail
    } else if !flags.is_empty() {
        SignalStatus::Warn
    } else {
        SignalStatus::Pass
    };

    let added: u64 = commits.iter().map(|c| c.additions).sum();
    let summary = match flags.len() {
        0 => format!("No anomalies in {} commits", commits.len()),
        n => format!("{} flags in {} commits", n, commits.len()),
    };
    let mut evidence: Vec<String> = flags.iter().map(|f| f.detail.clone()).collect();
    evidence.push(format!(
        "Window: {} commits, {} lines added",
        commits.len(),
        added
    ));
    if input.deadlines.is_empty() {
        evidence.push("Midnight rush not checked: no milestones configured".to_string());
    }
    match &input.skill_scores {
        Err(reason) => evidence.push(format!("Skill consistency not checked: {}", reason)),
        Ok(scores) if scores.len() < input.policy.skill_min_samples => evidence.push(format!(
            "Skill consistency not checked: {} of {} required per-commit scores",
            scores.len(),
            input.policy.skill_min_samples
        )),
        Ok(_) => {}
    }

    Some(
        Signal::new(Layer::HistoryForensics, status, flags.len() as f64, summary)
            .with_evidence(evidence),
    )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ForensicsDetector;

#[async_trait]
impl Detector for ForensicsDetector {
    fn layer(&self) -> Layer {
        Layer::HistoryForensics
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let commits = ctx.history().await?;
        if commits.is_empty() {
            return Ok(Signal::skipped(
                Layer::HistoryForensics,
                "no commit history in evaluation window",
            ));
        }
        let deadlines = ctx.config.resolved_milestones()?;

        let skill_scores = match &ctx.collaborators.quality {
            None => Err("code-quality checker not configured".to_string()),
            Some(checker) => match checker.score_revisions(&commits).await {
                Ok(scores) => Ok(scores.into_iter().map(|s| s.score).collect()),
                Err(e) => {
                    warn!(error = %e, "per-commit quality scores unavailable");
                    Err(e.to_string())
                }
            },
        };

        let input = ForensicsInput {
            policy: &ctx.config.forensics,
            timezone: ctx.timezone(),
            deadlines: &deadlines,
            skill_scores,
        };
        Ok(evaluate_forensics(&commits, &input).unwrap_or_else(|| {
            Signal::skipped(Layer::HistoryForensics, "no commit history in evaluation window")
        }))
    }
}
