//! Milestone-relative commit timing.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset};
use chrono_tz::Tz;
use pbl_guardian_domain::{
    GuardianError, Layer, Milestone, Result, Signal, SignalStatus, TeamConfig,
};

use super::round_to;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};

/// Where a commit falls on the team calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub local_time: DateTime<Tz>,
    /// Selected milestone and its resolved deadline.
    pub milestone: Option<(Milestone, DateTime<Tz>)>,
    /// Weekday name when the commit landed on a class day.
    pub class_day: Option<String>,
}

impl Attribution {
    pub fn phase(&self) -> Option<String> {
        self.milestone.as_ref().map(|(m, _)| m.phase.clone())
    }
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

/// Instant a milestone closes: its deadline plus grace.
fn closes_at(deadline: &DateTime<Tz>, grace: Duration) -> Result<DateTime<Tz>> {
    deadline.checked_add_signed(grace).ok_or_else(|| {
        GuardianError::invalid_config(format!(
            "grace period of {}h overflows deadline {}",
            grace.num_hours(),
            deadline.format("%Y-%m-%d")
        ))
    })
}

/// Place a commit on the team calendar. The selected milestone is the
/// earliest one whose deadline plus grace has not passed; when every
/// milestone has expired the last one is selected.
pub fn attribute(config: &TeamConfig, at: DateTime<FixedOffset>) -> Result<Attribution> {
    let tz = config.timezone()?;
    let local_time = at.with_timezone(&tz);
    let grace = hours(config.grace_period_hours);

    let milestones = config.resolved_milestones()?;
    let mut selected = None;
    for (milestone, deadline) in &milestones {
        if local_time <= closes_at(deadline, grace)? {
            selected = Some((milestone.clone(), *deadline));
            break;
        }
    }
    let selected = selected.or_else(|| milestones.last().cloned());

    let weekday = local_time.weekday();
    let class_day = config
        .class_days()?
        .contains(&weekday)
        .then(|| weekday_name(weekday).to_string());

    Ok(Attribution {
        local_time,
        milestone: selected,
        class_day,
    })
}

fn weekday_name(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

/// Timing signal for a commit.
pub fn evaluate_timing(config: &TeamConfig, at: DateTime<FixedOffset>) -> Result<Signal> {
    let attribution = attribute(config, at)?;
    let local = attribution.local_time;
    let local_line = format!(
        "Commit time (local): {} ({})",
        local.format("%Y-%m-%d %H:%M %Z"),
        weekday_name(local.weekday())
    );
    let class_line = match &attribution.class_day {
        Some(day) => format!("Class day: yes ({})", day),
        None => "Class day: no".to_string(),
    };

    let Some((milestone, deadline)) = attribution.milestone else {
        return Ok(Signal::pass(Layer::Timing, 0.0, "No milestone configured")
            .with_evidence(["no milestone configured".to_string(), local_line, class_line]));
    };

    let grace = hours(config.grace_period_hours);
    let warning = hours(config.deadline_warning_hours);
    let until_deadline = deadline.signed_duration_since(local);
    let days = until_deadline.num_minutes() as f64 / (60.0 * 24.0);
    let overdue_days = (-days).max(0.0);

    let (status, summary) = if local > closes_at(&deadline, grace)? {
        (
            SignalStatus::Fail,
            format!("{}: {:.2} days past deadline", milestone.phase, overdue_days),
        )
    } else if local > deadline {
        (
            SignalStatus::Warn,
            format!("{}: inside {}h grace window", milestone.phase, config.grace_period_hours),
        )
    } else if until_deadline <= warning {
        (
            SignalStatus::Warn,
            format!("{}: {:.1} hours before deadline", milestone.phase, days * 24.0),
        )
    } else {
        (
            SignalStatus::Pass,
            format!("{}: {:.2} days before deadline", milestone.phase, days),
        )
    };

    let evidence = vec![
        format!(
            "Phase: {} (deadline {})",
            milestone.phase,
            deadline.format("%Y-%m-%d %H:%M %Z")
        ),
        format!(
            "Distance to deadline: {:+.2} days ({:+.1} hours)",
            days,
            days * 24.0
        ),
        format!("Grace period: {} hours", config.grace_period_hours),
        local_line,
        class_line,
    ];

    Ok(Signal::new(Layer::Timing, status, round_to(overdue_days, 2), summary)
        .with_evidence(evidence))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimingDetector;

#[async_trait]
impl Detector for TimingDetector {
    fn layer(&self) -> Layer {
        Layer::Timing
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        Ok(evaluate_timing(&ctx.config, ctx.submission.timestamp)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(milestones: &str) -> TeamConfig {
        TeamConfig::from_json_str(&format!(
            r#"{{
                "team_id": "team-07",
                "timezone": "Asia/Kolkata",
                "class_days": ["Monday", "Saturday"],
                "grace_period_hours": 2,
                "deadline_warning_hours": 24,
                "milestones": {}
            }}"#,
            milestones
        ))
        .unwrap()
    }

    fn two_phases() -> TeamConfig {
        config(
            r#"[{"phase": "Phase 1 - Setup", "deadline": "2026-03-01"},
                {"phase": "Phase 2 - Core", "deadline": "2026-03-15"}]"#,
        )
    }

    fn at(ts: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(ts).unwrap()
    }

    #[test]
    fn test_no_milestones_is_pass_not_skip() {
        let signal = evaluate_timing(&config("[]"), at("2026-02-28T10:30:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Pass);
        assert!(signal.evidence.contains(&"no milestone configured".to_string()));
    }

    #[test]
    fn test_well_before_deadline_passes() {
        let signal = evaluate_timing(&two_phases(), at("2026-02-25T10:00:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Pass);
        assert_eq!(signal.score, Some(0.0));
        assert!(signal.summary.starts_with("Phase 1 - Setup"));
    }

    #[test]
    fn test_within_warning_window_warns() {
        // Deadline is 2026-03-01T00:00 IST; ten hours before.
        let signal = evaluate_timing(&two_phases(), at("2026-02-28T14:00:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Warn);
        assert!(signal.summary.contains("10.0 hours before deadline"));
    }

    #[test]
    fn test_inside_grace_warns() {
        let signal = evaluate_timing(&two_phases(), at("2026-03-01T01:30:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Warn);
        assert!(signal.summary.contains("grace"));
        assert!(signal.score.unwrap() > 0.0);
    }

    #[test]
    fn test_after_grace_moves_to_next_milestone() {
        let signal = evaluate_timing(&two_phases(), at("2026-03-01T03:00:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Pass);
        assert!(signal.summary.starts_with("Phase 2 - Core"));
    }

    #[test]
    fn test_all_expired_selects_last_and_fails() {
        let signal = evaluate_timing(&two_phases(), at("2026-03-18T12:00:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Fail);
        assert!(signal.summary.starts_with("Phase 2 - Core"));
        assert_eq!(signal.score, Some(3.5));
    }

    #[test]
    fn test_timestamp_converted_to_team_zone() {
        // 19:00 UTC on Feb 28 is 00:30 IST on Mar 1: inside grace, not before deadline.
        let signal = evaluate_timing(&two_phases(), at("2026-02-28T19:00:00+00:00")).unwrap();
        assert_eq!(signal.status, SignalStatus::Warn);
        assert!(signal.summary.contains("grace"));
    }

    #[test]
    fn test_class_day_is_informational() {
        // 2026-03-02 is a Monday.
        let config = two_phases();
        let monday = attribute(&config, at("2026-03-02T10:00:00+05:30")).unwrap();
        assert_eq!(monday.class_day.as_deref(), Some("Monday"));
        assert_eq!(monday.phase().as_deref(), Some("Phase 2 - Core"));

        let signal = evaluate_timing(&config, at("2026-03-02T10:00:00+05:30")).unwrap();
        assert_eq!(signal.status, SignalStatus::Pass);
        assert!(signal.evidence.iter().any(|e| e == "Class day: yes (Monday)"));

        let tuesday = attribute(&config, at("2026-03-03T10:00:00+05:30")).unwrap();
        assert_eq!(tuesday.class_day, None);
    }

    #[test]
    fn test_overflowing_grace_is_config_error() {
        let mut config = two_phases();
        config.grace_period_hours = 1e300;
        let err = attribute(&config, at("2026-02-27T10:00:00+05:30")).unwrap_err();
        assert!(matches!(err, GuardianError::InvalidConfig(_)));
        let err = evaluate_timing(&config, at("2026-02-27T10:00:00+05:30")).unwrap_err();
        assert!(err.to_string().contains("grace period"));
    }
}
