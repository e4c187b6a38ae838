//! Team-scoped evaluation configuration.
//!
//! Loaded from `.pbl/config.json`. Every policy threshold the engine applies
//! lives here so instructors can tune them per team without a release.
//! Malformed configuration is fatal: the engine refuses to evaluate rather
//! than produce a report built on bad inputs.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{GuardianError, Result};
use crate::signal::Layer;

/// Newest config schema this build understands.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Upper bound for every hour-valued window (one year).
pub const MAX_WINDOW_HOURS: f64 = 8760.0;

/// A named project phase and its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub phase: String,

    /// `YYYY-MM-DD` (midnight in the team timezone) or an RFC 3339 timestamp.
    pub deadline: String,
}

impl Milestone {
    /// Resolve the deadline in the given timezone.
    pub fn deadline_in(&self, tz: Tz) -> Result<DateTime<Tz>> {
        let raw = self.deadline.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
                GuardianError::invalid_config(format!("milestone '{}': bad date", self.phase))
            })?;
            return tz.from_local_datetime(&midnight).earliest().ok_or_else(|| {
                GuardianError::invalid_config(format!(
                    "milestone '{}': deadline {} does not exist in {}",
                    self.phase, raw, tz
                ))
            });
        }

        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&tz))
            .map_err(|_| {
                GuardianError::invalid_config(format!(
                    "milestone '{}': deadline '{}' is neither YYYY-MM-DD nor RFC 3339",
                    self.phase, raw
                ))
            })
    }
}

/// Thresholds for commit-history forensics (L5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicsPolicy {
    /// A single commit adding more lines than this is a code dump.
    pub code_dump_lines: u64,
    /// Average added lines per commit above which sparse history is flagged.
    pub low_frequency_avg_lines: f64,
    /// Sparse history means fewer commits than this.
    pub low_frequency_max_commits: usize,
    /// Late-night window start (local hour, inclusive).
    pub rush_start_hour: u32,
    /// Late-night window end (local hour, exclusive). May wrap past midnight.
    pub rush_end_hour: u32,
    /// How far before a deadline a late-night commit counts toward a rush.
    pub rush_lookback_hours: i64,
    /// Share of window commits that must be rush commits to flag.
    pub rush_share: f64,
    pub rush_min_commits: usize,
    /// Final fraction of the window's time span inspected for late-timeline rush.
    pub late_timeline_fraction: f64,
    /// Share of additions landing in that final fraction that triggers a flag.
    pub late_timeline_share: f64,
    /// Population std-dev of per-commit quality scores that signals mixed authorship.
    pub skill_stddev_threshold: f64,
    pub skill_min_samples: usize,
}

impl Default for ForensicsPolicy {
    fn default() -> Self {
        ForensicsPolicy {
            code_dump_lines: 200,
            low_frequency_avg_lines: 150.0,
            low_frequency_max_commits: 5,
            rush_start_hour: 22,
            rush_end_hour: 4,
            rush_lookback_hours: 48,
            rush_share: 0.5,
            rush_min_commits: 3,
            late_timeline_fraction: 0.25,
            late_timeline_share: 0.6,
            skill_stddev_threshold: 2.0,
            skill_min_samples: 3,
        }
    }
}

/// Linear weights of the L4 stylistic features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub comment_density: f64,
    pub doc_coverage: f64,
    pub naming_uniformity: f64,
    pub boilerplate: f64,
    pub refinement_absence: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        FeatureWeights {
            comment_density: 0.25,
            doc_coverage: 0.20,
            naming_uniformity: 0.20,
            boilerplate: 0.20,
            refinement_absence: 0.15,
        }
    }
}

impl FeatureWeights {
    pub fn total(&self) -> f64 {
        self.comment_density
            + self.doc_coverage
            + self.naming_uniformity
            + self.boilerplate
            + self.refinement_absence
    }

    fn all(&self) -> [f64; 5] {
        [
            self.comment_density,
            self.doc_coverage,
            self.naming_uniformity,
            self.boilerplate,
            self.refinement_absence,
        ]
    }
}

/// Synthetic-origin heuristic (L4) policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPolicy {
    pub weights: FeatureWeights,
    pub warn_score: f64,
    pub fail_score: f64,
    /// Files shorter than this are too small to judge refinement markers.
    pub min_refinement_lines: usize,
}

impl Default for SyntheticPolicy {
    fn default() -> Self {
        SyntheticPolicy {
            weights: FeatureWeights::default(),
            warn_score: 0.4,
            fail_score: 0.7,
            min_refinement_lines: 30,
        }
    }
}

/// Per-layer detector time budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    pub default_secs: u64,
    /// Overrides keyed by layer identifier (e.g. `"l3_public_code"`).
    pub per_layer: BTreeMap<String, u64>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy {
            default_secs: 120,
            per_layer: BTreeMap::new(),
        }
    }
}

impl TimeoutPolicy {
    pub fn timeout_for(&self, layer: Layer) -> Duration {
        let secs = self
            .per_layer
            .get(layer.id())
            .copied()
            .unwrap_or(self.default_secs);
        Duration::from_secs(secs)
    }
}

/// Configuration owned by one team. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    pub schema_version: u32,
    pub team_id: String,
    pub team_name: String,
    /// Weekday names, e.g. `["Monday", "Saturday"]`.
    pub class_days: Vec<String>,
    /// IANA zone name.
    pub timezone: String,
    pub grace_period_hours: f64,
    /// Commits this close before a deadline are flagged as warn.
    pub deadline_warning_hours: f64,
    pub milestones: Vec<Milestone>,
    /// Language hint selecting which source files are analyzed.
    pub language: String,
    pub proof_directory: String,
    /// Minimum linter score (0-10).
    pub min_quality_score: f64,
    pub quality_warn_margin: f64,
    /// Similarity percentage (0-100) at or above which L1-L3 fail.
    pub plagiarism_threshold: f64,
    /// Reference repositories to compare against. Empty means all available.
    pub reference_corpora: Vec<String>,
    /// Minimum share of additions (percent) each member should hold.
    pub min_contribution_pct: f64,
    pub forensics: ForensicsPolicy,
    pub synthetic: SyntheticPolicy,
    pub timeouts: TimeoutPolicy,
}

impl Default for TeamConfig {
    fn default() -> Self {
        TeamConfig {
            schema_version: CONFIG_SCHEMA_VERSION,
            team_id: String::new(),
            team_name: String::new(),
            class_days: Vec::new(),
            timezone: "Asia/Kolkata".to_string(),
            grace_period_hours: 2.0,
            deadline_warning_hours: 24.0,
            milestones: Vec::new(),
            language: "python".to_string(),
            proof_directory: "proofs/".to_string(),
            min_quality_score: 7.0,
            quality_warn_margin: 1.0,
            plagiarism_threshold: 30.0,
            reference_corpora: Vec::new(),
            min_contribution_pct: 10.0,
            forensics: ForensicsPolicy::default(),
            synthetic: SyntheticPolicy::default(),
            timeouts: TimeoutPolicy::default(),
        }
    }
}

impl TeamConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                GuardianError::ConfigNotFound(path.display().to_string())
            }
            _ => GuardianError::Io(e),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate config JSON.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: TeamConfig = serde_json::from_str(content)
            .map_err(|e| GuardianError::invalid_config(format!("unparsable JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version == 0 || self.schema_version > CONFIG_SCHEMA_VERSION {
            return Err(GuardianError::UnsupportedSchema {
                found: self.schema_version,
                supported: CONFIG_SCHEMA_VERSION,
            });
        }
        if self.team_id.trim().is_empty() {
            return Err(GuardianError::invalid_config("team_id is required"));
        }

        let tz = self.timezone()?;
        self.class_days()?;
        for milestone in &self.milestones {
            if milestone.phase.trim().is_empty() {
                return Err(GuardianError::invalid_config("milestone phase must not be empty"));
            }
            milestone.deadline_in(tz)?;
        }

        check_range("grace_period_hours", self.grace_period_hours, 0.0, MAX_WINDOW_HOURS)?;
        check_range(
            "deadline_warning_hours",
            self.deadline_warning_hours,
            0.0,
            MAX_WINDOW_HOURS,
        )?;
        check_range("min_quality_score", self.min_quality_score, 0.0, 10.0)?;
        check_range("quality_warn_margin", self.quality_warn_margin, 0.0, 10.0)?;
        check_range("plagiarism_threshold", self.plagiarism_threshold, 0.0, 100.0)?;
        check_range("min_contribution_pct", self.min_contribution_pct, 0.0, 100.0)?;
        if self.language.trim().is_empty() {
            return Err(GuardianError::invalid_config("language must not be empty"));
        }

        let f = &self.forensics;
        for (name, hour) in [
            ("forensics.rush_start_hour", f.rush_start_hour),
            ("forensics.rush_end_hour", f.rush_end_hour),
        ] {
            if hour > 23 {
                return Err(GuardianError::invalid_config(format!(
                    "{} must be within 0-23, got {}",
                    name, hour
                )));
            }
        }
        if f.rush_lookback_hours <= 0 || f.rush_lookback_hours as f64 > MAX_WINDOW_HOURS {
            return Err(GuardianError::invalid_config(format!(
                "forensics.rush_lookback_hours must be within 1-{}, got {}",
                MAX_WINDOW_HOURS, f.rush_lookback_hours
            )));
        }
        check_range("forensics.rush_share", f.rush_share, 0.0, 1.0)?;
        check_range("forensics.late_timeline_fraction", f.late_timeline_fraction, 0.0, 1.0)?;
        check_range("forensics.late_timeline_share", f.late_timeline_share, 0.0, 1.0)?;
        check_range("forensics.skill_stddev_threshold", f.skill_stddev_threshold, 0.0, f64::MAX)?;
        check_range("forensics.low_frequency_avg_lines", f.low_frequency_avg_lines, 0.0, f64::MAX)?;

        let s = &self.synthetic;
        if s.weights.all().iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GuardianError::invalid_config(
                "synthetic.weights must be non-negative",
            ));
        }
        if s.weights.total() <= 0.0 {
            return Err(GuardianError::invalid_config(
                "synthetic.weights must have a positive sum",
            ));
        }
        check_range("synthetic.warn_score", s.warn_score, 0.0, 1.0)?;
        check_range("synthetic.fail_score", s.fail_score, 0.0, 1.0)?;
        if s.warn_score > s.fail_score {
            return Err(GuardianError::invalid_config(
                "synthetic.warn_score must not exceed synthetic.fail_score",
            ));
        }

        if self.timeouts.default_secs == 0 {
            return Err(GuardianError::invalid_config("timeouts.default_secs must be positive"));
        }
        for (key, secs) in &self.timeouts.per_layer {
            if Layer::from_id(key).is_none() {
                return Err(GuardianError::invalid_config(format!(
                    "timeouts.per_layer: unknown layer '{}'",
                    key
                )));
            }
            if *secs == 0 {
                return Err(GuardianError::invalid_config(format!(
                    "timeouts.per_layer.{} must be positive",
                    key
                )));
            }
        }

        Ok(())
    }

    /// The team timezone.
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            GuardianError::invalid_config(format!(
                "timezone '{}' is not an IANA zone name",
                self.timezone
            ))
        })
    }

    /// Configured class days.
    pub fn class_days(&self) -> Result<Vec<Weekday>> {
        self.class_days
            .iter()
            .map(|d| {
                d.trim().parse::<Weekday>().map_err(|_| {
                    GuardianError::invalid_config(format!("'{}' is not a weekday name", d))
                })
            })
            .collect()
    }

    /// Milestones paired with their resolved deadlines, sorted by deadline.
    pub fn resolved_milestones(&self) -> Result<Vec<(Milestone, DateTime<Tz>)>> {
        let tz = self.timezone()?;
        let mut resolved = self
            .milestones
            .iter()
            .map(|m| m.deadline_in(tz).map(|d| (m.clone(), d)))
            .collect::<Result<Vec<_>>>()?;
        resolved.sort_by_key(|(_, deadline)| *deadline);
        Ok(resolved)
    }

    /// Display name, falling back to the team id.
    pub fn display_name(&self) -> &str {
        if self.team_name.trim().is_empty() {
            &self.team_id
        } else {
            &self.team_name
        }
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(GuardianError::invalid_config(format!(
            "{} must be within {}-{}, got {}",
            name,
            min,
            if max == f64::MAX { "∞".to_string() } else { max.to_string() },
            value
        )));
    }
    Ok(())
}
