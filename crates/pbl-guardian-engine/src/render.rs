//! Markdown and JSON rendering of a report.
//!
//! The Markdown omits the evaluation timestamp so that re-rendering an
//! unchanged evaluation produces byte-identical output. The JSON keeps it.

use pbl_guardian_domain::{ContentDigest, Report, Result, Signal, SignalStatus, Verdict};

const MARKER_PREFIX: &str = "<!-- pbl-guardian:commit=";
const DIGEST_PREFIX: &str = "<!-- pbl-guardian:digest=";
const MARKER_SUFFIX: &str = " -->";

/// Evidence lines rendered per layer before truncation.
const MAX_EVIDENCE_LINES: usize = 20;

/// A report ready for a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    /// Idempotency key (the commit identifier).
    pub key: String,
    pub markdown: String,
    pub json: String,
    pub digest: ContentDigest,
    pub verdict: Verdict,
}

impl RenderedReport {
    pub fn from_report(report: &Report) -> Result<Self> {
        Ok(RenderedReport {
            key: report.idempotency_key().to_string(),
            markdown: render_markdown(report),
            json: report.to_json_pretty()?,
            digest: report.content_digest.clone(),
            verdict: report.verdict,
        })
    }
}

/// Hidden marker identifying the commit a rendering belongs to.
pub fn marker(commit_sha: &str) -> String {
    format!("{}{}{}", MARKER_PREFIX, commit_sha, MARKER_SUFFIX)
}

fn extract_between<'a>(markdown: &'a str, prefix: &str) -> Option<&'a str> {
    let start = markdown.find(prefix)? + prefix.len();
    let rest = &markdown[start..];
    let end = rest.find(MARKER_SUFFIX)?;
    Some(&rest[..end])
}

/// Commit identifier from a rendering's marker.
pub fn extract_marker(markdown: &str) -> Option<&str> {
    extract_between(markdown, MARKER_PREFIX)
}

/// Content digest embedded in a rendering.
pub fn extract_digest(markdown: &str) -> Option<&str> {
    extract_between(markdown, DIGEST_PREFIX)
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn score_text(signal: &Signal) -> String {
    match signal.score {
        Some(score) if score.fract() == 0.0 => format!("{:.0}", score),
        Some(score) => format!("{:.2}", score),
        None => "—".to_string(),
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "PASS",
        Verdict::Warn => "WARN",
        Verdict::Fail => "FAIL",
    }
}

pub fn render_markdown(report: &Report) -> String {
    let meta = &report.meta;
    let mut out = String::new();

    out.push_str(&marker(&meta.commit_sha));
    out.push('\n');
    out.push_str(&format!("{}{}{}\n", DIGEST_PREFIX, report.content_digest, MARKER_SUFFIX));
    out.push_str("## 🤖 PBL Guardian — Evaluation Report\n\n");
    out.push_str(&format!(
        "**Verdict:** {} {}\n\n",
        report.verdict.glyph(),
        verdict_label(report.verdict)
    ));

    out.push_str("| Check | Result | Score | Status |\n");
    out.push_str("|---|---|---|---|\n");
    for signal in &report.signals {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            signal.layer.title(),
            cell(&signal.summary),
            score_text(signal),
            signal.status.glyph()
        ));
    }

    let short = &meta.commit_sha[..7.min(meta.commit_sha.len())];
    out.push_str(&format!(
        "\n**Commit:** `{}` by {} | **Phase:** {} | **Class Day:** {}\n",
        short,
        meta.author,
        meta.phase.as_deref().unwrap_or("—"),
        meta.class_day
            .as_deref()
            .map(|d| format!("✅ {}", d))
            .unwrap_or_else(|| "—".to_string()),
    ));

    for signal in report.signals.iter().filter(|s| !s.evidence.is_empty()) {
        out.push_str(&format!(
            "\n<details><summary>{} {}</summary>\n\n",
            signal.status.glyph(),
            signal.layer.title()
        ));
        for line in signal.evidence.iter().take(MAX_EVIDENCE_LINES) {
            out.push_str(&format!("- {}\n", line));
        }
        if signal.evidence.len() > MAX_EVIDENCE_LINES {
            out.push_str(&format!(
                "- … {} more\n",
                signal.evidence.len() - MAX_EVIDENCE_LINES
            ));
        }
        out.push_str("\n</details>\n");
    }

    let skipped = report
        .signals
        .iter()
        .filter(|s| s.status == SignalStatus::Skipped)
        .count();
    out.push_str("\n---\n");
    out.push_str(&format!(
        "*PBL Guardian v{} | Team: {} ({}) | {} of {} checks skipped | digest `{}`*\n",
        crate::VERSION,
        meta.team_name,
        meta.team_id,
        skipped,
        report.signals.len(),
        report.content_digest.short()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use pbl_guardian_domain::{Layer, ReportMeta};

    fn report(evaluated_at: DateTime<Utc>) -> Report {
        let meta = ReportMeta {
            team_id: "team-07".into(),
            team_name: "Byte Wizards".into(),
            commit_sha: "0123456789abcdef".into(),
            author: "asha".into(),
            committed_at: DateTime::parse_from_rfc3339("2026-03-02T10:00:00+05:30").unwrap(),
            phase: Some("Phase 1 - Setup".into()),
            class_day: Some("Monday".into()),
            evaluated_at,
        };
        let signals = Layer::CANONICAL
            .into_iter()
            .map(|l| match l {
                Layer::HistoryForensics => Signal::new(l, SignalStatus::Fail, 1.0, "1 flag | dump")
                    .with_evidence(["Code dump: commit abc1234 added 2096 lines (threshold 200)"]),
                Layer::PublicCode => Signal::skipped(l, "search credentials not configured"),
                _ => Signal::pass(l, 0.25, "ok"),
            })
            .collect();
        Report::assemble(meta, signals).unwrap()
    }

    #[test]
    fn test_markdown_contains_marker_and_canonical_rows() {
        let md = render_markdown(&report(Utc::now()));
        assert!(md.starts_with("<!-- pbl-guardian:commit=0123456789abcdef -->"));
        assert_eq!(extract_marker(&md), Some("0123456789abcdef"));

        let timing = md.find("| Timing |").unwrap();
        let l1 = md.find("| Plagiarism (L1 Corpus) |").unwrap();
        let l5 = md.find("| Commit Patterns (L5) |").unwrap();
        assert!(timing < l1 && l1 < l5);
        assert!(md.contains("**Verdict:** 🚨 FAIL"));
        assert!(md.contains("added 2096 lines"));
        assert!(md.contains("1 flag \\| dump"));
        assert!(md.contains("**Class Day:** ✅ Monday"));
    }

    #[test]
    fn test_markdown_stable_across_evaluation_times() {
        let a = RenderedReport::from_report(&report(Utc::now())).unwrap();
        let b = RenderedReport::from_report(&report(Utc::now() + chrono::Duration::hours(5))).unwrap();
        assert_eq!(a.markdown, b.markdown);
        assert_eq!(a.digest, b.digest);
        assert_eq!(extract_digest(&a.markdown), Some(a.digest.as_str()));
    }

    #[test]
    fn test_skipped_signal_has_no_score() {
        let md = render_markdown(&report(Utc::now()));
        assert!(md.contains("| Plagiarism (L3 Public Code) | Skipped: search credentials not configured | — | ⏭️ |"));
        assert!(md.contains("1 of 9 checks skipped"));
    }

    #[test]
    fn test_json_carries_schema_and_evaluation_time() {
        let rendered = RenderedReport::from_report(&report(Utc::now())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered.json).unwrap();
        assert_eq!(value["schema_version"], "pbl-guardian.report.v1");
        assert!(value["meta"]["evaluated_at"].is_string());
        assert_eq!(value["signals"].as_array().unwrap().len(), 9);
    }
}
