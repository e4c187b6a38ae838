//! Pylint-backed quality checker.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pbl_guardian_domain::{CommitRecord, SourceFile};
use serde::Deserialize;
use tracing::debug;

use super::command::{run_tool, write_files, Scratch, ToolCommand};
use super::{QualityChecker, QualityIssue, QualityOutcome, RevisionScore};
use crate::error::{CollaboratorError, CollaboratorResult};

/// Issues rendered in the report.
pub const MAX_REPORTED_ISSUES: usize = 5;

/// Missing module/class/function docstrings are not scored.
const DISABLED_CHECKS: &str = "C0114,C0115,C0116";

/// Most recent commits re-linted for skill-consistency scoring.
pub const MAX_SCORED_REVISIONS: usize = 30;

/// Runs `pylint --output-format=json2` over files resolved against `root`.
///
/// Historical revisions are read from the git repository at `repo`
/// (defaults to `root`) and linted in a scratch directory.
#[derive(Debug, Clone)]
pub struct PylintChecker {
    root: PathBuf,
    repo: PathBuf,
    program: String,
    max_line_length: u32,
    timeout_secs: u64,
}

impl PylintChecker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        PylintChecker {
            repo: root.clone(),
            root,
            program: "pylint".to_string(),
            max_line_length: 120,
            timeout_secs: 120,
        }
    }

    pub fn with_repo(mut self, repo: impl Into<PathBuf>) -> Self {
        self.repo = repo.into();
        self
    }

    /// Override the executable (e.g. a virtualenv path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl QualityChecker for PylintChecker {
    fn name(&self) -> &str {
        "pylint"
    }

    fn supports(&self, language: &str) -> bool {
        matches!(language.trim().to_ascii_lowercase().as_str(), "python" | "py" | "python3")
    }

    async fn check(&self, files: &[SourceFile]) -> CollaboratorResult<QualityOutcome> {
        let outcome = self.lint(&self.root, files).await?;
        debug!(score = outcome.score, issues = outcome.total_issues, "pylint finished");
        Ok(outcome)
    }

    /// One score per commit that touched Python files, linting those files
    /// as they stood at that commit. Commits without Python changes are
    /// left out.
    async fn score_revisions(
        &self,
        commits: &[CommitRecord],
    ) -> CollaboratorResult<Vec<RevisionScore>> {
        let start = commits.len().saturating_sub(MAX_SCORED_REVISIONS);
        let mut scores = Vec::new();
        for commit in &commits[start..] {
            let files = self.files_at(commit).await?;
            if files.is_empty() {
                continue;
            }
            let scratch = Scratch::create()?;
            write_files(scratch.path(), &files)?;
            let outcome = self.lint(scratch.path(), &files).await?;
            scores.push(RevisionScore {
                sha: commit.sha.clone(),
                score: outcome.score,
            });
        }
        debug!(revisions = scores.len(), "pylint revision scores");
        Ok(scores)
    }
}

impl PylintChecker {
    async fn lint(&self, dir: &Path, files: &[SourceFile]) -> CollaboratorResult<QualityOutcome> {
        let cmd = ToolCommand::new(&self.program)
            .args([
                "--output-format=json2".to_string(),
                format!("--disable={}", DISABLED_CHECKS),
                format!("--max-line-length={}", self.max_line_length),
                "--score=y".to_string(),
            ])
            .args(files.iter().map(|f| f.path.clone()))
            .current_dir(dir)
            .timeout_secs(self.timeout_secs);

        // pylint exits non-zero whenever it reports issues.
        let output = run_tool(&cmd).await?;
        if output.stdout.trim().is_empty() {
            return Err(CollaboratorError::Command {
                program: self.program.clone(),
                message: format!("no output (exit {}): {}", output.exit_code, output.stderr.trim()),
            });
        }
        parse_json2(&output.stdout, files.len())
    }

    /// Python files the commit added to, read back with `git show`.
    /// Paths that no longer exist at that commit are skipped.
    async fn files_at(&self, commit: &CommitRecord) -> CollaboratorResult<Vec<SourceFile>> {
        let mut files = Vec::new();
        for delta in &commit.files {
            if delta.additions == 0 || !delta.path.ends_with(".py") {
                continue;
            }
            let cmd = ToolCommand::new("git")
                .arg("show")
                .arg(format!("{}:{}", commit.sha, delta.path))
                .current_dir(&self.repo)
                .timeout_secs(self.timeout_secs);
            let output = run_tool(&cmd).await?;
            if output.success() {
                files.push(SourceFile::new(delta.path.clone(), output.stdout));
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Deserialize)]
struct Json2Report {
    #[serde(default)]
    messages: Vec<Json2Message>,
    statistics: Json2Statistics,
}

#[derive(Debug, Deserialize)]
struct Json2Message {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    line: u32,
}

#[derive(Debug, Deserialize)]
struct Json2Statistics {
    score: f64,
}

fn severity_rank(kind: &str) -> u8 {
    match kind {
        "fatal" => 0,
        "error" => 1,
        "warning" => 2,
        "refactor" => 3,
        "convention" => 4,
        _ => 5,
    }
}

/// Parse pylint's json2 report. Issues are ordered by severity, then
/// location, and bounded to [`MAX_REPORTED_ISSUES`].
pub fn parse_json2(raw: &str, files_checked: usize) -> CollaboratorResult<QualityOutcome> {
    let report: Json2Report = serde_json::from_str(raw.trim())?;
    let total_issues = report.messages.len();

    let mut messages = report.messages;
    messages.sort_by(|a, b| {
        severity_rank(&a.kind)
            .cmp(&severity_rank(&b.kind))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.line.cmp(&b.line))
    });

    let issues = messages
        .into_iter()
        .take(MAX_REPORTED_ISSUES)
        .map(|m| QualityIssue {
            path: m.path,
            line: m.line,
            symbol: m.symbol,
            message: m.message,
        })
        .collect();

    Ok(QualityOutcome {
        score: report.statistics.score.clamp(0.0, 10.0),
        issues,
        total_issues,
        files_checked,
    })
}
