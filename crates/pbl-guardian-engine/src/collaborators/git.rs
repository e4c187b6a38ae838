//! Git-backed history provider and commit helpers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use pbl_guardian_domain::{CommitRecord, FileDelta};
use tracing::debug;

use super::command::{run_tool_checked, ToolCommand};
use super::{HistoryProvider, HistoryRange};
use crate::error::{CollaboratorError, CollaboratorResult};

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%aN%x1f%aI%x1f%s";

/// Reads commit history with `git log --numstat`. Merge commits are
/// excluded so their combined diffs are not double counted.
#[derive(Debug, Clone)]
pub struct GitHistory {
    repo: PathBuf,
    timeout_secs: u64,
}

impl GitHistory {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        GitHistory {
            repo: repo.into(),
            timeout_secs: 60,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl HistoryProvider for GitHistory {
    async fn commits(&self, range: &HistoryRange) -> CollaboratorResult<Vec<CommitRecord>> {
        let rev = match &range.since {
            Some(since) => format!("{}..{}", since, range.until),
            None => range.until.clone(),
        };
        let cmd = ToolCommand::new("git")
            .args(["log", "--no-merges", "--reverse", "--numstat", LOG_FORMAT])
            .arg(rev)
            .current_dir(&self.repo)
            .timeout_secs(self.timeout_secs);
        let output = run_tool_checked(&cmd).await?;
        let commits = parse_log(&output.stdout)?;
        debug!(repo = %self.repo.display(), commits = commits.len(), "history loaded");
        Ok(commits)
    }
}

/// Parse `git log` output produced with [`LOG_FORMAT`] and `--numstat`.
pub fn parse_log(raw: &str) -> CollaboratorResult<Vec<CommitRecord>> {
    let mut commits = Vec::new();
    for record in raw.split(RECORD_SEP).filter(|r| !r.trim().is_empty()) {
        let mut lines = record.lines();
        let header = lines.next().unwrap_or_default();
        let fields: Vec<&str> = header.split(FIELD_SEP).collect();
        if fields.len() < 3 {
            return Err(CollaboratorError::Parse(format!(
                "malformed git log header: {:?}",
                header
            )));
        }
        let timestamp = DateTime::parse_from_rfc3339(fields[2].trim()).map_err(|e| {
            CollaboratorError::Parse(format!("bad commit date {:?}: {}", fields[2], e))
        })?;

        let files: Vec<FileDelta> = lines.filter_map(parse_numstat_line).collect();
        let additions = files.iter().map(|f| f.additions).sum();
        let deletions = files.iter().map(|f| f.deletions).sum();

        let mut commit = CommitRecord::new(fields[0].trim(), fields[1].trim(), timestamp, additions, deletions);
        commit.files = files;
        commit.message = fields.get(3).map(|s| s.trim().to_string()).unwrap_or_default();
        commits.push(commit);
    }
    Ok(commits)
}

/// `added<TAB>deleted<TAB>path`. Binary files report `-` and count as zero.
fn parse_numstat_line(line: &str) -> Option<FileDelta> {
    let mut parts = line.splitn(3, '\t');
    let added = parts.next()?.trim();
    let deleted = parts.next()?.trim();
    let path = parts.next()?.trim();
    if path.is_empty() {
        return None;
    }
    Some(FileDelta {
        path: path.to_string(),
        additions: added.parse().unwrap_or(0),
        deletions: deleted.parse().unwrap_or(0),
    })
}

/// Paths touched by one commit (`git diff-tree`). Works for root commits.
pub async fn changed_files(repo: &Path, sha: &str) -> CollaboratorResult<Vec<String>> {
    let cmd = ToolCommand::new("git")
        .args(["diff-tree", "--root", "--no-commit-id", "--name-only", "-r", sha])
        .current_dir(repo);
    let output = run_tool_checked(&cmd).await?;
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Author and timestamp of one commit.
pub async fn commit_metadata(
    repo: &Path,
    sha: &str,
) -> CollaboratorResult<(String, DateTime<FixedOffset>)> {
    let cmd = ToolCommand::new("git")
        .args(["show", "-s", "--format=%aN%x1f%aI", sha])
        .current_dir(repo);
    let output = run_tool_checked(&cmd).await?;
    let line = output.stdout.trim();
    let (author, date) = line
        .split_once(FIELD_SEP)
        .ok_or_else(|| CollaboratorError::Parse(format!("unexpected git show output: {:?}", line)))?;
    let timestamp = DateTime::parse_from_rfc3339(date.trim())
        .map_err(|e| CollaboratorError::Parse(format!("bad commit date {:?}: {}", date, e)))?;
    Ok((author.trim().to_string(), timestamp))
}

/// Resolve HEAD to a full commit identifier.
pub async fn head_sha(repo: &Path) -> CollaboratorResult<String> {
    let cmd = ToolCommand::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo);
    let sha = run_tool_checked(&cmd).await?.stdout.trim().to_string();
    if sha.is_empty() {
        return Err(CollaboratorError::Parse(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}
