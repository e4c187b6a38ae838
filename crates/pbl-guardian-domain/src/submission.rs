//! The evaluated event and the history records detectors consume.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One text file of the submitted source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the tree root, `/`-separated.
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Lowercase extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    /// SHA-256 of the file content.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Snapshot of the submission's text files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTree {
    /// Files sorted by path.
    pub files: Vec<SourceFile>,
    /// Files left out because they were binary or oversized.
    pub skipped_files: usize,
}

impl SourceTree {
    pub fn new(mut files: Vec<SourceFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        SourceTree {
            files,
            skipped_files: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// One evaluated push. Immutable for the whole evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub commit_sha: String,
    pub author: String,
    /// Commit time with its original offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Paths touched by this commit, relative to the repository root.
    pub changed_files: Vec<String>,
    pub tree: SourceTree,
}

impl Submission {
    /// First 7 characters of the commit identifier.
    pub fn short_sha(&self) -> &str {
        &self.commit_sha[..7.min(self.commit_sha.len())]
    }
}

/// Line delta of one file in one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDelta {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

/// One commit from version-control history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub author: String,
    pub timestamp: DateTime<FixedOffset>,
    pub additions: u64,
    pub deletions: u64,
    #[serde(default)]
    pub files: Vec<FileDelta>,
    #[serde(default)]
    pub message: String,
}

impl CommitRecord {
    /// Record without per-file detail.
    pub fn new(
        sha: impl Into<String>,
        author: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        additions: u64,
        deletions: u64,
    ) -> Self {
        CommitRecord {
            sha: sha.into(),
            author: author.into(),
            timestamp,
            additions,
            deletions,
            files: Vec::new(),
            message: String::new(),
        }
    }

    /// Total changed lines.
    pub fn size(&self) -> u64 {
        self.additions + self.deletions
    }

    pub fn short_sha(&self) -> &str {
        &self.sha[..7.min(self.sha.len())]
    }
}
