//! Proof-of-progress classification over a commit's changed files.

use std::path::PathBuf;

use async_trait::async_trait;
use walkdir::WalkDir;

use super::{ProofChecker, ProofSummary};
use crate::error::CollaboratorResult;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "svg"];
const DOC_EXTENSIONS: &[&str] = &["md", "txt", "pdf", "doc", "docx"];

/// Changes under these prefixes are tooling, not code.
const NON_CODE_PREFIXES: &[&str] = &[".pbl/", ".github/", "scripts/"];

const PLACEHOLDER: &str = ".gitkeep";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofKind {
    Screenshot,
    Document,
    Other,
}

/// Classify a proof artifact by extension.
pub fn classify(path: &str) -> ProofKind {
    let name = path.rsplit('/').next().unwrap_or(path);
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        ProofKind::Screenshot
    } else if DOC_EXTENSIONS.contains(&ext.as_str()) {
        ProofKind::Document
    } else {
        ProofKind::Other
    }
}

fn normalize_dir(proof_directory: &str) -> String {
    let trimmed = proof_directory.trim().trim_start_matches("./").trim_end_matches('/');
    format!("{}/", trimmed)
}

/// Counts proofs among the changed files. With a repository root it also
/// reports how many proofs the directory holds overall.
#[derive(Debug, Clone, Default)]
pub struct ChangedFilesProofChecker {
    repo_root: Option<PathBuf>,
}

impl ChangedFilesProofChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = Some(root.into());
        self
    }

    fn count_repository_proofs(&self, dir: &str) -> Option<usize> {
        let root = self.repo_root.as_ref()?.join(dir.trim_end_matches('/'));
        if !root.is_dir() {
            return Some(0);
        }
        let count = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() != PLACEHOLDER)
            .count();
        Some(count)
    }
}

#[async_trait]
impl ProofChecker for ChangedFilesProofChecker {
    async fn check(
        &self,
        changed_files: &[String],
        proof_directory: &str,
    ) -> CollaboratorResult<ProofSummary> {
        let dir = normalize_dir(proof_directory);
        let mut summary = ProofSummary::default();

        for path in changed_files {
            if path.starts_with(&dir) {
                if path.rsplit('/').next() == Some(PLACEHOLDER) {
                    continue;
                }
                match classify(path) {
                    ProofKind::Screenshot => summary.screenshots += 1,
                    ProofKind::Document => summary.documents += 1,
                    ProofKind::Other => summary.other += 1,
                }
                summary.proof_files.push(path.clone());
            } else if !NON_CODE_PREFIXES.iter().any(|p| path.starts_with(p)) {
                summary.code_files_changed += 1;
            }
        }

        summary.total_in_repository = self.count_repository_proofs(&dir);
        Ok(summary)
    }
}
