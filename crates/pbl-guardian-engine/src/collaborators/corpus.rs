//! Filesystem reference corpus: one sub-directory per reference repository.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Corpus, CorpusProvider, CorpusSource};
use crate::error::CollaboratorResult;
use crate::source::{is_excluded, load_tree};

#[derive(Debug, Clone)]
pub struct FsCorpusProvider {
    root: PathBuf,
}

impl FsCorpusProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsCorpusProvider { root: root.into() }
    }
}

#[async_trait]
impl CorpusProvider for FsCorpusProvider {
    async fn load(&self, selection: &[String]) -> CollaboratorResult<Corpus> {
        let root = self.root.clone();
        let selection = selection.to_vec();
        // Directory walking is blocking I/O.
        tokio::task::spawn_blocking(move || load_sync(root, &selection))
            .await
            .map_err(|e| crate::error::CollaboratorError::Io(e.to_string()))?
    }
}

fn load_sync(root: PathBuf, selection: &[String]) -> CollaboratorResult<Corpus> {
    let id = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reference".to_string());
    let mut corpus = Corpus {
        id,
        sources: Vec::new(),
    };
    if !root.is_dir() {
        return Ok(corpus);
    }

    let mut dirs: Vec<(String, PathBuf)> = std::fs::read_dir(&root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .filter(|(name, _)| !name.starts_with('.'))
        .collect();
    dirs.sort();

    for wanted in selection {
        if !dirs.iter().any(|(name, _)| name == wanted) {
            warn!(source = %wanted, "configured reference corpus not present");
        }
    }

    for (name, path) in dirs {
        if !selection.is_empty() && !selection.contains(&name) {
            continue;
        }
        let tree = load_tree(&path)?;
        let files = tree
            .files
            .into_iter()
            .filter(|f| !is_excluded(&f.path))
            .collect();
        corpus.sources.push(CorpusSource { id: name, files });
    }
    debug!(root = %root.display(), sources = corpus.sources.len(), "corpus loaded");
    Ok(corpus)
}
