//! Scheduled peer comparison and its on-disk snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{Corpus, CorpusSource, PeerScanEntry, PeerScanSnapshot, PeerScanStore, SimilarityTool};
use crate::error::CollaboratorResult;
use crate::language::LanguageProfile;
use crate::source::{is_excluded, load_tree};

/// Stores the latest snapshot as one JSON file.
#[derive(Debug, Clone)]
pub struct FsPeerScanStore {
    path: PathBuf,
}

impl FsPeerScanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FsPeerScanStore { path: path.into() }
    }
}

#[async_trait]
impl PeerScanStore for FsPeerScanStore {
    async fn latest(&self) -> CollaboratorResult<Option<PeerScanSnapshot>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &PeerScanSnapshot) -> CollaboratorResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        // Write then rename so readers never see a partial snapshot.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Load each sub-directory of `peers_dir` as one team submission, keeping
/// only files of the given language.
pub fn load_submissions(
    peers_dir: &Path,
    profile: &LanguageProfile,
) -> CollaboratorResult<Vec<CorpusSource>> {
    let mut dirs: Vec<(String, PathBuf)> = std::fs::read_dir(peers_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
        .filter(|(name, _)| !name.starts_with('.'))
        .collect();
    dirs.sort();

    let mut submissions = Vec::with_capacity(dirs.len());
    for (team_id, path) in dirs {
        submissions.push(load_submission(team_id, &path, profile)?);
    }
    Ok(submissions)
}

/// Load one team's tree as a comparison source.
pub fn load_submission(
    team_id: impl Into<String>,
    dir: &Path,
    profile: &LanguageProfile,
) -> CollaboratorResult<CorpusSource> {
    let tree = load_tree(dir)?;
    let files = tree
        .files
        .into_iter()
        .filter(|f| !is_excluded(&f.path))
        .filter(|f| f.extension().is_some_and(|ext| profile.matches_extension(&ext)))
        .collect();
    Ok(CorpusSource {
        id: team_id.into(),
        files,
    })
}

/// Compare every submission against all the others.
pub async fn run_peer_scan(
    submissions: &[CorpusSource],
    tool: &dyn SimilarityTool,
) -> CollaboratorResult<PeerScanSnapshot> {
    let mut entries = Vec::with_capacity(submissions.len());
    for (i, team) in submissions.iter().enumerate() {
        let peers = Corpus {
            id: "peers".to_string(),
            sources: submissions
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, s)| s.clone())
                .collect(),
        };
        let report = tool.compare(&team.files, &peers).await?;
        debug!(team = %team.id, max = report.max_percentage, "peer comparison finished");
        entries.push(PeerScanEntry {
            team_id: team.id.clone(),
            peers_compared: peers.sources.len(),
            report,
        });
    }
    info!(teams = entries.len(), tool = tool.name(), "peer scan finished");
    Ok(PeerScanSnapshot {
        generated_at: Utc::now(),
        tool: tool.name().to_string(),
        entries,
    })
}
