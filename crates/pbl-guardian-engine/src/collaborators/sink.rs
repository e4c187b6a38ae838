//! Filesystem report sink: `<dir>/<commit>.md` and `<dir>/<commit>.json`,
//! overwritten in place so each commit has one visible rendering.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{PublishOutcome, ReportSink};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::render::{extract_digest, RenderedReport};

#[derive(Debug, Clone)]
pub struct FsReportSink {
    dir: PathBuf,
}

impl FsReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsReportSink { dir: dir.into() }
    }

    pub fn markdown_path(&self, key: &str) -> CollaboratorResult<PathBuf> {
        Ok(self.dir.join(format!("{}.md", file_stem(key)?)))
    }

    pub fn json_path(&self, key: &str) -> CollaboratorResult<PathBuf> {
        Ok(self.dir.join(format!("{}.json", file_stem(key)?)))
    }
}

/// Keys become file names; anything but `[A-Za-z0-9_-]` is rejected.
fn file_stem(key: &str) -> CollaboratorResult<&str> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CollaboratorError::Io(format!(
            "report key {:?} is not a valid file name",
            key
        )));
    }
    Ok(key)
}

async fn write_atomic(path: &Path, content: &str) -> CollaboratorResult<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ReportSink for FsReportSink {
    async fn publish(&self, report: &RenderedReport) -> CollaboratorResult<PublishOutcome> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let md_path = self.markdown_path(&report.key)?;
        let json_path = self.json_path(&report.key)?;

        let outcome = match tokio::fs::read_to_string(&md_path).await {
            Ok(existing) if extract_digest(&existing) == Some(report.digest.as_str()) => {
                PublishOutcome::Unchanged
            }
            Ok(_) => PublishOutcome::Updated,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PublishOutcome::Created,
            Err(e) => return Err(e.into()),
        };

        if outcome != PublishOutcome::Unchanged {
            write_atomic(&md_path, &report.markdown).await?;
            write_atomic(&json_path, &report.json).await?;
        }
        debug!(key = %report.key, outcome = %outcome, "report written");
        Ok(outcome)
    }
}
