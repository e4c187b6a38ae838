//! Read-only inputs shared by every detector of one evaluation.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use pbl_guardian_domain::{CommitRecord, Result, SourceFile, Submission, TeamConfig};

use crate::cache::{QueryCache, QueryKey};
use crate::collaborators::{Collaborators, HistoryRange};
use crate::error::DetectorError;
use crate::language::LanguageProfile;
use crate::source::eligible_files;

/// Everything a detector may read. Cheap to share behind an `Arc`; nothing
/// in it is mutable except the query cache.
#[derive(Debug)]
pub struct EvaluationContext {
    pub submission: Arc<Submission>,
    pub config: Arc<TeamConfig>,
    pub collaborators: Collaborators,
    /// Window of history the equity and forensics layers look at.
    pub history_range: HistoryRange,
    pub cache: QueryCache,
    timezone: Tz,
}

impl EvaluationContext {
    /// Resolve config-derived values. Fails on an invalid timezone.
    pub fn new(
        submission: Arc<Submission>,
        config: Arc<TeamConfig>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let timezone = config.timezone()?;
        let history_range = HistoryRange::until(submission.commit_sha.clone());
        Ok(EvaluationContext {
            submission,
            config,
            collaborators,
            history_range,
            cache: QueryCache::new(),
            timezone,
        })
    }

    pub fn with_history_range(mut self, range: HistoryRange) -> Self {
        self.history_range = range;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Commit time in the team timezone.
    pub fn local_commit_time(&self) -> DateTime<Tz> {
        self.submission.timestamp.with_timezone(&self.timezone)
    }

    /// Profile for the configured language, if it is one we know.
    pub fn language_profile(&self) -> Option<&'static LanguageProfile> {
        LanguageProfile::for_language(&self.config.language)
    }

    /// Source files of the configured language, excluding vendored and
    /// generated paths.
    pub fn eligible_files(&self) -> Vec<&SourceFile> {
        match self.language_profile() {
            Some(profile) => eligible_files(&self.submission.tree, profile),
            None => Vec::new(),
        }
    }

    /// Commit history for the evaluation window. Fetched once per
    /// evaluation and shared by every caller.
    pub async fn history(&self) -> std::result::Result<Arc<Vec<CommitRecord>>, DetectorError> {
        let provider = self
            .collaborators
            .history
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("commit history not available"))?;

        let range = &self.history_range;
        let key = QueryKey::new(
            "history",
            [range.since.as_deref().unwrap_or(""), range.until.as_str()],
        );
        let commits = self
            .cache
            .get_or_fetch(key, || async {
                provider.commits(range).await.map(Arc::new)
            })
            .await?;
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticHistory;
    use chrono::DateTime;
    use pbl_guardian_domain::{SourceTree, SourceFile};

    fn submission() -> Submission {
        Submission {
            commit_sha: "abc1234def".into(),
            author: "asha".into(),
            timestamp: DateTime::parse_from_rfc3339("2026-03-01T20:00:00+00:00").unwrap(),
            changed_files: vec!["src/app.py".into()],
            tree: SourceTree::new(vec![
                SourceFile::new("src/app.py", "x = 1\n"),
                SourceFile::new("node_modules/x/index.js", "y"),
            ]),
        }
    }

    fn config() -> TeamConfig {
        TeamConfig::from_json_str(r#"{"team_id": "t1", "timezone": "Asia/Kolkata"}"#).unwrap()
    }

    #[test]
    fn test_local_commit_time_uses_team_zone() {
        let ctx = EvaluationContext::new(
            Arc::new(submission()),
            Arc::new(config()),
            Collaborators::new(),
        )
        .unwrap();
        let local = ctx.local_commit_time();
        assert_eq!(local.to_rfc3339(), "2026-03-02T01:30:00+05:30");
        assert_eq!(ctx.eligible_files().len(), 1);
    }

    #[tokio::test]
    async fn test_history_unavailable_without_provider() {
        let ctx = EvaluationContext::new(
            Arc::new(submission()),
            Arc::new(config()),
            Collaborators::new(),
        )
        .unwrap();
        assert!(matches!(ctx.history().await, Err(DetectorError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_history_fetched_once() {
        let history = Arc::new(StaticHistory::new(vec![]));
        let ctx = EvaluationContext::new(
            Arc::new(submission()),
            Arc::new(config()),
            Collaborators::new().with_history(history.clone()),
        )
        .unwrap();
        ctx.history().await.unwrap();
        ctx.history().await.unwrap();
        assert_eq!(history.calls(), 1);
        assert_eq!(ctx.cache.stats().hits, 1);
    }
}
