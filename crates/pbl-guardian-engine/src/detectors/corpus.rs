//! L1: similarity against the owner-supplied reference corpus.

use async_trait::async_trait;
use pbl_guardian_domain::Layer;
use tracing::debug;

use super::similarity::{comparable_files, compare_cached, similarity_signal};
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::DetectorError;

#[derive(Debug, Default, Clone, Copy)]
pub struct CorpusDetector;

#[async_trait]
impl Detector for CorpusDetector {
    fn layer(&self) -> Layer {
        Layer::Corpus
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let provider = ctx
            .collaborators
            .corpus
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("no reference corpus configured"))?;
        let tool = ctx
            .collaborators
            .similarity
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("similarity tool not configured"))?;
        let files = comparable_files(ctx)?;

        let corpus = provider.load(&ctx.config.reference_corpora).await?;
        if corpus.is_empty() {
            return Err(DetectorError::unavailable("reference corpus is empty"));
        }
        debug!(sources = corpus.sources.len(), files = files.len(), "comparing against corpus");

        let report = compare_cached(ctx, tool.as_ref(), &files, &corpus).await?;
        let mut signal = similarity_signal(
            Layer::Corpus,
            &report,
            ctx.config.plagiarism_threshold,
            "reference corpus",
        );
        signal.push_evidence(format!(
            "Compared {} files against {} reference sources with {}",
            files.len(),
            corpus.sources.len(),
            tool.name()
        ));
        Ok(signal)
    }
}
