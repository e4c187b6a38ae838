//! L2: similarity against sibling team submissions.
//!
//! Peer comparison runs on its own schedule (`pbl-guardian peer-scan`), so
//! this layer only reads the latest snapshot. The snapshot may predate the
//! commit being evaluated; its timestamp is shown in evidence.

use async_trait::async_trait;
use pbl_guardian_domain::Layer;

use super::similarity::similarity_signal;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::DetectorError;

#[derive(Debug, Default, Clone, Copy)]
pub struct PeerDetector;

#[async_trait]
impl Detector for PeerDetector {
    fn layer(&self) -> Layer {
        Layer::Peer
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let store = ctx
            .collaborators
            .peer_scans
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("peer scan store not configured"))?;
        let snapshot = store
            .latest()
            .await?
            .ok_or_else(|| DetectorError::unavailable("no peer scan has run yet"))?;
        let entry = snapshot.entry_for(&ctx.config.team_id).ok_or_else(|| {
            DetectorError::unavailable("team not included in the latest peer scan")
        })?;
        if entry.peers_compared == 0 {
            return Err(DetectorError::unavailable("no peer submissions to compare"));
        }

        let mut signal = similarity_signal(
            Layer::Peer,
            &entry.report,
            ctx.config.plagiarism_threshold,
            "peer submissions",
        );
        signal.push_evidence(format!(
            "Peer scan of {} at {} ({} peers, {})",
            entry.team_id,
            snapshot.generated_at.format("%Y-%m-%d %H:%M UTC"),
            entry.peers_compared,
            snapshot.tool
        ));
        Ok(signal)
    }
}
