//! The uniform detector capability.

use std::sync::Arc;

use async_trait::async_trait;
use pbl_guardian_domain::{Layer, Signal};

use crate::context::EvaluationContext;
use crate::detectors::{
    corpus::CorpusDetector, equity::EquityDetector, forensics::ForensicsDetector,
    peer::PeerDetector, proofs::ProofsDetector, public_code::PublicCodeDetector,
    quality::QualityDetector, synthetic::SyntheticOriginDetector, timing::TimingDetector,
};
use crate::error::DetectorError;

pub type DetectorResult = std::result::Result<Signal, DetectorError>;

/// One evaluation dimension. Implementations read the context and return a
/// signal for their own layer; they share no mutable state.
#[async_trait]
pub trait Detector: Send + Sync {
    fn layer(&self) -> Layer;

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult;
}

/// One detector per layer, in canonical order.
pub fn standard_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(TimingDetector),
        Arc::new(QualityDetector),
        Arc::new(ProofsDetector),
        Arc::new(EquityDetector),
        Arc::new(CorpusDetector),
        Arc::new(PeerDetector),
        Arc::new(PublicCodeDetector::default()),
        Arc::new(SyntheticOriginDetector),
        Arc::new(ForensicsDetector),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_detectors_cover_every_layer_once() {
        let layers: Vec<Layer> = standard_detectors().iter().map(|d| d.layer()).collect();
        assert_eq!(layers, Layer::CANONICAL.to_vec());
    }
}
