use crate::domain::{ChirpstackNormalizer, LoriotNormalizer, PublishPipeline};
use async_trait::async_trait;
use common::DomainResult;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Trait for handling one raw uplink message from a transport.
///
/// Transports own connection and delivery concerns; a handler owns
/// normalization and publishing. A returned error means the message
/// was rejected and the transport should move on.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UplinkHandler: Send + Sync {
    async fn handle_message(&self, payload: &[u8]) -> DomainResult<()>;
}

/// Handler for ChirpStack uplink events
pub struct ChirpstackHandler {
    normalizer: ChirpstackNormalizer,
    pipeline: Arc<PublishPipeline>,
    dry_run: bool,
}

impl ChirpstackHandler {
    pub fn new(
        normalizer: ChirpstackNormalizer,
        pipeline: Arc<PublishPipeline>,
        dry_run: bool,
    ) -> Self {
        Self {
            normalizer,
            pipeline,
            dry_run,
        }
    }
}

#[async_trait]
impl UplinkHandler for ChirpstackHandler {
    #[instrument(skip_all)]
    async fn handle_message(&self, payload: &[u8]) -> DomainResult<()> {
        let uplink = match self.normalizer.normalize(payload).await {
            Ok(uplink) => uplink,
            Err(e) => {
                warn!(error = %e, "rejected uplink event");
                return Err(e);
            }
        };

        if self.dry_run {
            self.pipeline.log_measurements(&uplink);
            return Ok(());
        }

        self.pipeline.process(&uplink).await;
        Ok(())
    }
}

/// Handler for Loriot websocket frames
pub struct LoriotHandler {
    normalizer: LoriotNormalizer,
    pipeline: Arc<PublishPipeline>,
    dry_run: bool,
}

impl LoriotHandler {
    pub fn new(normalizer: LoriotNormalizer, pipeline: Arc<PublishPipeline>, dry_run: bool) -> Self {
        Self {
            normalizer,
            pipeline,
            dry_run,
        }
    }
}

#[async_trait]
impl UplinkHandler for LoriotHandler {
    #[instrument(skip_all)]
    async fn handle_message(&self, payload: &[u8]) -> DomainResult<()> {
        let uplink = match self.normalizer.normalize(payload).await {
            Ok(uplink) => uplink,
            Err(e) => {
                warn!(error = %e, "rejected uplink frame");
                return Err(e);
            }
        };

        if self.dry_run {
            self.pipeline.log_measurements(&uplink);
            return Ok(());
        }

        self.pipeline.process(&uplink).await;
        Ok(())
    }
}
