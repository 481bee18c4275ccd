//! First-match publisher dispatch.

use tracing::info;

use super::{Publisher, PublisherResponse};
use crate::types::{NodePublishVolumeRequest, NodeUnpublishVolumeRequest};

/// Chains publishers together, stopping at the first one that returns a
/// response.
pub struct PublisherChain {
    publishers: Vec<Box<dyn Publisher>>,
}

impl PublisherChain {
    /// Build a chain from an ordered list of publishers.
    pub fn new(publishers: Vec<Box<dyn Publisher>>) -> Self {
        Self { publishers }
    }

    /// Dispatch a publish request.  `None` means no publisher supports it.
    pub async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        for publisher in &self.publishers {
            if let Some(resp) = publisher.publish(req).await {
                if let Err(e) = &resp.outcome {
                    info!(
                        publisher = publisher.name(),
                        error = %e,
                        "failed to publish volume with publisher",
                    );
                }
                return Some(resp);
            }
        }
        None
    }

    /// Dispatch an unpublish request.  `None` means no publisher supports
    /// it.
    pub async fn unpublish(&self, req: &NodeUnpublishVolumeRequest) -> Option<PublisherResponse> {
        for publisher in &self.publishers {
            if let Some(resp) = publisher.unpublish(req).await {
                if let Err(e) = &resp.outcome {
                    info!(
                        publisher = publisher.name(),
                        error = %e,
                        "failed to unpublish volume with publisher",
                    );
                }
                return Some(resp);
            }
        }
        None
    }
}
