//! Fallback unmount publisher.
//!
//! Unpublish requests carry no volume context, so the publisher that
//! originally handled the publish cannot be identified.  The unmount logic
//! is identical for all plain bind mounts, so this publisher terminates the
//! chain for every unpublish the library publisher did not claim.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::bindmount::{bind_unmount, Mounter};
use super::{Publisher, PublisherResponse};
use crate::types::{NodePublishVolumeRequest, NodeUnpublishVolumeRequest};

/// Terminal unpublish handler.
pub struct UnmountPublisher {
    mounter: Arc<dyn Mounter>,
}

impl UnmountPublisher {
    /// Build the fallback unmount publisher.
    pub fn new(mounter: Arc<dyn Mounter>) -> Self {
        Self { mounter }
    }
}

#[async_trait]
impl Publisher for UnmountPublisher {
    fn name(&self) -> &'static str {
        "unmount"
    }

    async fn publish(&self, _req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        None
    }

    async fn unpublish(&self, req: &NodeUnpublishVolumeRequest) -> Option<PublisherResponse> {
        // No volume context on unpublish, so the response carries no type.
        Some(PublisherResponse {
            volume_type: String::new(),
            volume_path: String::new(),
            outcome: bind_unmount(&*self.mounter, Path::new(&req.target_path)),
        })
    }
}
