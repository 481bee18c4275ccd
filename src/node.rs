//! CSI Node service trait.
//!
//! The Node service runs on each worker node and performs the local
//! filesystem operations that make a Datadog volume available to Pod
//! containers:
//!
//! 1. **Publish** — bind-mount an agent socket, socket directory,
//!    instrumentation library, or injector preload file into the Pod.
//! 2. **Unpublish** — remove the bind-mount and release any tracked library.
//!
//! Inline CSI volumes do not stage, so there is no stage/unstage surface.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    NodeCapability, NodeInfo, NodePublishVolumeRequest, NodeUnpublishVolumeRequest,
};

/// Node service — local mount / unmount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Return the capabilities of the node service.  Always empty for this
    /// driver (no staging).
    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;

    /// Publish a volume: dispatch the request through the publisher chain.
    ///
    /// This is idempotent — republishing an already-mounted volume succeeds.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish a volume: unmount and remove the target path.
    ///
    /// This is idempotent — unpublishing an absent target succeeds.
    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<(), CsiError>;
}
