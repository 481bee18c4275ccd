//! The Datadog CSI driver.
//!
//! [`CsiDriver`] implements the [`CsiIdentity`] and [`CsiNode`] traits by
//! dispatching publish and unpublish requests through the publisher chain
//! and recording the outcome as metrics.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::librarymanager::{LibraryError, LibraryManager};
use crate::metrics::{self, Status};
use crate::node::CsiNode;
use crate::publishers::{publishers, Mounter, PublisherChain, SystemMounter};
use crate::types::{
    NodeCapability, NodeInfo, NodePublishVolumeRequest, NodeUnpublishVolumeRequest,
    PluginCapability, PluginInfo, KEY_TYPE,
};

/// CSI Node and Identity server for Datadog volumes.
pub struct CsiDriver {
    name: String,
    version: String,
    node_id: String,
    publisher: PublisherChain,
    library_manager: Arc<LibraryManager>,
}

impl CsiDriver {
    /// Build the driver from its configuration, creating the storage layout
    /// and library manager.
    pub fn new(config: &Config) -> Result<Self, LibraryError> {
        let mounter: Arc<dyn Mounter> = Arc::new(SystemMounter);

        fs::create_dir_all(&config.storage_path).map_err(|source| LibraryError::Setup {
            path: config.storage_path.clone(),
            source,
        })?;

        let library_manager = Arc::new(LibraryManager::new(&config.storage_path)?);
        let publisher = publishers(
            mounter,
            &config.apm_host_socket_path,
            &config.dsd_host_socket_path,
            &config.storage_path,
            Arc::clone(&library_manager),
            config.disable_ssi,
        );

        let node_id = std::env::var("NODE_ID").unwrap_or_default();
        if node_id.is_empty() {
            warn!("NODE_ID environment variable is not set");
        }

        Ok(Self {
            name: config.driver_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            node_id,
            publisher,
            library_manager,
        })
    }

    /// Build a driver from pre-assembled parts.  Exposed for tests.
    pub fn with_parts(
        name: impl Into<String>,
        node_id: impl Into<String>,
        publisher: PublisherChain,
        library_manager: Arc<LibraryManager>,
    ) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            node_id: node_id.into(),
            publisher,
            library_manager,
        }
    }

    /// The driver version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Stop the driver: flush pending library cleanups.
    pub async fn stop(&self) {
        self.library_manager.stop().await;
    }
}

#[async_trait]
impl CsiIdentity for CsiDriver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: self.name.clone(),
            vendor_version: self.version.clone(),
        })
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(vec![PluginCapability::Service])
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(true)
    }
}

#[async_trait]
impl CsiNode for CsiDriver {
    async fn get_capabilities(&self) -> Result<Vec<NodeCapability>, CsiError> {
        // No staging for inline volumes.
        Ok(Vec::new())
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.node_id.clone(),
        })
    }

    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        info!(
            target_path = %req.target_path,
            volume_id = %req.volume_id,
            volume_context = ?req.volume_context,
            "received NodePublishVolume request",
        );

        match self.publisher.publish(&req).await {
            Some(resp) => {
                let status = if resp.outcome.is_ok() {
                    Status::Success
                } else {
                    Status::Failed
                };
                metrics::record_volume_mount_attempt(&resp.volume_type, &resp.volume_path, status);
                resp.outcome
            }
            // Unsupported requests succeed so the kubelet does not retry
            // forever; the metric records the miss.
            None => {
                warn!("publish volume request not supported by any publisher");
                let volume_type = req.volume_context.get(KEY_TYPE).cloned().unwrap_or_default();
                metrics::record_volume_mount_attempt(
                    &volume_type,
                    &req.target_path,
                    Status::Unsupported,
                );
                Ok(())
            }
        }
    }

    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<(), CsiError> {
        info!(
            target_path = %req.target_path,
            volume_id = %req.volume_id,
            "received NodeUnpublishVolume request",
        );

        match self.publisher.unpublish(&req).await {
            Some(resp) => {
                let status = if resp.outcome.is_ok() {
                    Status::Success
                } else {
                    Status::Failed
                };
                metrics::record_volume_unmount_attempt(status);
                resp.outcome
            }
            None => {
                warn!("unpublish volume request not supported by any publisher");
                metrics::record_volume_unmount_attempt(Status::Unsupported);
                Ok(())
            }
        }
    }
}
