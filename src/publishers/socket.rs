//! Publisher for `APMSocket` and `DSDSocket` volumes.
//!
//! Verifies the host path is a UNIX domain socket and bind-mounts it as a
//! file into the workload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::bindmount::{bind_mount, is_socket_path, Mounter};
use super::{Publisher, PublisherResponse};
use crate::error::CsiError;
use crate::types::{NodePublishVolumeRequest, VolumeType};

/// Handles socket file mounts using the `type` schema.
pub struct SocketPublisher {
    mounter: Arc<dyn Mounter>,
    apm_socket_path: PathBuf,
    dsd_socket_path: PathBuf,
}

impl SocketPublisher {
    /// Build a socket publisher for the configured host socket paths.
    pub fn new(mounter: Arc<dyn Mounter>, apm_socket_path: &Path, dsd_socket_path: &Path) -> Self {
        Self {
            mounter,
            apm_socket_path: apm_socket_path.to_path_buf(),
            dsd_socket_path: dsd_socket_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl Publisher for SocketPublisher {
    fn name(&self) -> &'static str {
        "socket"
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        let volume_type = VolumeType::from_context(&req.volume_context)?;
        let host_path = match volume_type {
            VolumeType::ApmSocket => &self.apm_socket_path,
            VolumeType::DsdSocket => &self.dsd_socket_path,
            _ => return None,
        };

        let response = |outcome| PublisherResponse {
            volume_type: volume_type.as_str().to_owned(),
            volume_path: host_path.display().to_string(),
            outcome,
        };

        match is_socket_path(host_path) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                return Some(response(Err(CsiError::FailedPrecondition(format!(
                    "socket not found at {}",
                    host_path.display()
                )))));
            }
        }

        Some(response(bind_mount(
            &*self.mounter,
            host_path,
            Path::new(&req.target_path),
            true,
        )))
    }

    // Unpublish is handled by the unmount fallback.
}
