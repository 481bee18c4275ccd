//! Publisher for socket directory volumes.
//!
//! Bind-mounts the parent directory of the corresponding agent socket for
//! `APMSocketDirectory`, `DSDSocketDirectory`, and the deprecated
//! `DatadogSocketsDirectory` types.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::bindmount::{bind_mount, Mounter};
use super::{Publisher, PublisherResponse};
use crate::types::{NodePublishVolumeRequest, VolumeType};

/// Handles directory mounts using the `type` schema.
pub struct LocalPublisher {
    mounter: Arc<dyn Mounter>,
    apm_socket_path: PathBuf,
    dsd_socket_path: PathBuf,
}

impl LocalPublisher {
    /// Build a local publisher for the configured host socket paths.
    pub fn new(mounter: Arc<dyn Mounter>, apm_socket_path: &Path, dsd_socket_path: &Path) -> Self {
        Self {
            mounter,
            apm_socket_path: apm_socket_path.to_path_buf(),
            dsd_socket_path: dsd_socket_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        let volume_type = VolumeType::from_context(&req.volume_context)?;
        let host_path = match volume_type {
            VolumeType::ApmSocketDirectory => socket_dir(&self.apm_socket_path),
            VolumeType::DsdSocketDirectory => socket_dir(&self.dsd_socket_path),
            VolumeType::DatadogSocketsDirectory => {
                warn!(
                    "{} volume type is deprecated, prefer {} or {} instead",
                    VolumeType::DatadogSocketsDirectory,
                    VolumeType::DsdSocketDirectory,
                    VolumeType::ApmSocketDirectory,
                );
                socket_dir(&self.dsd_socket_path)
            }
            _ => return None,
        };

        let outcome = bind_mount(
            &*self.mounter,
            &host_path,
            Path::new(&req.target_path),
            false,
        );
        Some(PublisherResponse {
            volume_type: volume_type.as_str().to_owned(),
            volume_path: host_path.display().to_string(),
            outcome,
        })
    }

    // Unpublish is handled by the unmount fallback.
}

fn socket_dir(socket_path: &Path) -> PathBuf {
    socket_path
        .parent()
        .unwrap_or(Path::new("/"))
        .to_path_buf()
}
