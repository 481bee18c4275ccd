//! Publisher for the deprecated `mode: socket` schema.
//!
//! Deprecated and kept for existing pod specs; use `type: APMSocket` or
//! `type: DSDSocket` instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::bindmount::{bind_mount, is_socket_path, Mounter};
use super::{Publisher, PublisherResponse};
use crate::error::CsiError;
use crate::types::{NodePublishVolumeRequest, KEY_MODE, KEY_PATH, KEY_TYPE};

const MODE_SOCKET: &str = "socket";

/// Handles the deprecated `mode`/`path` schema for socket mounts.
pub struct SocketLegacyPublisher {
    mounter: Arc<dyn Mounter>,
    apm_socket_path: PathBuf,
    dsd_socket_path: PathBuf,
}

impl SocketLegacyPublisher {
    /// Build a legacy socket publisher for the configured host socket paths.
    pub fn new(mounter: Arc<dyn Mounter>, apm_socket_path: &Path, dsd_socket_path: &Path) -> Self {
        Self {
            mounter,
            apm_socket_path: apm_socket_path.to_path_buf(),
            dsd_socket_path: dsd_socket_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl Publisher for SocketLegacyPublisher {
    fn name(&self) -> &'static str {
        "socket-legacy"
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        let ctx = &req.volume_context;
        // The legacy schema only applies when no `type` is given.
        if ctx.contains_key(KEY_TYPE) {
            return None;
        }

        let mode = ctx.get(KEY_MODE)?;
        let host_path = ctx.get(KEY_PATH)?;
        if mode != MODE_SOCKET {
            return None;
        }

        warn!(
            "using deprecated mode/path schema, migrate to 'type: APMSocket' or 'type: DSDSocket'"
        );

        let response = |outcome| PublisherResponse {
            volume_type: mode.clone(),
            volume_path: host_path.clone(),
            outcome,
        };

        let allowed = [&self.apm_socket_path, &self.dsd_socket_path];
        let host_path_buf = PathBuf::from(host_path);
        if !allowed.contains(&&host_path_buf) {
            return Some(response(Err(CsiError::InvalidArgument(format!(
                "path {host_path:?} is not allowed; permitted paths are {allowed:?}"
            )))));
        }

        match is_socket_path(&host_path_buf) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                return Some(response(Err(CsiError::FailedPrecondition(format!(
                    "socket not found at {host_path:?}"
                )))));
            }
        }

        Some(response(bind_mount(
            &*self.mounter,
            &host_path_buf,
            Path::new(&req.target_path),
            true,
        )))
    }

    // Unpublish is handled by the unmount fallback.
}
