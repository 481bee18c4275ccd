//! Publisher for the deprecated `mode: local` schema.
//!
//! Deprecated and kept for existing pod specs; use
//! `type: APMSocketDirectory` or `type: DSDSocketDirectory` instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::bindmount::{bind_mount, Mounter};
use super::{Publisher, PublisherResponse};
use crate::error::CsiError;
use crate::types::{NodePublishVolumeRequest, KEY_MODE, KEY_PATH, KEY_TYPE};

const MODE_LOCAL: &str = "local";

/// Handles the deprecated `mode`/`path` schema for directory mounts.
pub struct LocalLegacyPublisher {
    mounter: Arc<dyn Mounter>,
    apm_socket_path: PathBuf,
    dsd_socket_path: PathBuf,
}

impl LocalLegacyPublisher {
    /// Build a legacy local publisher for the configured host socket paths.
    pub fn new(mounter: Arc<dyn Mounter>, apm_socket_path: &Path, dsd_socket_path: &Path) -> Self {
        Self {
            mounter,
            apm_socket_path: apm_socket_path.to_path_buf(),
            dsd_socket_path: dsd_socket_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl Publisher for LocalLegacyPublisher {
    fn name(&self) -> &'static str {
        "local-legacy"
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        let ctx = &req.volume_context;
        // The legacy schema only applies when no `type` is given.
        if ctx.contains_key(KEY_TYPE) {
            return None;
        }

        let mode = ctx.get(KEY_MODE)?;
        let host_path = ctx.get(KEY_PATH)?;
        if mode != MODE_LOCAL {
            return None;
        }

        warn!(
            "using deprecated mode/path schema, migrate to 'type: APMSocketDirectory' or 'type: DSDSocketDirectory'"
        );

        let response = |outcome| PublisherResponse {
            volume_type: mode.clone(),
            volume_path: host_path.clone(),
            outcome,
        };

        // Only the parent directories of the agent sockets may be mounted.
        let allowed = [
            socket_dir(&self.apm_socket_path),
            socket_dir(&self.dsd_socket_path),
        ];
        let host_path_buf = PathBuf::from(host_path);
        if !allowed.contains(&host_path_buf) {
            return Some(response(Err(CsiError::InvalidArgument(format!(
                "path {host_path:?} is not allowed; permitted paths are {allowed:?}"
            )))));
        }

        Some(response(bind_mount(
            &*self.mounter,
            &host_path_buf,
            Path::new(&req.target_path),
            false,
        )))
    }

    // Unpublish is handled by the unmount fallback.
}

fn socket_dir(socket_path: &Path) -> PathBuf {
    socket_path
        .parent()
        .unwrap_or(Path::new("/"))
        .to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publishers::bindmount::testing::FakeMounter;
    use std::collections::HashMap;

    fn request(context: &[(&str, &str)], target: &Path) -> NodePublishVolumeRequest {
        NodePublishVolumeRequest {
            volume_id: "vol-1".into(),
            target_path: target.display().to_string(),
            volume_context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            read_only: false,
        }
    }

    #[tokio::test]
    async fn disallowed_path_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = LocalLegacyPublisher::new(
            Arc::new(FakeMounter::new()),
            &tmp.path().join("run/apm.socket"),
            &tmp.path().join("run/dsd.socket"),
        );

        let resp = publisher
            .publish(&request(&[("mode", "local"), ("path", "/etc/passwd")], &tmp.path().join("target")))
            .await
            .unwrap();

        assert_eq!(resp.volume_type, "local");
        assert!(
            matches!(resp.outcome, Err(CsiError::InvalidArgument(ref msg)) if msg.contains("not allowed"))
        );
    }

    #[tokio::test]
    async fn socket_parent_directory_is_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run/datadog");
        std::fs::create_dir_all(&dir).unwrap();

        let mounter = Arc::new(FakeMounter::new());
        let publisher = LocalLegacyPublisher::new(
            mounter.clone(),
            &dir.join("apm.socket"),
            &dir.join("dsd.socket"),
        );

        let dir_str = dir.display().to_string();
        let resp = publisher
            .publish(&request(&[("mode", "local"), ("path", &dir_str)], &tmp.path().join("target")))
            .await
            .unwrap();
        resp.outcome.unwrap();
        assert_eq!(mounter.last_mount().unwrap().0, dir);
    }

    #[tokio::test]
    async fn other_modes_and_typed_requests_are_not_claimed() {
        let tmp = tempfile::tempdir().unwrap();
        let publisher = LocalLegacyPublisher::new(
            Arc::new(FakeMounter::new()),
            &tmp.path().join("apm.socket"),
            &tmp.path().join("dsd.socket"),
        );

        assert!(publisher
            .publish(&request(&[("mode", "socket"), ("path", "/run/x")], &tmp.path().join("target")))
            .await
            .is_none());
        assert!(publisher
            .publish(&request(&[
                ("type", "APMSocketDirectory"),
                ("mode", "local"),
                ("path", "/run/x"),
            ], &tmp.path().join("target")))
            .await
            .is_none());
    }
}
