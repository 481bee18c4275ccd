//! Publisher for `DatadogInjectorPreload` volumes.
//!
//! Bind-mounts a node-local `ld.so.preload` file with fixed content into
//! the workload, so every dynamically-linked process preloads the Datadog
//! injector launcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::bindmount::{bind_mount, Mounter};
use super::{Publisher, PublisherResponse};
use crate::error::CsiError;
use crate::types::{NodePublishVolumeRequest, VolumeType};

/// Content written to the node-local preload file.
const PRELOAD_CONTENT: &str =
    "/opt/datadog-packages/datadog-apm-inject/stable/inject/launcher.preload.so\n";

/// File name under the storage base path.
const PRELOAD_FILE_NAME: &str = "ld.so.preload";

/// Handles `DatadogInjectorPreload` volumes.
pub struct InjectorPreloadPublisher {
    mounter: Arc<dyn Mounter>,
    preload_file_path: PathBuf,
    disabled: bool,
    // Serializes concurrent first publishes; a naive exists-then-create
    // check would race.
    init: OnceCell<()>,
}

impl InjectorPreloadPublisher {
    /// Build an injector preload publisher storing its file under
    /// `storage_path`.
    pub fn new(mounter: Arc<dyn Mounter>, storage_path: &Path, disabled: bool) -> Self {
        Self {
            mounter,
            preload_file_path: storage_path.join(PRELOAD_FILE_NAME),
            disabled,
            init: OnceCell::new(),
        }
    }

    async fn ensure_preload_file(&self) -> Result<(), CsiError> {
        self.init
            .get_or_try_init(|| async {
                if !self.preload_file_path.exists() {
                    tokio::fs::write(&self.preload_file_path, PRELOAD_CONTENT)
                        .await
                        .map_err(|e| {
                            CsiError::Internal(format!("failed to write preload file: {e}"))
                        })?;
                }
                Ok(())
            })
            .await
            .copied()
    }
}

#[async_trait]
impl Publisher for InjectorPreloadPublisher {
    fn name(&self) -> &'static str {
        "injector-preload"
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        if VolumeType::from_context(&req.volume_context) != Some(VolumeType::DatadogInjectorPreload)
        {
            return None;
        }
        let volume_type = VolumeType::DatadogInjectorPreload.as_str();

        if self.disabled {
            return Some(PublisherResponse::failure(
                volume_type,
                "",
                CsiError::FailedPrecondition("SSI is disabled".into()),
            ));
        }
        if !req.read_only {
            return Some(PublisherResponse::failure(
                volume_type,
                "",
                CsiError::InvalidArgument(
                    "DatadogInjectorPreload volumes must be mounted read-only".into(),
                ),
            ));
        }

        if let Err(e) = self.ensure_preload_file().await {
            return Some(PublisherResponse::failure(volume_type, "", e));
        }

        let outcome = bind_mount(
            &*self.mounter,
            &self.preload_file_path,
            Path::new(&req.target_path),
            true,
        );
        Some(PublisherResponse {
            volume_type: volume_type.to_owned(),
            volume_path: req.target_path.clone(),
            outcome,
        })
    }

    // Unpublish is handled by the unmount fallback.
}
