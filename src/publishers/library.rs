//! Publisher for `DatadogLibrary` volumes.
//!
//! Downloads OCI images containing instrumentation libraries through the
//! [`LibraryManager`] and bind-mounts the requested subtree read-only into
//! the workload.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::bindmount::{bind_mount, bind_unmount, Mounter};
use super::{Publisher, PublisherResponse};
use crate::error::CsiError;
use crate::librarymanager::{Library, LibraryError, LibraryManager};
use crate::types::{
    NodePublishVolumeRequest, NodeUnpublishVolumeRequest, VolumeType, KEY_LIBRARY_PACKAGE,
    KEY_LIBRARY_PULL, KEY_LIBRARY_REGISTRY, KEY_LIBRARY_SOURCE, KEY_LIBRARY_VERSION,
};

/// Default source path inside the OCI image.
const DEFAULT_LIBRARY_SOURCE: &str = "datadog-init/package";

/// Handles `DatadogLibrary` volumes.
pub struct LibraryPublisher {
    mounter: Arc<dyn Mounter>,
    library_manager: Arc<LibraryManager>,
    disabled: bool,
}

impl LibraryPublisher {
    /// Build a library publisher.  When `disabled`, publish requests are
    /// claimed but rejected so metrics still classify them.
    pub fn new(
        mounter: Arc<dyn Mounter>,
        library_manager: Arc<LibraryManager>,
        disabled: bool,
    ) -> Self {
        Self {
            mounter,
            library_manager,
            disabled,
        }
    }

    fn library_from_context(
        &self,
        req: &NodePublishVolumeRequest,
    ) -> Result<Library, CsiError> {
        let ctx = &req.volume_context;
        let required = |key: &'static str| {
            ctx.get(key).filter(|v| !v.is_empty()).ok_or_else(|| {
                CsiError::InvalidArgument(format!("missing required volume context key {key:?}"))
            })
        };

        let package = required(KEY_LIBRARY_PACKAGE)?;
        let registry = required(KEY_LIBRARY_REGISTRY)?;
        let version = required(KEY_LIBRARY_VERSION)?;
        let pull = ctx
            .get(KEY_LIBRARY_PULL)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Library::new(package, registry, version, pull).map_err(CsiError::invalid_argument)
    }
}

#[async_trait]
impl Publisher for LibraryPublisher {
    fn name(&self) -> &'static str {
        "library"
    }

    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse> {
        if VolumeType::from_context(&req.volume_context) != Some(VolumeType::DatadogLibrary) {
            return None;
        }
        let volume_type = VolumeType::DatadogLibrary.as_str();

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
                    "DatadogLibrary volumes must be mounted read-only".into(),
                ),
            ));
        }

        let library = match self.library_from_context(req) {
            Ok(library) => library,
            Err(e) => return Some(PublisherResponse::failure(volume_type, "", e)),
        };
        let image = library.image();

        let base = match self
            .library_manager
            .get_library_for_volume(req.volume_id.as_str(), &library)
            .await
        {
            Ok(base) => base,
            Err(e) => {
                return Some(PublisherResponse::failure(
                    volume_type,
                    image,
                    library_error_to_csi(e),
                ))
            }
        };

        // Mount only the requested subdirectory of the extracted image.
        let source = req
            .volume_context
            .get(KEY_LIBRARY_SOURCE)
            .map(String::as_str)
            .unwrap_or(DEFAULT_LIBRARY_SOURCE);
        let host_path = base.join(source.trim_start_matches('/'));

        let outcome = bind_mount(
            &*self.mounter,
            &host_path,
            Path::new(&req.target_path),
            false,
        );
        Some(PublisherResponse {
            volume_type: volume_type.to_owned(),
            volume_path: image,
            outcome,
        })
    }

    /// For inline CSI volumes Kubernetes never calls unstage, so volume
    /// tracking is released here.  The request has no volume context; the
    /// library database tells us whether the volume is ours.
    async fn unpublish(&self, req: &NodeUnpublishVolumeRequest) -> Option<PublisherResponse> {
        match self.library_manager.has_volume(req.volume_id.as_str()) {
            Ok(true) => {}
            // Unknown volume, or the database is unreadable: let the other
            // publishers try.
            Ok(false) | Err(_) => return None,
        }
        let volume_type = VolumeType::DatadogLibrary.as_str();

        if let Err(e) = bind_unmount(&*self.mounter, Path::new(&req.target_path)) {
            return Some(PublisherResponse::failure(volume_type, "", e));
        }

        // Removing the tracking also deletes the library from disk once no
        // volume references it.
        if let Err(e) = self
            .library_manager
            .remove_volume(req.volume_id.as_str())
            .await
        {
            return Some(PublisherResponse::failure(
                volume_type,
                "",
                library_error_to_csi(e),
            ));
        }

        Some(PublisherResponse::success(volume_type, ""))
    }
}

fn library_error_to_csi(e: LibraryError) -> CsiError {
    match e {
        LibraryError::InvalidInput(_) | LibraryError::InvalidImage { .. } => {
            CsiError::InvalidArgument(e.to_string())
        }
        other => CsiError::Internal(other.to_string()),
    }
}
