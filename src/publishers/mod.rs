//! Volume publishers.
//!
//! A [`Publisher`] decides whether it handles a publish or unpublish
//! request and, if so, performs the bind mount.  Publishers are assembled
//! into a [`PublisherChain`] that dispatches each request to the first
//! publisher claiming it:
//!
//! 1. [`LibraryPublisher`] — `DatadogLibrary` (SSI instrumentation images)
//! 2. [`InjectorPreloadPublisher`] — `DatadogInjectorPreload`
//! 3. [`SocketPublisher`] — `APMSocket`, `DSDSocket`
//! 4. [`LocalPublisher`] — socket directory types
//! 5. [`SocketLegacyPublisher`] — deprecated `mode: socket` schema
//! 6. [`LocalLegacyPublisher`] — deprecated `mode: local` schema
//! 7. [`UnmountPublisher`] — fallback handling every unpublish

pub mod bindmount;
pub mod chain;
pub mod injector_preload;
pub mod library;
pub mod local;
pub mod local_legacy;
pub mod socket;
pub mod socket_legacy;
pub mod unmount;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CsiError;
use crate::librarymanager::LibraryManager;
use crate::types::{NodePublishVolumeRequest, NodeUnpublishVolumeRequest};

pub use bindmount::{Mounter, SystemMounter};
pub use chain::PublisherChain;
pub use injector_preload::InjectorPreloadPublisher;
pub use library::LibraryPublisher;
pub use local::LocalPublisher;
pub use local_legacy::LocalLegacyPublisher;
pub use socket::SocketPublisher;
pub use socket_legacy::SocketLegacyPublisher;
pub use unmount::UnmountPublisher;

/// Metadata about a handled request, used for metrics.
///
/// Returning `None` from a publisher means it does not support the request;
/// a response with an `Err` outcome means the publisher claimed the request
/// but failed.
#[derive(Debug)]
pub struct PublisherResponse {
    /// Volume type label for metrics.
    pub volume_type: String,
    /// Host path or image label for metrics.
    pub volume_path: String,
    /// What happened.
    pub outcome: Result<(), CsiError>,
}

impl PublisherResponse {
    /// A successfully handled request.
    pub fn success(volume_type: impl Into<String>, volume_path: impl Into<String>) -> Self {
        Self {
            volume_type: volume_type.into(),
            volume_path: volume_path.into(),
            outcome: Ok(()),
        }
    }

    /// A claimed request that failed.
    pub fn failure(
        volume_type: impl Into<String>,
        volume_path: impl Into<String>,
        error: CsiError,
    ) -> Self {
        Self {
            volume_type: volume_type.into(),
            volume_path: volume_path.into(),
            outcome: Err(error),
        }
    }
}

/// Logic for publishing and unpublishing one family of volumes.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Publish the volume, or return `None` when the request is not ours.
    async fn publish(&self, req: &NodePublishVolumeRequest) -> Option<PublisherResponse>;

    /// Unpublish the volume, or return `None` to defer to the next
    /// publisher.  Most publishers defer to the unmount fallback because
    /// unpublish requests carry no volume context.
    async fn unpublish(&self, _req: &NodeUnpublishVolumeRequest) -> Option<PublisherResponse> {
        None
    }
}

/// Build the publisher chain for the driver.
///
/// Order matters: the first publisher to return a response stops the chain.
/// When SSI is disabled the library and injector-preload publishers stay in
/// the chain as rejecting stubs so metrics still classify those requests.
pub fn publishers(
    mounter: Arc<dyn Mounter>,
    apm_socket_path: &Path,
    dsd_socket_path: &Path,
    storage_path: &Path,
    library_manager: Arc<LibraryManager>,
    ssi_disabled: bool,
) -> PublisherChain {
    PublisherChain::new(vec![
        // SSI publishers (library and injector preload)
        Box::new(LibraryPublisher::new(
            Arc::clone(&mounter),
            library_manager,
            ssi_disabled,
        )),
        Box::new(InjectorPreloadPublisher::new(
            Arc::clone(&mounter),
            storage_path,
            ssi_disabled,
        )),
        // New "type" schema publishers
        Box::new(SocketPublisher::new(
            Arc::clone(&mounter),
            apm_socket_path,
            dsd_socket_path,
        )),
        Box::new(LocalPublisher::new(
            Arc::clone(&mounter),
            apm_socket_path,
            dsd_socket_path,
        )),
        // Legacy "mode/path" schema publishers (deprecated)
        Box::new(SocketLegacyPublisher::new(
            Arc::clone(&mounter),
            apm_socket_path,
            dsd_socket_path,
        )),
        Box::new(LocalLegacyPublisher::new(
            Arc::clone(&mounter),
            apm_socket_path,
            dsd_socket_path,
        )),
        // Fallback unmount handler for all remaining unpublish requests
        Box::new(UnmountPublisher::new(mounter)),
    ])
}
