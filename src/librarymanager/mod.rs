//! Library manager: fetching, storing, and tracking instrumentation
//! libraries for volumes.
//!
//! The manager will download, extract, store, and reference-count libraries
//! and how they map to volumes:
//!
//! | Module | Purpose |
//! |---|---|
//! | [`library`] | [`Library`] identity: package, registry, version. |
//! | [`locker`] | Per-library lock serializing fetch and cleanup. |
//! | [`store`] | Content-addressed directory store on disk. |
//! | [`db`] | Persistent bidirectional library ↔ volume map. |
//! | [`imagecache`] | TTL cache of image tag → content digest. |
//! | [`archive`] | Sandboxed tar extraction with symlink handling. |
//! | [`downloader`] | OCI image pull and digest query. |
//! | [`cleanup`] | Immediate or delayed eviction hook. |

pub mod archive;
pub mod cleanup;
pub mod db;
pub mod downloader;
pub mod imagecache;
pub mod library;
pub mod locker;
pub mod store;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::instrument;

pub use cleanup::{CleanupFn, CleanupStrategy};
pub use downloader::{Downloader, LibraryFetcher};
pub use library::Library;

use archive::ArchiveError;
use db::{Database, DbError};
use imagecache::ImageCache;
use locker::Locker;
use store::{Store, StoreError};

/// Subdirectory where active libraries are stored.
pub const STORE_DIRECTORY: &str = "store";
/// Subdirectory where the database file lives.
pub const DATABASE_DIRECTORY: &str = "db";
/// Subdirectory used as scratch download space for libraries.
pub const SCRATCH_DIRECTORY: &str = "scratch";
/// Max amount of time before a new image digest is fetched.
pub const DEFAULT_IMAGE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Errors surfaced by the library manager and its parts.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// An input argument failed validation.
    #[error("{0}")]
    InvalidInput(String),

    /// The image reference is malformed.
    #[error("invalid image reference {image:?}: {reason}")]
    InvalidImage {
        /// The offending reference.
        image: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The image could not be pulled from the registry.
    #[error("could not pull {image}: {reason}")]
    Download {
        /// The image being pulled.
        image: String,
        /// Registry-reported reason.
        reason: String,
    },

    /// The manifest digest could not be fetched.
    #[error("could not get digest for {image}: {reason}")]
    DigestFetch {
        /// The image being resolved.
        image: String,
        /// Registry-reported reason.
        reason: String,
    },

    /// The registry returned a digest without a recognized algorithm prefix.
    #[error("digest does not have expected prefix: {0}")]
    MalformedDigest(String),

    /// A directory in the manager layout could not be created.
    #[error("could not create directory {}: {source}", .path.display())]
    Setup {
        /// Directory that failed to be created.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A scratch directory could not be created.
    #[error("could not create scratch directory: {0}")]
    Scratch(io::Error),

    /// A background extraction task failed to run.
    #[error("background task failed: {0}")]
    Task(String),

    /// Archive extraction failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The mapping database reported an error.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// High level object managing libraries for volumes.
///
/// # Layout
///
/// ```text
/// <base>/
///   scratch/            transient per-download directories
///   store/<library-id>/ extracted libraries (content-addressed)
///   db/<db-file>        persistent mapping database
/// ```
pub struct LibraryManager {
    fetcher: Arc<dyn LibraryFetcher>,
    cache: ImageCache,
    store: Arc<Store>,
    db: Arc<Database>,
    locker: Locker,
    cleanup: CleanupStrategy,
    scratch_dir: PathBuf,
}

impl LibraryManager {
    /// Create a library manager with the default downloader and immediate
    /// cleanup.  The base path hosts scratch space, library storage, and the
    /// database file.
    pub fn new(base_path: &Path) -> Result<Self, LibraryError> {
        Self::with_parts(
            base_path,
            Arc::new(Downloader::new()),
            CleanupStrategy::immediate(),
        )
    }

    /// Create a library manager with an explicit fetcher and cleanup
    /// strategy.  Exposed primarily for composition and testing.
    pub fn with_parts(
        base_path: &Path,
        fetcher: Arc<dyn LibraryFetcher>,
        cleanup: CleanupStrategy,
    ) -> Result<Self, LibraryError> {
        let scratch_dir = base_path.join(SCRATCH_DIRECTORY);
        create_dir(&scratch_dir)?;

        let store = Store::new(base_path.join(STORE_DIRECTORY))?;

        let db_dir = base_path.join(DATABASE_DIRECTORY);
        create_dir(&db_dir)?;
        let db = Database::open(&db_dir)?;

        Ok(Self {
            cache: ImageCache::new(Arc::clone(&fetcher), DEFAULT_IMAGE_CACHE_TTL),
            fetcher,
            store: Arc::new(store),
            db: Arc::new(db),
            locker: Locker::new(),
            cleanup,
            scratch_dir,
        })
    }

    /// Stop the manager: flush pending cleanups.  The database closes when
    /// the manager is dropped.
    pub async fn stop(&self) {
        self.cleanup.stop().await;
    }

    /// Fetch the remote library if it doesn't exist, record its usage, and
    /// return the path on disk that can be mounted for the volume.
    #[instrument(skip(self, library), fields(image = %library.image()))]
    pub async fn get_library_for_volume(
        &self,
        volume_id: &str,
        library: &Library,
    ) -> Result<PathBuf, LibraryError> {
        if volume_id.is_empty() {
            return Err(LibraryError::InvalidInput(
                "volume ID cannot be empty".into(),
            ));
        }

        let library_id = self
            .cache
            .fetch_digest(&library.image(), library.pull())
            .await?;

        let _guard = self.locker.lock(&library_id).await;

        // Link the library as a first step so any cleanup process knows this
        // library is needed.
        self.db.link_volume(&library_id, volume_id)?;

        match self.store.get(&library_id) {
            Ok(path) => return Ok(path),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        // Scratch lives next to the store so promotion is a single rename;
        // the directory is removed on every exit path from this call.
        let scratch = tempfile::Builder::new()
            .prefix("datadog-csi-driver-")
            .tempdir_in(&self.scratch_dir)
            .map_err(LibraryError::Scratch)?;

        self.fetcher
            .download(&library.image(), scratch.path())
            .await?;

        Ok(self.store.add(&library_id, scratch.path())?)
    }

    /// Remove the link in the database for the volume and schedule library
    /// cleanup if it is no longer referenced.
    #[instrument(skip(self))]
    pub async fn remove_volume(&self, volume_id: &str) -> Result<(), LibraryError> {
        let library_id = self.db.get_library_for_volume(volume_id)?;
        if library_id.is_empty() {
            // Not a volume we track.
            return Ok(());
        }

        // No lock needed here: the database is internally atomic and the
        // cleanup callback re-checks the reference count under the lock.
        self.db.unlink_volume(&library_id, volume_id)?;

        self.cleanup
            .schedule_cleanup(&library_id, self.cleanup_fn())
            .await;
        Ok(())
    }

    /// Whether a volume is tracked by this manager.  Used during unpublish,
    /// because CSI's unpublish request carries no volume context.
    pub fn has_volume(&self, volume_id: &str) -> Result<bool, LibraryError> {
        Ok(!self.db.get_library_for_volume(volume_id)?.is_empty())
    }

    /// Build the self-checking cleanup callback handed to the strategy.
    fn cleanup_fn(&self) -> CleanupFn {
        let locker = self.locker.clone();
        let db = Arc::clone(&self.db);
        let store = Arc::clone(&self.store);
        Arc::new(move |library_id: String| -> BoxFuture<'static, Result<(), LibraryError>> {
            let locker = locker.clone();
            let db = Arc::clone(&db);
            let store = Arc::clone(&store);
            Box::pin(async move {
                // Serializes against get_library_for_volume for the same
                // library.
                let _guard = locker.lock(&library_id).await;
                if db.get_volume_count(&library_id)? > 0 {
                    // A rolling update has already re-linked the library.
                    return Ok(());
                }
                store.remove(&library_id)?;
                Ok(())
            })
        })
    }
}

fn create_dir(path: &Path) -> Result<(), LibraryError> {
    fs::create_dir_all(path).map_err(|source| LibraryError::Setup {
        path: path.to_path_buf(),
        source,
    })
}
