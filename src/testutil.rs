//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::librarymanager::{LibraryError, LibraryFetcher};

/// Digest hex reported by [`FixtureFetcher`] for every image.
pub const FIXTURE_DIGEST_HEX: &str =
    "56275150d5d94778425fc2fd850ff88c28e1d478e3812fa1255aed86ab9c143e";

/// A [`LibraryFetcher`] that materializes a small fixture tree instead of
/// talking to a registry.
pub struct FixtureFetcher {
    downloads: AtomicUsize,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self {
            downloads: AtomicUsize::new(0),
        }
    }

    /// Number of downloads performed.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl Default for FixtureFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LibraryFetcher for FixtureFetcher {
    async fn download(&self, _image: &str, dest: &Path) -> Result<(), LibraryError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let package = dest.join("datadog-init/package");
        std::fs::create_dir_all(&package).map_err(|e| LibraryError::Task(e.to_string()))?;
        std::fs::write(package.join("library.txt"), b"payload")
            .map_err(|e| LibraryError::Task(e.to_string()))?;
        Ok(())
    }

    async fn fetch_digest(&self, _image: &str) -> Result<String, LibraryError> {
        Ok(format!("sha256:{FIXTURE_DIGEST_HEX}"))
    }
}
