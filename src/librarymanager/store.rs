//! Content-addressed on-disk store for extracted libraries.
//!
//! Each entry is a directory named by its library ID under the store root.
//! The store is not thread safe on its own; callers serialize access per
//! library through the [`Locker`](super::locker::Locker).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors returned by [`Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The supplied ID was empty.
    #[error("id cannot be empty")]
    InvalidId,

    /// The source path is missing or not a non-empty directory.
    #[error("the source path {} must exist and be a non-empty directory", .0.display())]
    InvalidSource(PathBuf),

    /// The requested item does not exist in the store.
    ///
    /// Distinguishable so callers can fall through to the download path.
    #[error("item not found in store")]
    NotFound,

    /// An underlying filesystem failure.
    #[error("store io error at {}: {source}", .path.display())]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// File based storage for extracted library trees, addressed by library ID.
pub struct Store {
    base_path: PathBuf,
}

impl Store {
    /// Create a new store, ensuring the base path exists.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|source| StoreError::Io {
            path: base_path.clone(),
            source,
        })?;
        Ok(Self { base_path })
    }

    /// Move a source directory into the store.
    ///
    /// This is intended to be used with a downloader and scratch space on the
    /// same filesystem; promotion into the store is a single rename.  If an
    /// entry already exists at the provided ID, it is not re-added and its
    /// path is returned.
    pub fn add(&self, id: &str, src: &Path) -> Result<PathBuf, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId);
        }

        let dst = self.path_for(id);
        if directory_exists_and_not_empty(&dst)? {
            return Ok(dst);
        }

        if !directory_exists_and_not_empty(src)? {
            return Err(StoreError::InvalidSource(src.to_path_buf()));
        }

        fs::rename(src, &dst).map_err(|source| StoreError::Io {
            path: dst.clone(),
            source,
        })?;
        Ok(dst)
    }

    /// Return the path of an item in the store if it exists.
    pub fn get(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId);
        }

        let path = self.path_for(id);
        if !directory_exists_and_not_empty(&path)? {
            return Err(StoreError::NotFound);
        }
        Ok(path)
    }

    /// Delete an item from the store.  A missing item is not an error.
    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId);
        }

        let path = self.path_for(id);
        if !directory_exists_and_not_empty(&path)? {
            return Ok(());
        }

        fs::remove_dir_all(&path).map_err(|source| StoreError::Io { path, source })
    }

    /// Determine whether an item exists in the store.
    pub fn exists(&self, id: &str) -> Result<bool, StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidId);
        }
        directory_exists_and_not_empty(&self.path_for(id))
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.base_path.join(id)
    }
}

fn directory_exists_and_not_empty(path: &Path) -> Result<bool, StoreError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !meta.is_dir() {
        return Err(StoreError::InvalidSource(path.to_path_buf()));
    }

    let mut entries = fs::read_dir(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(entries.next().is_some())
}
