//! Bind-mount primitives shared by all publishers.
//!
//! [`bind_mount`] and [`bind_unmount`] wrap the mount syscalls with the
//! idempotence rules the kubelet expects: re-mounting an already-mounted
//! target succeeds, and unmounting an absent target succeeds.  The
//! [`Mounter`] trait is the syscall seam so unprivileged tests can observe
//! mounts without performing them.

use std::fs::{self, DirBuilder, File};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt};
use std::path::Path;

use nix::errno::Errno;
use nix::mount::MsFlags;
use tracing::{error, info, warn};

use crate::error::CsiError;

/// Mount syscall seam.
pub trait Mounter: Send + Sync {
    /// Bind-mount `source` onto `target`.
    fn mount(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Unmount `target`.
    fn unmount(&self, target: &Path) -> io::Result<()>;
}

/// Production mounter calling into the kernel via [`nix::mount`].
pub struct SystemMounter;

impl Mounter for SystemMounter {
    fn mount(&self, source: &Path, target: &Path) -> io::Result<()> {
        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(io::Error::from)
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        nix::mount::umount(target).map_err(io::Error::from)
    }
}

/// Perform a bind mount from `source` to `target`, creating the target as a
/// regular file or directory first.  Succeeds if the target is already
/// mounted.
pub fn bind_mount(
    mounter: &dyn Mounter,
    source: &Path,
    target: &Path,
    is_file: bool,
) -> Result<(), CsiError> {
    if !source.exists() {
        return Err(CsiError::FailedPrecondition(format!(
            "source path {} does not exist",
            source.display()
        )));
    }

    create_target_path(target, is_file)?;

    // Always attempt the mount rather than prechecking "is this a mount
    // point": that probe is unreliable for bind mounts.  An already-mounted
    // target reports EBUSY, which we treat as success.
    match mounter.mount(source, target) {
        Ok(()) => {
            info!(source = %source.display(), target = %target.display(), "bind-mounted");
            Ok(())
        }
        Err(e) if mount_already_exists(&e) => {
            info!(target = %target.display(), "already mounted, skipping");
            Ok(())
        }
        Err(e) => {
            error!(
                error = %e,
                source = %source.display(),
                target = %target.display(),
                "failed to mount",
            );
            Err(CsiError::Internal(format!("failed to mount: {e}")))
        }
    }
}

/// Unmount `target` and remove the path.  A missing target is a success;
/// unmount and removal failures are logged only, since the kubelet retries
/// cleanup.
pub fn bind_unmount(mounter: &dyn Mounter, target: &Path) -> Result<(), CsiError> {
    if !target.exists() {
        info!(target = %target.display(), "target path does not exist, nothing to unmount");
        return Ok(());
    }

    if let Err(e) = mounter.unmount(target) {
        warn!(error = %e, target = %target.display(), "failed to unmount, continuing");
    }

    if let Err(e) = remove_all(target) {
        warn!(error = %e, target = %target.display(), "failed to remove target path");
    } else {
        info!(target = %target.display(), "unmounted");
    }
    Ok(())
}

fn mount_already_exists(e: &io::Error) -> bool {
    if e.raw_os_error() == Some(Errno::EBUSY as i32) {
        return true;
    }
    let msg = e.to_string();
    msg.contains("already mounted") || msg.contains("busy")
}

fn create_target_path(target: &Path, is_file: bool) -> Result<(), CsiError> {
    if target.exists() {
        return Ok(());
    }

    if is_file {
        File::create(target)
            .map_err(|e| CsiError::Internal(format!("cannot create file: {e}")))?;
    } else {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(target)
            .map_err(|e| CsiError::Internal(format!("cannot create directory: {e}")))?;
        // Set the mode explicitly; the umask may have masked it.
        fs::set_permissions(target, std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .map_err(|e| CsiError::Internal(format!("cannot set permissions: {e}")))?;
    }
    Ok(())
}

fn remove_all(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Whether the path exists and is a UNIX domain socket.
pub fn is_socket_path(path: &Path) -> io::Result<bool> {
    let meta = fs::metadata(path)?;
    Ok(meta.file_type().is_socket())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    /// Records mount calls instead of performing them; optionally fails.
    pub struct FakeMounter {
        pub mounts: StdMutex<Vec<(PathBuf, PathBuf)>>,
        pub unmounts: StdMutex<Vec<PathBuf>>,
        pub mount_error: StdMutex<Option<i32>>,
        pub unmount_error: StdMutex<Option<i32>>,
    }

    impl FakeMounter {
        pub fn new() -> Self {
            Self {
                mounts: StdMutex::new(Vec::new()),
                unmounts: StdMutex::new(Vec::new()),
                mount_error: StdMutex::new(None),
                unmount_error: StdMutex::new(None),
            }
        }

        pub fn mount_count(&self) -> usize {
            self.mounts.lock().unwrap().len()
        }

        pub fn last_mount(&self) -> Option<(PathBuf, PathBuf)> {
            self.mounts.lock().unwrap().last().cloned()
        }

        pub fn fail_mounts_with(&self, errno: i32) {
            *self.mount_error.lock().unwrap() = Some(errno);
        }
    }

    impl Mounter for FakeMounter {
        fn mount(&self, source: &Path, target: &Path) -> io::Result<()> {
            if let Some(errno) = *self.mount_error.lock().unwrap() {
                return Err(io::Error::from_raw_os_error(errno));
            }
            self.mounts
                .lock()
                .unwrap()
                .push((source.to_path_buf(), target.to_path_buf()));
            Ok(())
        }

        fn unmount(&self, target: &Path) -> io::Result<()> {
            if let Some(errno) = *self.unmount_error.lock().unwrap() {
                return Err(io::Error::from_raw_os_error(errno));
            }
            self.unmounts.lock().unwrap().push(target.to_path_buf());
            Ok(())
        }
    }
}
