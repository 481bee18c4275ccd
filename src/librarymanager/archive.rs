//! Safe extraction of tar streams.
//!
//! [`ArchiveExtractor`] copies a configured source subtree out of a tar
//! stream into a destination directory.  Every entry name is normalized
//! against an absolute root first, so `..` segments collapse inside the
//! archive namespace and can never escape the destination.
//!
//! Symbolic links are preserved verbatim: once bind-mounted into a Pod, the
//! links resolve inside the container's mount namespace, not the host's.
//! Refusing them would break packages that ship deduplicated trees.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, Entry, EntryType};
use thiserror::Error;

/// Errors returned while extracting an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The tar stream could not be read or an entry could not be written.
    #[error("archive io error: {0}")]
    Io(#[from] io::Error),

    /// A symlink entry carried no target.
    #[error("symlink {} has no target", .0.display())]
    SymlinkWithoutTarget(PathBuf),
}

/// Extracts a source subtree of a tar stream into a destination directory.
pub struct ArchiveExtractor {
    src: PathBuf,
    dst: PathBuf,
}

impl ArchiveExtractor {
    /// Initialize a new extractor copying entries under `src` (a path inside
    /// the archive, `/` for everything) into the `dst` directory.
    pub fn new(src: &str, dst: &Path) -> Self {
        Self {
            src: normalize_rooted(Path::new(src)),
            dst: dst.to_path_buf(),
        }
    }

    /// Copy matching entries from the tar stream into the destination.
    pub fn extract<R: Read>(&self, reader: R) -> Result<(), ArchiveError> {
        let mut archive = Archive::new(reader);
        for entry in archive.entries()? {
            self.process_entry(&mut entry?)?;
        }
        Ok(())
    }

    fn process_entry<R: Read>(&self, entry: &mut Entry<'_, R>) -> Result<(), ArchiveError> {
        // Normalize the entry name against the archive root and skip
        // anything outside the configured source prefix.
        let archive_path = normalize_rooted(&entry.path()?);
        let Ok(relative) = archive_path.strip_prefix(&self.src) else {
            return Ok(());
        };
        if relative.as_os_str().is_empty() {
            return Ok(());
        }

        // `relative` has no `..` segments left, so joining it cannot leave
        // the destination.
        let dest_path = self.dst.join(relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                DirBuilder::new()
                    .recursive(true)
                    .mode(0o755)
                    .create(&dest_path)?;
            }
            EntryType::Symlink => {
                let target = match entry.link_name()? {
                    Some(target) if !target.as_os_str().is_empty() => target.into_owned(),
                    _ => return Err(ArchiveError::SymlinkWithoutTarget(dest_path)),
                };

                // Re-extraction over an identical link is a success.
                if let Ok(existing) = fs::read_link(&dest_path) {
                    if existing == target {
                        return Ok(());
                    }
                }

                ensure_parent(&dest_path)?;
                let _ = fs::remove_file(&dest_path);
                symlink(&target, &dest_path)?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                ensure_parent(&dest_path)?;
                let mut out = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .mode(0o755)
                    .open(&dest_path)?;
                io::copy(entry, &mut out)?;
            }
            // Special files and unknown types are silently skipped.
            _ => {}
        }

        Ok(())
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        DirBuilder::new().recursive(true).mode(0o755).create(parent)?;
    }
    Ok(())
}

/// Lexically normalize a path against `/`: `.` segments are dropped and
/// `..` segments pop, never rising above the root.
fn normalize_rooted(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::from("/");
    for component in Path::new("/").join(path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tar::{Builder, Header};

    enum TarEntry<'a> {
        Dir(&'a str),
        File(&'a str, &'a [u8]),
        Symlink(&'a str, &'a str),
        SymlinkWithoutTarget(&'a str),
    }

    // `Header::set_path`/`set_link_name` reject `..` segments, but the tests
    // below need to construct archives containing them to exercise the
    // extractor's own defenses. Write the name/link fields directly so the
    // raw bytes reach the archive unvalidated.
    fn set_raw_name(header: &mut Header, name: &str) {
        let old = header.as_old_mut();
        old.name = [0u8; 100];
        old.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    fn set_raw_link_name(header: &mut Header, name: &str) {
        let old = header.as_old_mut();
        old.linkname = [0u8; 100];
        old.linkname[..name.len()].copy_from_slice(name.as_bytes());
    }

    fn build_tar(entries: &[TarEntry<'_>]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for entry in entries {
            match entry {
                TarEntry::Dir(path) => {
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    set_raw_name(&mut header, path);
                    header.set_cksum();
                    builder.append(&header, &[][..]).unwrap();
                }
                TarEntry::File(path, data) => {
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(0o644);
                    header.set_size(data.len() as u64);
                    set_raw_name(&mut header, path);
                    header.set_cksum();
                    builder.append(&header, *data).unwrap();
                }
                TarEntry::Symlink(path, target) => {
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    set_raw_name(&mut header, path);
                    set_raw_link_name(&mut header, target);
                    header.set_cksum();
                    builder.append(&header, io::empty()).unwrap();
                }
                TarEntry::SymlinkWithoutTarget(path) => {
                    let mut header = Header::new_gnu();
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    set_raw_name(&mut header, path);
                    header.set_cksum();
                    builder.append(&header, &[][..]).unwrap();
                }
            }
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn extracts_files_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = build_tar(&[
            TarEntry::Dir("datadog-init"),
            TarEntry::Dir("datadog-init/package"),
            TarEntry::File("datadog-init/package/library.txt", b"payload"),
        ]);

        let extractor = ArchiveExtractor::new("/", tmp.path());
        extractor.extract(&tar[..]).unwrap();

        let content = fs::read(tmp.path().join("datadog-init/package/library.txt")).unwrap();
        assert_eq!(content, b"payload");
    }

    #[test]
    fn entries_outside_the_source_prefix_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = build_tar(&[
            TarEntry::File("datadog-init/package/library.txt", b"payload"),
            TarEntry::File("etc/passwd", b"nope"),
        ]);

        let extractor = ArchiveExtractor::new("/datadog-init", tmp.path());
        extractor.extract(&tar[..]).unwrap();

        assert!(tmp.path().join("package/library.txt").exists());
        assert!(!tmp.path().join("etc").exists());
        assert!(!tmp.path().join("etc/passwd").exists());
    }

    #[test]
    fn parent_segments_cannot_escape_the_destination() {
        let outer = tempfile::tempdir().unwrap();
        let dest = outer.path().join("dest");
        fs::create_dir_all(&dest).unwrap();

        let tar = build_tar(&[TarEntry::File("../escape", b"gotcha")]);
        let extractor = ArchiveExtractor::new("/", &dest);
        extractor.extract(&tar[..]).unwrap();

        // The `..` collapses at the archive root: the file lands inside the
        // destination and nothing is written next to it.
        assert!(dest.join("escape").exists());
        assert!(!outer.path().join("escape").exists());
    }

    #[test]
    fn symlink_targets_are_preserved_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = build_tar(&[
            TarEntry::File("lib/real.so", b"elf"),
            TarEntry::Symlink("lib/alias.so", "real.so"),
            TarEntry::Symlink("absolute", "/opt/datadog/lib.so"),
        ]);

        let extractor = ArchiveExtractor::new("/", tmp.path());
        extractor.extract(&tar[..]).unwrap();

        assert_eq!(
            fs::read_link(tmp.path().join("lib/alias.so")).unwrap(),
            PathBuf::from("real.so")
        );
        assert_eq!(
            fs::read_link(tmp.path().join("absolute")).unwrap(),
            PathBuf::from("/opt/datadog/lib.so")
        );
    }

    #[test]
    fn symlink_named_with_parent_segments_stays_inside() {
        let outer = tempfile::tempdir().unwrap();
        let dest = outer.path().join("dest");
        fs::create_dir_all(&dest).unwrap();

        let tar = build_tar(&[TarEntry::Symlink("../escape", "target.txt")]);
        let extractor = ArchiveExtractor::new("/", &dest);
        extractor.extract(&tar[..]).unwrap();

        assert_eq!(
            fs::read_link(dest.join("escape")).unwrap(),
            PathBuf::from("target.txt")
        );
        assert!(!outer.path().join("escape").exists());
    }

    #[test]
    fn symlink_without_target_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = build_tar(&[TarEntry::SymlinkWithoutTarget("dangling")]);

        let extractor = ArchiveExtractor::new("/", tmp.path());
        let err = extractor.extract(&tar[..]).unwrap_err();
        assert!(matches!(err, ArchiveError::SymlinkWithoutTarget(_)));
    }

    #[test]
    fn re_extraction_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let tar = build_tar(&[
            TarEntry::File("lib/real.so", b"elf"),
            TarEntry::Symlink("lib/alias.so", "real.so"),
        ]);

        let extractor = ArchiveExtractor::new("/", tmp.path());
        extractor.extract(&tar[..]).unwrap();
        extractor.extract(&tar[..]).unwrap();

        assert_eq!(
            fs::read_link(tmp.path().join("lib/alias.so")).unwrap(),
            PathBuf::from("real.so")
        );
    }

    #[test]
    fn normalization_handles_dot_segments() {
        assert_eq!(
            normalize_rooted(Path::new("./a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_rooted(Path::new("../../x")), PathBuf::from("/x"));
        assert_eq!(normalize_rooted(Path::new(".")), PathBuf::from("/"));
    }
}
