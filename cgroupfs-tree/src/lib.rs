//! The cgroup-fuse tree (C5, spec §4.5): presents a caller's own cgroup
//! subtree, read/write, at `/sys/fs/cgroup/<controller>/...`.
//!
//! Transport-agnostic: this crate never touches `fuser` types directly
//! (`cgroupfsd::fs` adapts [`Attr`] to `fuser::FileAttr` at the C7
//! boundary), so it stays unit-testable against a plain temp directory,
//! the same way `libcgroups::test::setup` fixtures a backing directory
//! for controller-file tests.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use libcgroupfs::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub kind: FileKind,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub mtime: SystemTime,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// Checks that `target` is at or below `caller_cgroup` (spec §4.5
/// "Visibility rule"). Both paths must already be canonicalized by the
/// caller (the C7 dispatch layer resolves symlinks before calling in).
fn check_visible(caller_cgroup: &Path, target: &Path) -> Result<(), CoreError> {
    if target.starts_with(caller_cgroup) {
        Ok(())
    } else {
        Err(CoreError::Permission(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        )))
    }
}

fn stat_to_attr(meta: &fs::Metadata) -> Attr {
    Attr {
        kind: if meta.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        },
        size: meta.len(),
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode(),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

/// `getattr`: stats the backing file, remapping uid/gid to the caller's
/// userns root when one is given (spec §4.5 "UID/GID remapped to the
/// caller's userns root if applicable").
pub fn getattr(
    caller_cgroup: &Path,
    target: &Path,
    userns_root: Option<(u32, u32)>,
) -> Result<Attr, CoreError> {
    check_visible(caller_cgroup, target)?;
    let meta = fs::metadata(target).map_err(|_| CoreError::NotFound(target.to_path_buf()))?;
    let mut attr = stat_to_attr(&meta);
    if let Some((uid, gid)) = userns_root {
        attr.uid = uid;
        attr.gid = gid;
    }
    Ok(attr)
}

/// `readdir`: enumerates the backing cgroup directory (spec §4.5).
pub fn readdir(caller_cgroup: &Path, target_dir: &Path) -> Result<Vec<DirEntry>, CoreError> {
    check_visible(caller_cgroup, target_dir)?;
    let rd = fs::read_dir(target_dir).map_err(|_| CoreError::NotFound(target_dir.to_path_buf()))?;

    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|e| CoreError::Invalid(target_dir.to_path_buf(), e.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|e| CoreError::Invalid(target_dir.to_path_buf(), e.to_string()))?;
        out.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind: if file_type.is_dir() {
                FileKind::Directory
            } else {
                FileKind::File
            },
        });
    }
    Ok(out)
}

/// `read`: proxies to the backing file, preserving the kernel's own
/// error codes (spec §4.5) — io errors are mapped through
/// `CoreError::from` at the transport boundary instead of swallowed
/// here.
pub fn read(caller_cgroup: &Path, target: &Path, offset: u64, size: u32) -> Result<Vec<u8>, CoreError> {
    check_visible(caller_cgroup, target)?;
    let content = fs::read(target).map_err(|_| CoreError::NotFound(target.to_path_buf()))?;
    let start = (offset as usize).min(content.len());
    let end = start.saturating_add(size as usize).min(content.len());
    Ok(content[start..end].to_vec())
}

/// Whether `target`'s on-disk mode would let `userns_root_uid` write to
/// it — the only case spec §4.5's `write` permits.
fn writable_by(meta: &fs::Metadata, userns_root_uid: u32) -> bool {
    if meta.uid() == userns_root_uid {
        meta.mode() & 0o200 != 0
    } else {
        meta.mode() & 0o002 != 0
    }
}

/// `write`: proxies to the backing file if the container's userns-root
/// would be allowed to write it (spec §4.5).
pub fn write(
    caller_cgroup: &Path,
    target: &Path,
    userns_root_uid: u32,
    data: &[u8],
) -> Result<usize, CoreError> {
    check_visible(caller_cgroup, target)?;
    let meta = fs::metadata(target).map_err(|_| CoreError::NotFound(target.to_path_buf()))?;
    if !writable_by(&meta, userns_root_uid) {
        return Err(CoreError::Permission(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        )));
    }

    use std::io::Write as _;
    let mut f = fs::OpenOptions::new()
        .write(true)
        .open(target)
        .map_err(|_| CoreError::NotFound(target.to_path_buf()))?;
    f.write_all(data)
        .map_err(|e| CoreError::Invalid(target.to_path_buf(), e.to_string()))?;
    Ok(data.len())
}

/// Joins a FUSE-presented relative path under `/sys/fs/cgroup/<controller>`
/// onto the resolved backing cgroup directory.
pub fn resolve_backing_path(cgroup_root: &Path, relative: &Path) -> PathBuf {
    match relative.strip_prefix("/") {
        Ok(stripped) => cgroup_root.join(stripped),
        Err(_) => cgroup_root.join(relative),
    }
}
