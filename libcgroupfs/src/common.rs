//! Shared low-level helpers for reading and writing controller files.
//!
//! Ported from `libcgroups::common`: the read/write wrappers and the
//! `WrappedIoError` shape are kept as-is since every controller read in
//! this crate goes through the same "short UTF-8 file, trim, parse"
//! pattern described in spec §4.1.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Controller file reads are short (<4 KiB), newline-terminated UTF-8
/// buffers per spec §4.1.
pub const MAX_CONTROLLER_FILE_BYTES: usize = 4096;

#[derive(thiserror::Error, Debug)]
#[error("failed to {action} {path}: {source}")]
pub struct WrappedIoError {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl WrappedIoError {
    pub fn into_parts(self) -> (PathBuf, std::io::Error) {
        (self.path, self.source)
    }
}

#[inline]
pub fn write_cgroup_file_str<P: AsRef<Path>>(path: P, data: &str) -> Result<(), WrappedIoError> {
    let path = path.as_ref();
    fs::OpenOptions::new()
        .create(false)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|source| WrappedIoError {
            action: "open",
            path: path.to_path_buf(),
            source,
        })?
        .write_all(data.as_bytes())
        .map_err(|source| WrappedIoError {
            action: "write",
            path: path.to_path_buf(),
            source,
        })
}

#[inline]
pub fn write_cgroup_file<P: AsRef<Path>, T: ToString>(
    path: P,
    data: T,
) -> Result<(), WrappedIoError> {
    write_cgroup_file_str(path, &data.to_string())
}

/// Reads a controller file and trims trailing whitespace. Returns the
/// `unlimited`/`inherit` sentinel handling is left to the caller (spec
/// §3: "missing controller yields the unlimited/inherit value").
#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| WrappedIoError {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.trim_end().to_string())
}

/// Like [`read_cgroup_file`] but returns `None` rather than an error when
/// the file does not exist, matching the "missing controller ⇒
/// unlimited/inherit" rule at call sites that want an `Option`.
pub fn read_cgroup_file_opt<P: AsRef<Path>>(path: P) -> Result<Option<String>, WrappedIoError> {
    let path = path.as_ref();
    match read_cgroup_file(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>, WrappedIoError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| WrappedIoError {
        action: "open",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file).lines().map_while(Result::ok).collect())
}
