//! The error taxonomy from which every module-level error converts.
//!
//! Mirrors the shape of `libcgroups::common::WrappedIoError` and the
//! per-controller `thiserror` enums (`BpfError`, `ProgramError`,
//! `DevicesControllerError`): small leaf enums convert into this one with
//! `#[from]` at the point where a caller needs to decide how to degrade.

use std::path::PathBuf;

use crate::common::WrappedIoError;

/// The seven kinds from spec §7. The daemon never exits on a `CoreError`;
/// only `Fatal` surfaces as EIO while keeping the process alive.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// Kernel lacks a feature (e.g. no device-cgroup BPF support). Surface
    /// once, then degrade.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A cgroup path vanished between resolution and use. Treated as if
    /// the reader's cgroup were root.
    #[error("cgroup path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// EACCES/EPERM from the kernel, propagated verbatim.
    #[error("permission denied: {0}")]
    Permission(#[source] std::io::Error),

    /// A malformed controller file. Logged and treated as unlimited.
    #[error("invalid controller file {}: {1}", .0.display())]
    Invalid(PathBuf, String),

    /// BPF attach conflict (existing attachment with incompatible flags).
    #[error("busy: {0}")]
    Busy(String),

    /// EINTR/EAGAIN, retried a bounded number of times before giving up.
    #[error("transient error after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Broken invariant or allocation failure. The operation is aborted
    /// with EIO; the daemon keeps running.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    /// The errno a FUSE reply should carry for this error kind.
    pub fn to_errno(&self) -> i32 {
        match self {
            CoreError::NotSupported(_) => libc::ENOSYS,
            CoreError::NotFound(_) => libc::ENOENT,
            CoreError::Permission(_) => libc::EACCES,
            CoreError::Invalid(_, _) => libc::EIO,
            CoreError::Busy(_) => libc::EBUSY,
            CoreError::Transient { .. } => libc::EAGAIN,
            CoreError::Fatal(_) => libc::EIO,
        }
    }
}

impl From<WrappedIoError> for CoreError {
    fn from(err: WrappedIoError) -> Self {
        let (path, io_err) = err.into_parts();
        match io_err.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => CoreError::Permission(io_err),
            std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock => {
                CoreError::Transient {
                    attempts: 1,
                    source: io_err,
                }
            }
            _ => CoreError::Invalid(path, io_err.to_string()),
        }
    }
}
