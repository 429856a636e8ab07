//! Error taxonomy for resctrl operations
//!
//! Read-side faults are usually contained by the caller (a missing capability
//! file becomes a sentinel value), write-side faults always propagate.

use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

/// Error type for resctrl gateway and group operations
#[derive(Debug)]
pub enum ResctrlError {
    /// The mount root is missing or is not a directory
    MountUnavailable(PathBuf),
    /// A control file or group directory does not exist
    FileNotFound(PathBuf),
    /// The caller lacks permission (usually: not root)
    PermissionDenied(PathBuf),
    /// A numeric file held something that is not a base-10 integer
    ParseFailure { path: PathBuf, content: String },
    /// The kernel validated a control-file write and refused it
    WriteRejectedByKernel { path: PathBuf, source: io::Error },
    /// Group names must be relative paths without `..`
    InvalidGroupName(String),
    /// Any other I/O fault on the read side
    Io { path: PathBuf, source: io::Error },
}

impl ResctrlError {
    /// Classify an I/O error raised while reading or listing `path`.
    pub fn from_read(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ResctrlError::FileNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => ResctrlError::PermissionDenied(path.to_path_buf()),
            _ => ResctrlError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Classify an I/O error raised while opening or writing `path`.
    ///
    /// Anything that is not "missing" or "not allowed" is the kernel saying no.
    pub fn from_write(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ResctrlError::FileNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => ResctrlError::PermissionDenied(path.to_path_buf()),
            _ => ResctrlError::WriteRejectedByKernel {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Classify a raw errno from a directory syscall (mkdir).
    pub fn from_errno(path: &Path, errno: Errno) -> Self {
        match errno {
            Errno::ENOENT => ResctrlError::FileNotFound(path.to_path_buf()),
            Errno::EACCES | Errno::EPERM => ResctrlError::PermissionDenied(path.to_path_buf()),
            other => ResctrlError::WriteRejectedByKernel {
                path: path.to_path_buf(),
                source: io::Error::from_raw_os_error(other as i32),
            },
        }
    }

    /// True when the error means "the thing is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResctrlError::FileNotFound(_))
    }
}

impl std::fmt::Display for ResctrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResctrlError::MountUnavailable(path) => {
                write!(f, "resctrl is not mounted at {}", path.display())
            }
            ResctrlError::FileNotFound(path) => write!(f, "No such file: {}", path.display()),
            ResctrlError::PermissionDenied(path) => {
                write!(f, "Permission denied: {}", path.display())
            }
            ResctrlError::ParseFailure { path, content } => {
                write!(f, "Cannot parse '{}' from {}", content, path.display())
            }
            ResctrlError::WriteRejectedByKernel { path, source } => {
                write!(f, "Kernel rejected write to {}: {}", path.display(), source)
            }
            ResctrlError::InvalidGroupName(name) => write!(f, "Invalid group name: '{}'", name),
            ResctrlError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ResctrlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResctrlError::WriteRejectedByKernel { source, .. } => Some(source),
            ResctrlError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
