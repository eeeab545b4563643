//! Error types for `filer-core`.
//!
//! Fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`. Metadata refreshes never
//! fail outright: a failed stat degrades the entry instead (see
//! [`crate::fs::resolver::DirEntryResolver::restat`]), and the variants below
//! are used to describe *why* an entry or probe came out the way it did.

use std::path::{Path, PathBuf};

/// Errno for a permission failure.
#[cfg(unix)]
pub const ERRNO_ACCESS: i32 = libc::EACCES;
#[cfg(not(unix))]
pub const ERRNO_ACCESS: i32 = 13;

/// Errno recorded when the OS gave us an error without a code.
#[cfg(unix)]
pub const ERRNO_IO: i32 = libc::EIO;
#[cfg(not(unix))]
pub const ERRNO_IO: i32 = 5;

/// Unified error type for all core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A directory was expected but the path points to something else.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// `lstat` failed; the raw errno is kept for display.
    #[error("cannot stat {path}: errno {errno}")]
    StatFailure { path: PathBuf, errno: i32 },

    /// A symbolic link whose target cannot be resolved.
    #[error("broken symbolic link: {0}")]
    BrokenSymlink(PathBuf),

    /// The directory cache has no record for this path.
    #[error("directory '{0}' is not accessible")]
    DirectoryInaccessible(PathBuf),

    /// An icon candidate is larger than the configured ceiling.
    #[error("{path} is {size} bytes, over the {limit} byte icon limit")]
    SizeLimitExceeded { path: PathBuf, size: u64, limit: u64 },

    /// A file inside a directory is not owned by the directory's owner.
    #[error("{path} is owned by uid {found}, expected uid {expected}")]
    OwnershipMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// An icon candidate is not a regular file.
    #[error("not a regular file: {0}")]
    NotRegularFile(PathBuf),

    /// A launcher candidate has no execute bit.
    #[error("not executable: {0}")]
    NotExecutable(PathBuf),

    /// The groups document could not be parsed.
    #[error("malformed group file: {0}")]
    MalformedBookmark(String),

    /// No group with this name has been saved.
    #[error("group {0} is not set")]
    UnknownGroup(String),

    /// The window id does not belong to an open session.
    #[error("no such window: {0}")]
    UnknownSession(u64),

    /// Failed to parse a TOML configuration file or an icon pattern.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Maps an I/O error on `path` to the most specific variant.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            _ => CoreError::Io(err),
        }
    }

    /// Describes a failed `lstat` by errno.
    ///
    /// Permission problems get their own variant so the UI can word them
    /// differently; everything else is a generic stat failure.
    pub fn from_errno(path: &Path, errno: i32) -> Self {
        if errno == ERRNO_ACCESS {
            CoreError::PermissionDenied(path.to_path_buf())
        } else {
            CoreError::StatFailure {
                path: path.to_path_buf(),
                errno,
            }
        }
    }
}

/// Convenience alias used throughout `filer-core`.
pub type CoreResult<T> = Result<T, CoreError>;
