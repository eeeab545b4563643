//! Symlink-aware stat and coarse file-type classification.

use std::path::Path;

use crate::error::{CoreError, ERRNO_IO};

const S_IFMT: u32 = 0o170_000;
const S_IFSOCK: u32 = 0o140_000;
const S_IFLNK: u32 = 0o120_000;
const S_IFREG: u32 = 0o100_000;
const S_IFBLK: u32 = 0o060_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFCHR: u32 = 0o020_000;
const S_IFIFO: u32 = 0o010_000;

/// Any of the user/group/other execute bits.
pub const EXEC_BITS: u32 = 0o111;

/// The "other" write bit.
pub const WORLD_WRITABLE: u32 = 0o002;

/// The raw fields of one `stat`/`lstat` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub mode: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub ctime: i64,
    pub atime: i64,
    pub dev: u64,
    pub ino: u64,
}

impl StatInfo {
    /// Builds a `StatInfo` from std metadata.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            mode: metadata.mode(),
            size: metadata.size(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            mtime: metadata.mtime(),
            ctime: metadata.ctime(),
            atime: metadata.atime(),
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    /// Builds a `StatInfo` from std metadata.
    ///
    /// Without unix metadata the mode is synthesised from the file type and
    /// ownership/device fields stay zero.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        };
        let kind = if metadata.is_symlink() {
            S_IFLNK
        } else if metadata.is_dir() {
            S_IFDIR
        } else {
            S_IFREG
        };
        let perms = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
        Self {
            mode: kind | perms,
            size: metadata.len(),
            mtime: secs(metadata.modified()),
            ctime: secs(metadata.modified()),
            atime: secs(metadata.accessed()),
            ..Self::default()
        }
    }

    /// `lstat(2)`: does not follow a final symlink.
    pub fn lstat(path: &Path) -> std::io::Result<Self> {
        std::fs::symlink_metadata(path).map(|m| Self::from_metadata(&m))
    }

    /// `stat(2)`: follows symlinks.
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        std::fs::metadata(path).map(|m| Self::from_metadata(&m))
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// `true` if any of the user, group or other execute bits is set.
    pub fn is_executable(&self) -> bool {
        self.mode & EXEC_BITS != 0
    }

    pub fn is_world_writable(&self) -> bool {
        self.mode & WORLD_WRITABLE != 0
    }

    /// Same device and inode.
    pub fn same_inode(&self, other: &StatInfo) -> bool {
        self.dev == other.dev && self.ino == other.ino
    }
}

/// Coarse classification of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BaseType {
    /// Not yet stat'd.
    #[default]
    Unknown,
    /// The stat failed (or a symlink is dangling).
    Error,
    File,
    Directory,
    Pipe,
    Socket,
    CharDevice,
    BlockDevice,
    /// A mode we don't have a name for.
    Special,
}

impl BaseType {
    /// Maps the `S_IFMT` bits of a mode to a base type.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => BaseType::File,
            S_IFDIR => BaseType::Directory,
            S_IFIFO => BaseType::Pipe,
            S_IFSOCK => BaseType::Socket,
            S_IFCHR => BaseType::CharDevice,
            S_IFBLK => BaseType::BlockDevice,
            _ => BaseType::Special,
        }
    }

    /// A short human name, used by listings.
    pub fn label(self) -> &'static str {
        match self {
            BaseType::Unknown => "unknown",
            BaseType::Error => "error",
            BaseType::File => "file",
            BaseType::Directory => "directory",
            BaseType::Pipe => "pipe",
            BaseType::Socket => "socket",
            BaseType::CharDevice => "char device",
            BaseType::BlockDevice => "block device",
            BaseType::Special => "special",
        }
    }
}

/// The outcome of a symlink-aware stat.
///
/// Failures are encoded in the value rather than returned as errors so that
/// a batch of entries can always be processed to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub base_type: BaseType,
    /// The `lstat` result, `None` if it failed.
    pub link_info: Option<StatInfo>,
    /// The effective (link-followed) stat. Equal to `link_info` for
    /// anything that is not a symlink, `None` for a dangling link.
    pub info: Option<StatInfo>,
    pub symlink: bool,
    /// Errno of the failed `lstat`, `0` on success.
    pub errno: i32,
}

impl Classification {
    /// `true` if the `lstat` itself succeeded.
    pub fn is_ok(&self) -> bool {
        self.link_info.is_some()
    }

    /// Describes why this classification is `Error`, if it is.
    pub fn error(&self, path: &Path) -> Option<CoreError> {
        if self.base_type != BaseType::Error {
            return None;
        }
        if self.symlink {
            Some(CoreError::BrokenSymlink(path.to_path_buf()))
        } else {
            Some(CoreError::from_errno(path, self.errno))
        }
    }
}

/// Stats `path`, following a final symlink for the effective type.
pub fn classify(path: &Path) -> Classification {
    let link_info = match StatInfo::lstat(path) {
        Ok(info) => info,
        Err(e) => {
            return Classification {
                base_type: BaseType::Error,
                link_info: None,
                info: None,
                symlink: false,
                errno: e.raw_os_error().unwrap_or(ERRNO_IO),
            };
        }
    };

    if !link_info.is_symlink() {
        return Classification {
            base_type: BaseType::from_mode(link_info.mode),
            link_info: Some(link_info),
            info: Some(link_info),
            symlink: false,
            errno: 0,
        };
    }

    let info = StatInfo::stat(path).ok();
    Classification {
        base_type: info
            .map(|i| BaseType::from_mode(i.mode))
            .unwrap_or(BaseType::Error),
        link_info: Some(link_info),
        info,
        symlink: true,
        errno: 0,
    }
}
