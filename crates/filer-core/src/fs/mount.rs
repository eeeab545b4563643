//! Mount-table queries.
//!
//! A directory is "mounted" if the live mount table lists it or if its
//! device differs from its parent's. The static list (usually fstab)
//! names places where something *can* be mounted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::fs::classify::StatInfo;

/// Live mount table on Linux.
pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Static mount configuration.
pub const FSTAB: &str = "/etc/fstab";

pub trait MountTable: Send + Sync {
    /// `true` if something is mounted at `path`.
    ///
    /// `info` is the directory's own stat; `parent` is the containing
    /// directory's stat when the caller already has one.
    fn is_mount_point(&self, path: &Path, info: &StatInfo, parent: Option<&StatInfo>) -> bool;

    /// `true` if `path` is a configured (possibly unmounted) mount point.
    fn is_static_mount(&self, path: &Path) -> bool;

    /// Re-reads whatever live state the table keeps. Returns `true` if it
    /// changed.
    fn refresh(&self) -> bool {
        false
    }
}

/// Mount table read from the running system.
pub struct SystemMountTable {
    mtab: PathBuf,
    live: RwLock<HashSet<PathBuf>>,
    static_mounts: HashSet<PathBuf>,
}

impl SystemMountTable {
    /// Reads [`PROC_MOUNTS`]; `static_mounts` is the fallback set.
    pub fn new(static_mounts: impl IntoIterator<Item = PathBuf>) -> Self {
        Self::with_mtab(PROC_MOUNTS, static_mounts)
    }

    /// Like [`SystemMountTable::new`] with a different live table file.
    pub fn with_mtab(
        mtab: impl Into<PathBuf>,
        static_mounts: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        let table = Self {
            mtab: mtab.into(),
            live: RwLock::new(HashSet::new()),
            static_mounts: static_mounts.into_iter().collect(),
        };
        table.update();
        table
    }

    /// Re-reads the live table. Returns `true` if it changed.
    pub fn update(&self) -> bool {
        let fresh = match std::fs::read_to_string(&self.mtab) {
            Ok(contents) => parse_mount_list(&contents),
            Err(e) => {
                tracing::debug!("no live mount table at {}: {e}", self.mtab.display());
                HashSet::new()
            }
        };
        let mut live = self.live.write();
        if *live == fresh {
            return false;
        }
        *live = fresh;
        true
    }

    pub fn live_mounts(&self) -> Vec<PathBuf> {
        let mut mounts: Vec<_> = self.live.read().iter().cloned().collect();
        mounts.sort();
        mounts
    }
}

impl MountTable for SystemMountTable {
    fn is_mount_point(&self, path: &Path, info: &StatInfo, parent: Option<&StatInfo>) -> bool {
        if self.live.read().contains(path) {
            return true;
        }
        let parent = match parent {
            Some(p) => *p,
            None => match StatInfo::stat(&path.join("..")) {
                Ok(p) => p,
                Err(_) => return false,
            },
        };
        // A different device, or a directory that is its own parent (`/`).
        parent.dev != info.dev || parent.same_inode(info)
    }

    fn is_static_mount(&self, path: &Path) -> bool {
        self.static_mounts.contains(path)
    }

    fn refresh(&self) -> bool {
        self.update()
    }
}

/// Parses `/proc/mounts`-style text into the set of mount directories.
pub fn parse_mount_list(contents: &str) -> HashSet<PathBuf> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter(|dir| dir.starts_with('/'))
        .map(|dir| PathBuf::from(unescape_octal(dir)))
        .collect()
}

/// Mount directories named in an fstab file, skipping swap and `none`.
pub fn fstab_mounts(path: &Path) -> Vec<PathBuf> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut mounts: Vec<_> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let dir = fields.nth(1)?;
            let fs_type = fields.next().unwrap_or("");
            (dir.starts_with('/') && fs_type != "swap").then(|| PathBuf::from(unescape_octal(dir)))
        })
        .collect();
    mounts.sort();
    mounts.dedup();
    mounts
}

/// Undoes the `\040`-style escaping used for spaces in mount tables.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
