//! Cheap per-entry attribute probes: "recent" window, extended attributes,
//! labels, and mount-point status.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fs::classify::StatInfo;
use crate::fs::entry::ItemFlags;
use crate::fs::mount::MountTable;

/// Seconds for which a modified file counts as recent.
pub const RECENT_WINDOW_SECS: i64 = 5 * 60;

/// Extended attribute holding a user-assigned label.
pub const LABEL_XATTR: &str = "user.label";

/// The "now" reference for the Recent flag.
///
/// Refreshed once per batch rather than per entry, so that a whole listing
/// is judged against the same instant.
#[derive(Debug)]
pub struct RecentClock {
    reference: AtomicI64,
    window_secs: i64,
}

impl RecentClock {
    pub fn new(window_secs: i64) -> Self {
        Self {
            reference: AtomicI64::new(now_secs()),
            window_secs,
        }
    }

    /// Moves the reference to the current time and returns it.
    pub fn refresh(&self) -> i64 {
        let now = now_secs();
        self.reference.store(now, Ordering::Relaxed);
        now
    }

    /// Pins the reference to an explicit time.
    pub fn set_reference(&self, secs: i64) {
        self.reference.store(secs, Ordering::Relaxed);
    }

    pub fn reference(&self) -> i64 {
        self.reference.load(Ordering::Relaxed)
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// `true` if `time` is less than one window before the reference.
    /// Times in the future count as recent.
    pub fn is_recent(&self, time: i64) -> bool {
        self.reference() - time < self.window_secs
    }
}

impl Default for RecentClock {
    fn default() -> Self {
        Self::new(RECENT_WINDOW_SECS)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Flags derivable from a successful `lstat` alone.
pub fn probe_attributes(path: &Path, info: &StatInfo, clock: &RecentClock) -> ItemFlags {
    let mut flags = ItemFlags::empty();
    if clock.is_recent(info.mtime) || clock.is_recent(info.ctime) {
        flags |= ItemFlags::RECENT;
    }
    if has_xattrs(path) {
        flags |= ItemFlags::HAS_XATTR;
    }
    flags
}

/// Mount flags for a directory.
///
/// `parent` is the stat of the containing directory, if the caller already
/// has it.
pub fn probe_mount(
    mounts: &dyn MountTable,
    path: &Path,
    info: &StatInfo,
    parent: Option<&StatInfo>,
) -> ItemFlags {
    if mounts.is_mount_point(path, info, parent) {
        ItemFlags::MOUNT_POINT | ItemFlags::MOUNTED
    } else if mounts.is_static_mount(path) {
        ItemFlags::MOUNT_POINT
    } else {
        ItemFlags::empty()
    }
}

/// `true` if `path` (not its symlink target) has any extended attributes.
///
/// Filesystems without xattr support report "none".
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn has_xattrs(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: a null buffer with size 0 only asks for the list length.
    let len = unsafe { libc::llistxattr(c_path.as_ptr(), std::ptr::null_mut(), 0) };
    len > 0
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn has_xattrs(_path: &Path) -> bool {
    false
}

/// Reads the user label stored in [`LABEL_XATTR`], if any.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn read_label(path: &Path) -> Option<String> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let c_name = CString::new(LABEL_XATTR).ok()?;
    let mut buf = [0u8; 256];
    // SAFETY: both strings are NUL-terminated and `buf` is valid for its length.
    let len = unsafe {
        libc::lgetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if len <= 0 {
        return None;
    }
    let label = String::from_utf8_lossy(&buf[..len as usize]).trim().to_string();
    (!label.is_empty()).then_some(label)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn read_label(_path: &Path) -> Option<String> {
    None
}
