//! Directory entry representation.
//!
//! A [`DirEntry`] is one leaf name inside a directory listing. Its name is
//! fixed for life; everything learned from the filesystem lives in an
//! immutable [`EntryRecord`] that is replaced wholesale. Readers take a
//! snapshot (an `Arc` clone) and never see a half-updated record.

use std::cmp::Ordering;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use unicode_normalization::UnicodeNormalization;

use crate::error::CoreError;
use crate::fs::classify::BaseType;
use crate::icons::IconHandle;
use crate::mime::MimeType;

/// uid/gid recorded when the stat failed.
pub const ID_UNKNOWN: u32 = u32::MAX;

bitflags! {
    /// Per-entry state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u32 {
        /// Modified or changed within the recent window.
        const RECENT = 1 << 0;
        /// Has at least one extended attribute.
        const HAS_XATTR = 1 << 1;
        const SYMLINK = 1 << 2;
        /// Something is, or can be, mounted here.
        const MOUNT_POINT = 1 << 3;
        /// Something is mounted here right now.
        const MOUNTED = 1 << 4;
        /// A file with an execute bit, or a desktop entry.
        const EXEC_FILE = 1 << 5;
        /// A directory with a valid `AppRun`.
        const APP_DIR = 1 << 6;
        /// Directory type/size/icon are provisional until examined.
        const NEED_EXAMINE = 1 << 7;
        /// Not stat'd since it appeared in the listing.
        const NEED_RESCAN_QUEUE = 1 << 8;
        const NOT_DELETE = 1 << 9;
    }
}

/// Everything known about an entry from its last restat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub base_type: BaseType,
    pub mode: u32,
    /// Bytes for files; child count for examined directories.
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub ctime: i64,
    pub atime: i64,
    /// errno of the failed `lstat`, `0` otherwise.
    pub lstat_errno: i32,
    pub mime_type: Option<MimeType>,
    pub flags: ItemFlags,
    pub label: Option<String>,
}

impl EntryRecord {
    /// The record of an entry that has only been seen in a listing.
    pub fn unknown() -> Self {
        Self {
            base_type: BaseType::Unknown,
            mode: 0,
            size: 0,
            uid: 0,
            gid: 0,
            mtime: 0,
            ctime: 0,
            atime: 0,
            lstat_errno: 0,
            mime_type: None,
            flags: ItemFlags::NEED_RESCAN_QUEUE | ItemFlags::NOT_DELETE,
            label: None,
        }
    }

    /// The record of an entry whose `lstat` failed with `errno`.
    pub fn failed(errno: i32) -> Self {
        Self {
            base_type: BaseType::Error,
            uid: ID_UNKNOWN,
            gid: ID_UNKNOWN,
            lstat_errno: errno,
            flags: ItemFlags::empty(),
            ..Self::unknown()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.base_type == BaseType::Directory
    }

    pub fn is_app_dir(&self) -> bool {
        self.flags.contains(ItemFlags::APP_DIR)
    }

    /// Why this record is an `Error`, for display.
    pub fn error(&self, path: &Path) -> Option<CoreError> {
        if self.base_type != BaseType::Error {
            return None;
        }
        if self.flags.contains(ItemFlags::SYMLINK) {
            Some(CoreError::BrokenSymlink(path.to_path_buf()))
        } else {
            Some(CoreError::from_errno(path, self.lstat_errno))
        }
    }
}

impl Default for EntryRecord {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Sort key for leaf names: case-insensitive, with digit runs compared by
/// value so `file9` sorts before `file10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollationKey {
    segments: Vec<Segment>,
    raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    /// Leading zeros stripped; compared by length then digits.
    Number(usize, String),
    Text(String),
}

impl CollationKey {
    pub fn new(name: &str) -> Self {
        let folded: String = name.nfc().flat_map(char::to_lowercase).collect();
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for ch in folded.chars() {
            let is_digit = ch.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                segments.push(Self::segment(std::mem::take(&mut current), in_digits));
            }
            in_digits = is_digit;
            current.push(ch);
        }
        if !current.is_empty() {
            segments.push(Self::segment(current, in_digits));
        }

        Self {
            segments,
            raw: name.to_owned(),
        }
    }

    fn segment(text: String, digits: bool) -> Segment {
        if digits {
            let trimmed = text.trim_start_matches('0').to_owned();
            Segment::Number(trimmed.len(), trimmed)
        } else {
            Segment::Text(text)
        }
    }
}

impl Ord for CollationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments
            .cmp(&other.segments)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for CollationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The record and icon, swapped together.
#[derive(Debug)]
struct EntrySlot {
    record: Arc<EntryRecord>,
    image: Option<IconHandle>,
}

/// One named entry in a directory listing.
///
/// All mutation goes through short critical sections that swap a complete
/// record in; no I/O ever happens with the lock held.
#[derive(Debug)]
pub struct DirEntry {
    name: OsString,
    leafname: String,
    collation_key: CollationKey,
    slot: Mutex<EntrySlot>,
}

impl DirEntry {
    pub fn new(leafname: impl Into<String>) -> Self {
        let leafname = leafname.into();
        Self::with_names(OsString::from(&leafname), leafname)
    }

    /// An entry for a name as read from the directory. Names that are not
    /// UTF-8 keep their raw bytes for filesystem access and display lossily.
    pub fn from_os(name: OsString) -> Self {
        let leafname = name.to_string_lossy().into_owned();
        Self::with_names(name, leafname)
    }

    fn with_names(name: OsString, leafname: String) -> Self {
        let collation_key = CollationKey::new(&leafname);
        Self {
            name,
            leafname,
            collation_key,
            slot: Mutex::new(EntrySlot {
                record: Arc::new(EntryRecord::unknown()),
                image: None,
            }),
        }
    }

    /// The name for display.
    pub fn leafname(&self) -> &str {
        &self.leafname
    }

    /// The name on disk. Join this, not [`DirEntry::leafname`], onto the
    /// directory path.
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn collation_key(&self) -> &CollationKey {
        &self.collation_key
    }

    /// `true` for dot-files.
    pub fn is_hidden(&self) -> bool {
        self.leafname.starts_with('.')
    }

    /// The current record.
    pub fn record(&self) -> Arc<EntryRecord> {
        self.slot.lock().record.clone()
    }

    /// The current icon, if one has been resolved.
    pub fn image(&self) -> Option<IconHandle> {
        self.slot.lock().image.clone()
    }

    /// Record and icon as seen at one instant.
    pub fn snapshot(&self) -> (Arc<EntryRecord>, Option<IconHandle>) {
        let slot = self.slot.lock();
        (slot.record.clone(), slot.image.clone())
    }

    /// Replaces record and icon together. The previous icon reference is
    /// released inside the same critical section.
    pub(crate) fn publish(&self, record: EntryRecord, image: Option<IconHandle>) {
        let mut slot = self.slot.lock();
        slot.record = Arc::new(record);
        slot.image = image;
    }

    /// Copy-modify-swap of the current record and icon.
    pub(crate) fn update<R>(
        &self,
        f: impl FnOnce(&mut EntryRecord, &mut Option<IconHandle>) -> R,
    ) -> R {
        let mut slot = self.slot.lock();
        let mut record = (*slot.record).clone();
        let mut image = slot.image.clone();
        let result = f(&mut record, &mut image);
        slot.record = Arc::new(record);
        slot.image = image;
        result
    }

    /// Returns the icon, filling it in with `make` first if it is empty.
    pub(crate) fn image_or_insert_with(
        &self,
        make: impl FnOnce(&EntryRecord) -> Option<IconHandle>,
    ) -> Option<IconHandle> {
        let mut slot = self.slot.lock();
        if slot.image.is_none() {
            let record = slot.record.clone();
            slot.image = make(&record);
        }
        slot.image.clone()
    }
}
