//! Live directory listings shared between windows.
//!
//! A [`Directory`] holds the entries of one canonical path. Windows
//! subscribe to it through a [`DirectoryCache`] and receive
//! [`DirBatch`](crate::event::DirBatch)es whenever its contents change.

pub mod cache;

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::event::{DirAction, DirBatch};
use crate::fs::entry::DirEntry;

pub use cache::{FsDirectoryCache, ScanMode};

/// Shared handle to a cached directory.
pub type DirectoryHandle = Arc<Directory>;

/// Identifies one subscription to a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(pub u64);

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Supplies live directory records and change notifications.
pub trait DirectoryCache: Send + Sync {
    /// The directory at `real_path`, or `None` if it cannot be read.
    fn lookup(&self, real_path: &Path) -> Option<DirectoryHandle>;

    /// Subscribes `tx` to changes in `dir`. Known entries are sent
    /// straight away, followed by a scan if the listing is stale.
    fn attach(&self, dir: &DirectoryHandle, tx: UnboundedSender<DirBatch>) -> AttachmentId;

    fn detach(&self, dir: &DirectoryHandle, id: AttachmentId);

    /// Rescans `dir`.
    fn update(&self, dir: &DirectoryHandle);

    /// Restats the entry for `path` in every cached directory listing it
    /// and sends an `Update` for it.
    fn force_update_path(&self, path: &Path);

    /// Rescans every cached directory at or below `path`.
    fn refresh_dirs(&self, path: &Path);

    /// Re-reads the live mount table. Returns `true` if it changed.
    fn refresh_mounts(&self) -> bool {
        false
    }
}

struct Subscriber {
    id: AttachmentId,
    tx: UnboundedSender<DirBatch>,
}

#[derive(Default)]
struct DirState {
    subscribers: Vec<Subscriber>,
    scanning: bool,
    needs_scan: bool,
    rescan_pending: bool,
}

/// One cached directory listing.
pub struct Directory {
    path: PathBuf,
    entries: Mutex<BTreeMap<OsString, Arc<DirEntry>>>,
    state: Mutex<DirState>,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(BTreeMap::new()),
            state: Mutex::new(DirState {
                needs_scan: true,
                ..DirState::default()
            }),
        }
    }

    /// The canonical path of this directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All known entries in display order.
    pub fn entries(&self) -> Vec<Arc<DirEntry>> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.collation_key().cmp(b.collation_key()));
        entries
    }

    /// The entry with on-disk name `name`.
    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<Arc<DirEntry>> {
        self.entries.lock().get(name.as_ref()).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().scanning
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Sends `batch` to every subscriber, dropping those that hung up.
    fn broadcast(&self, batch: DirBatch) {
        self.state
            .lock()
            .subscribers
            .retain(|sub| sub.tx.send(batch.clone()).is_ok());
    }

    /// Marks a scan as running. Returns `false` if one already is; the
    /// running scan will then go round again when it finishes.
    fn begin_scan(&self) -> bool {
        let mut state = self.state.lock();
        if state.scanning {
            state.rescan_pending = true;
            return false;
        }
        state.scanning = true;
        state
            .subscribers
            .retain(|sub| sub.tx.send(DirBatch::marker(DirAction::StartScan)).is_ok());
        true
    }

    /// Clears the scanning state. Returns `true` if another scan was
    /// requested meanwhile and has been started in its place.
    fn end_scan(&self) -> bool {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|sub| sub.tx.send(DirBatch::marker(DirAction::EndScan)).is_ok());
        state.needs_scan = false;
        if state.rescan_pending {
            state.rescan_pending = false;
            state
                .subscribers
                .retain(|sub| sub.tx.send(DirBatch::marker(DirAction::StartScan)).is_ok());
            return true;
        }
        state.scanning = false;
        false
    }

    /// Adds a subscriber. Returns `true` if the caller must start a scan.
    fn subscribe(&self, id: AttachmentId, tx: UnboundedSender<DirBatch>) -> bool {
        let mut state = self.state.lock();
        let start = !state.scanning && state.needs_scan;

        if state.scanning || start {
            let _ = tx.send(DirBatch::marker(DirAction::StartScan));
        }
        let known = self.entries();
        if !known.is_empty() {
            let _ = tx.send(DirBatch::new(DirAction::Add, known));
        }
        if !state.scanning && !start {
            let _ = tx.send(DirBatch::marker(DirAction::EndScan));
        }

        if start {
            state.scanning = true;
            state
                .subscribers
                .retain(|sub| sub.tx.send(DirBatch::marker(DirAction::StartScan)).is_ok());
        }
        state.subscribers.push(Subscriber { id, tx });
        start
    }

    fn unsubscribe(&self, id: AttachmentId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|sub| sub.id != id);
        state.subscribers.len() != before
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}
