//! State of one filer window.
//!
//! A [`WindowSession`] mirrors the directory it is attached to: it keeps
//! its own sorted copy of the entries, fed by the batches the directory
//! cache sends, plus the selection, cursor and thumbnail queue. The
//! [`WindowManager`](crate::window::WindowManager) owns every session and
//! drives the transitions.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::dir::{AttachmentId, DirectoryHandle};
use crate::event::{DirAction, DirBatch};
use crate::fs::entry::DirEntry;
use crate::window::thumbs::{ThumbProgress, ThumbnailQueue};

/// Identifies a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {}", self.0)
    }
}

/// Where a window is in its attach/scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unattached,
    Scanning,
    Idle,
}

/// Whether the window's selection is the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Normal,
    Insensitive,
}

/// Format for exporting the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    /// Space-separated paths.
    Text,
    /// Space-separated `file://` URIs.
    UriList,
}

/// What activating an item did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A pending target callback received the item.
    Picked,
    /// The window moved into the directory.
    Navigated,
    /// The item should be run or opened by the frontend.
    Launch(PathBuf),
}

/// One-shot callback for the next activated item.
pub type TargetCallback = Box<dyn FnOnce(SessionId, &Arc<DirEntry>) + Send>;

/// Per-window display options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub show_hidden: bool,
    pub show_thumbs: bool,
}

pub struct WindowSession {
    id: SessionId,
    sym_path: String,
    real_path: PathBuf,
    directory: Option<DirectoryHandle>,
    attachment: Option<AttachmentId>,
    events: Option<UnboundedReceiver<DirBatch>>,
    state: SessionState,
    items: Vec<Arc<DirEntry>>,
    selected: HashSet<String>,
    selection_state: SelectionState,
    cursor: Option<String>,
    pub(crate) auto_select: Option<String>,
    pub(crate) pending_select: Option<Vec<String>>,
    pub(crate) thumbs: ThumbnailQueue,
    pub(crate) target: Option<TargetCallback>,
    pub(crate) options: DisplayOptions,
}

impl WindowSession {
    pub(crate) fn new(
        id: SessionId,
        sym_path: String,
        real_path: PathBuf,
        directory: DirectoryHandle,
        options: DisplayOptions,
    ) -> Self {
        Self {
            id,
            sym_path,
            real_path,
            directory: Some(directory),
            attachment: None,
            events: None,
            state: SessionState::Unattached,
            items: Vec::new(),
            selected: HashSet::new(),
            selection_state: SelectionState::Insensitive,
            cursor: None,
            auto_select: None,
            pending_select: None,
            thumbs: ThumbnailQueue::new(),
            target: None,
            options,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The path as the user sees it.
    pub fn sym_path(&self) -> &str {
        &self.sym_path
    }

    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    pub fn directory(&self) -> Option<&DirectoryHandle> {
        self.directory.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == SessionState::Scanning
    }

    pub fn options(&self) -> DisplayOptions {
        self.options
    }

    /// Every known entry in display order, hidden ones included.
    pub fn items(&self) -> &[Arc<DirEntry>] {
        &self.items
    }

    /// Entries the window shows.
    pub fn visible_items(&self) -> Vec<Arc<DirEntry>> {
        self.items
            .iter()
            .filter(|e| self.options.show_hidden || !e.is_hidden())
            .cloned()
            .collect()
    }

    pub fn item(&self, leafname: &str) -> Option<&Arc<DirEntry>> {
        self.items.iter().find(|e| e.leafname() == leafname)
    }

    /// Selected leaf names in display order.
    pub fn selected(&self) -> Vec<&str> {
        self.items
            .iter()
            .map(|e| e.leafname())
            .filter(|name| self.selected.contains(*name))
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn is_selected(&self, leafname: &str) -> bool {
        self.selected.contains(leafname)
    }

    pub fn selection_state(&self) -> SelectionState {
        self.selection_state
    }

    /// The item the cursor is on.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn thumb_progress(&self) -> ThumbProgress {
        self.thumbs.progress()
    }

    pub fn thumbs_running(&self) -> bool {
        self.thumbs.is_running()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub(crate) fn set_paths(&mut self, sym_path: String, real_path: PathBuf) {
        self.sym_path = sym_path;
        self.real_path = real_path;
    }

    pub(crate) fn set_directory(&mut self, directory: DirectoryHandle) {
        self.directory = Some(directory);
    }

    pub(crate) fn set_selection_state(&mut self, state: SelectionState) {
        self.selection_state = state;
    }

    /// A fresh channel for the next attachment. Batches still queued
    /// from an earlier one are dropped with the old receiver.
    pub(crate) fn open_channel(&mut self) -> UnboundedSender<DirBatch> {
        let (tx, rx) = unbounded_channel();
        self.events = Some(rx);
        self.state = SessionState::Scanning;
        tx
    }

    pub(crate) fn set_attachment(&mut self, id: AttachmentId) {
        self.attachment = Some(id);
    }

    /// Forgets the attachment and everything it delivered.
    pub(crate) fn take_attachment(&mut self) -> Option<(DirectoryHandle, AttachmentId)> {
        self.events = None;
        self.state = SessionState::Unattached;
        self.items.clear();
        self.selected.clear();
        self.cursor = None;
        let attachment = self.attachment.take()?;
        self.directory.clone().map(|dir| (dir, attachment))
    }

    pub(crate) fn drain_events(&mut self) -> Vec<DirBatch> {
        let Some(rx) = self.events.as_mut() else {
            return Vec::new();
        };
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    /// Applies one batch. Returns `true` when it ends a scan.
    pub(crate) fn apply(&mut self, batch: DirBatch) -> bool {
        match batch.action {
            DirAction::StartScan => {
                self.state = SessionState::Scanning;
                false
            }
            DirAction::Add | DirAction::Update => {
                for entry in batch.items {
                    self.upsert(entry);
                }
                false
            }
            DirAction::Remove => {
                for entry in &batch.items {
                    let leaf = entry.leafname();
                    self.items.retain(|e| e.name() != entry.name());
                    self.selected.remove(leaf);
                    if self.cursor.as_deref() == Some(leaf) {
                        self.cursor = None;
                    }
                }
                false
            }
            DirAction::EndScan => {
                self.state = SessionState::Idle;
                true
            }
        }
    }

    fn upsert(&mut self, entry: Arc<DirEntry>) {
        if let Some(slot) = self
            .items
            .iter_mut()
            .find(|e| e.name() == entry.name())
        {
            *slot = entry;
            return;
        }
        let at = self
            .items
            .partition_point(|e| e.collation_key() < entry.collation_key());
        self.items.insert(at, entry);
    }

    pub(crate) fn set_cursor(&mut self, leafname: &str) -> bool {
        if self.item(leafname).is_none() {
            return false;
        }
        self.cursor = Some(leafname.to_string());
        true
    }

    pub(crate) fn select(&mut self, leafname: &str) -> bool {
        if self.item(leafname).is_none() {
            return false;
        }
        self.selected.insert(leafname.to_string());
        true
    }

    pub(crate) fn toggle(&mut self, leafname: &str) -> bool {
        if self.item(leafname).is_none() {
            return false;
        }
        if !self.selected.remove(leafname) {
            self.selected.insert(leafname.to_string());
        }
        true
    }

    pub(crate) fn clear_selection(&mut self) {
        self.selected.clear();
    }
}

impl fmt::Debug for WindowSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowSession")
            .field("id", &self.id)
            .field("sym_path", &self.sym_path)
            .field("state", &self.state)
            .field("items", &self.items.len())
            .field("selected", &self.selected.len())
            .finish()
    }
}
