//! Owns every open window and drives their transitions.
//!
//! All operations are synchronous and take `&mut self`; the frontend calls
//! [`WindowManager::pump`] whenever it is idle to apply queued directory
//! batches, and [`WindowManager::next_thumb`] to make one unit of
//! thumbnail progress.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::settings::GeneralConfig;
use crate::dir::DirectoryCache;
use crate::error::{CoreError, CoreResult};
use crate::fs::classify::BaseType;
use crate::fs::entry::DirEntry;
use crate::icons::IconCache;
use crate::nav::groups::{Group, GroupStore};
use crate::nav::path::{
    abbreviate_home, is_at_or_below, make_path, real_path, split_parent, tidy_sympath,
};
use crate::window::collab::{
    IconThumbnailer, LocalSelection, LogNotifier, Notifier, SelectionOwner, Thumbnailer,
};
use crate::window::session::{
    DisplayOptions, OpenOutcome, SelectionState, SelectionTarget, SessionId, SessionState,
    TargetCallback, WindowSession,
};
use crate::window::thumbs::ThumbProgress;

pub struct WindowManager {
    cache: Arc<dyn DirectoryCache>,
    icons: Arc<dyn IconCache>,
    notifier: Arc<dyn Notifier>,
    selection: Arc<dyn SelectionOwner>,
    thumbnailer: Arc<dyn Thumbnailer>,
    general: GeneralConfig,
    groups: GroupStore,
    groups_file: Option<PathBuf>,
    home: Option<PathBuf>,
    host: String,
    sessions: BTreeMap<SessionId, WindowSession>,
    next_id: u64,
}

impl WindowManager {
    pub fn new(cache: Arc<dyn DirectoryCache>, icons: Arc<dyn IconCache>) -> Self {
        Self {
            cache,
            thumbnailer: Arc::new(IconThumbnailer::new(icons.clone())),
            icons,
            notifier: Arc::new(LogNotifier),
            selection: Arc::new(LocalSelection::new()),
            general: GeneralConfig::default(),
            groups: GroupStore::new(),
            groups_file: None,
            home: std::env::var_os("HOME").map(PathBuf::from),
            host: host_name(),
            sessions: BTreeMap::new(),
            next_id: 1,
        }
    }

    #[must_use]
    pub fn with_config(self, general: GeneralConfig) -> Self {
        Self { general, ..self }
    }

    #[must_use]
    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier, ..self }
    }

    #[must_use]
    pub fn with_selection_owner(self, selection: Arc<dyn SelectionOwner>) -> Self {
        Self { selection, ..self }
    }

    #[must_use]
    pub fn with_thumbnailer(self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        Self {
            thumbnailer,
            ..self
        }
    }

    /// Uses `groups`, saving changes to `file` if given.
    #[must_use]
    pub fn with_groups(self, groups: GroupStore, file: Option<PathBuf>) -> Self {
        Self {
            groups,
            groups_file: file,
            ..self
        }
    }

    /// Home directory abbreviated to `~` in titles.
    #[must_use]
    pub fn with_home(self, home: Option<PathBuf>) -> Self {
        Self { home, ..self }
    }

    /// Host name used in `file://` URIs.
    #[must_use]
    pub fn with_host(self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self
        }
    }

    pub fn session(&self, id: SessionId) -> Option<&WindowSession> {
        self.sessions.get(&id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn groups(&self) -> &GroupStore {
        &self.groups
    }

    fn get(&self, id: SessionId) -> CoreResult<&WindowSession> {
        self.sessions.get(&id).ok_or(CoreError::UnknownSession(id.0))
    }

    fn get_mut(&mut self, id: SessionId) -> CoreResult<&mut WindowSession> {
        self.sessions
            .get_mut(&id)
            .ok_or(CoreError::UnknownSession(id.0))
    }

    // --- Attachment ------------------------------------------------------

    fn attach(&mut self, id: SessionId) {
        let cache = self.cache.clone();
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let Some(dir) = session.directory().cloned() else {
            return;
        };
        let tx = session.open_channel();
        let attachment = cache.attach(&dir, tx);
        session.set_attachment(attachment);
        tracing::debug!("{id} attached to {}", dir.path().display());
    }

    fn detach(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if let Some((dir, attachment)) = session.take_attachment() {
            self.cache.detach(&dir, attachment);
        }
    }

    // --- Opening and navigating -------------------------------------------

    /// Opens a window on `path`. Display options are copied from `src`
    /// when given. With unique windows on, an existing window showing the
    /// same path is returned instead.
    pub fn open_dir(&mut self, path: &str, src: Option<SessionId>) -> Option<SessionId> {
        let sym_path = tidy_sympath(path);
        if self.general.unique_windows {
            if let Some(existing) = self.find_window(&sym_path, None) {
                tracing::debug!("reusing {existing} for {sym_path}");
                return Some(existing);
            }
        }

        let real = real_path(&sym_path);
        let Some(dir) = self.cache.lookup(&real) else {
            self.notifier.warn(&format!("Directory '{path}' not found."));
            return None;
        };

        let options = src
            .and_then(|src| self.sessions.get(&src))
            .map(WindowSession::options)
            .unwrap_or(DisplayOptions {
                show_hidden: self.general.show_hidden,
                show_thumbs: self.general.show_thumbs,
            });
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions
            .insert(id, WindowSession::new(id, sym_path, real, dir, options));
        self.attach(id);
        Some(id)
    }

    /// Moves window `id` to `path`. If `from` names a leaf, the cursor is
    /// put on it once the new listing is in.
    ///
    /// # Errors
    ///
    /// [`CoreError::DirectoryInaccessible`] if `path` cannot be opened; the
    /// window is left where it was.
    pub fn change_to(&mut self, id: SessionId, path: &str, from: Option<&str>) -> CoreResult<()> {
        self.cancel_thumbnails(id)?;

        let sym_path = tidy_sympath(path);
        let real = real_path(&sym_path);
        let Some(dir) = self.cache.lookup(&real) else {
            self.notifier
                .warn(&format!("Directory '{sym_path}' is not accessible"));
            return Err(CoreError::DirectoryInaccessible(PathBuf::from(sym_path)));
        };

        if self.general.unique_windows {
            if let Some(other) = self.find_window(&sym_path, Some(id)) {
                self.close(other)?;
            }
        }

        self.detach(id);
        let session = self.get_mut(id)?;
        session.set_paths(sym_path, real);
        session.set_directory(dir);
        session.auto_select = from.filter(|leaf| !leaf.is_empty()).map(str::to_owned);
        session.pending_select = None;
        self.attach(id);
        Ok(())
    }

    /// Moves window `id` up one level, putting the cursor on the directory
    /// it came from. Does nothing at `/`.
    pub fn change_to_parent(&mut self, id: SessionId) -> CoreResult<()> {
        let sym_path = self.get(id)?.sym_path().to_owned();
        let Some((parent, leaf)) = split_parent(&sym_path) else {
            return Ok(());
        };
        self.change_to(id, &parent, Some(&leaf))
    }

    /// Opens a new window on the parent of `id`. `None` at `/`.
    pub fn open_parent(&mut self, id: SessionId) -> CoreResult<Option<SessionId>> {
        let sym_path = self.get(id)?.sym_path().to_owned();
        let Some((parent, _)) = split_parent(&sym_path) else {
            return Ok(None);
        };
        Ok(self.open_dir(&parent, Some(id)))
    }

    /// Rescans the directory of window `id`. If it has gone the window is
    /// closed, and `Ok(false)` returned.
    pub fn update_dir(&mut self, id: SessionId, warning: bool) -> CoreResult<bool> {
        let real = self.get(id)?.real_path().to_path_buf();
        let Some(dir) = self.cache.lookup(&real) else {
            if warning {
                self.notifier.info("Directory missing/deleted");
            }
            self.close(id)?;
            return Ok(false);
        };

        let same = self
            .get(id)?
            .directory()
            .is_some_and(|current| Arc::ptr_eq(current, &dir));
        if !same {
            self.detach(id);
            self.get_mut(id)?.set_directory(dir.clone());
            self.attach(id);
        }
        self.cache.update(&dir);
        Ok(true)
    }

    pub fn update_all(&mut self) {
        for id in self.session_ids() {
            if let Err(e) = self.update_dir(id, true) {
                tracing::debug!("update of {id} failed: {e}");
            }
        }
    }

    /// Reattaches window `id` to a fresh lookup of its directory and forces
    /// a rescan.
    pub fn detach_rescan(&mut self, id: SessionId) -> CoreResult<()> {
        let real = self.get(id)?.real_path().to_path_buf();
        self.detach(id);
        let Some(dir) = self.cache.lookup(&real) else {
            self.notifier.info("Directory missing/deleted");
            return self.close(id);
        };
        self.get_mut(id)?.set_directory(dir.clone());
        self.attach(id);
        self.cache.update(&dir);
        Ok(())
    }

    pub fn close(&mut self, id: SessionId) -> CoreResult<()> {
        self.cancel_thumbnails(id)?;
        self.detach(id);
        self.selection.release(id);
        self.sessions.remove(&id);
        tracing::debug!("closed {id}");
        Ok(())
    }

    /// Something was mounted or unmounted at `real_path`: rescan windows at
    /// or below it, and cached directories from its parent down.
    pub fn check_mounted(&mut self, real_path: &Path) {
        if self.cache.refresh_mounts() {
            tracing::debug!("mount table changed at {}", real_path.display());
        }
        let affected: Vec<_> = self
            .sessions
            .values()
            .filter(|s| is_at_or_below(s.real_path(), real_path))
            .map(WindowSession::id)
            .collect();
        for id in affected {
            if let Err(e) = self.update_dir(id, false) {
                tracing::debug!("update of {id} failed: {e}");
            }
        }
        let parent = real_path.parent().unwrap_or(real_path);
        self.cache.refresh_dirs(parent);
    }

    /// Closes every window showing `path` or anything below it. Returns how
    /// many were closed.
    pub fn close_recursive(&mut self, path: &Path) -> usize {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let doomed: Vec<_> = self
            .sessions
            .values()
            .filter(|s| is_at_or_below(s.real_path(), &path))
            .map(WindowSession::id)
            .collect();
        for id in &doomed {
            let _ = self.close(*id);
        }
        doomed.len()
    }

    /// A window other than `except` showing `sym_path`, either under the
    /// same symbolic path or the same canonical directory.
    pub fn find_window(&self, sym_path: &str, except: Option<SessionId>) -> Option<SessionId> {
        let sym_path = tidy_sympath(sym_path);
        let real = real_path(&sym_path);
        self.sessions
            .values()
            .filter(|s| Some(s.id()) != except)
            .find(|s| s.sym_path() == sym_path || s.real_path() == real)
            .map(WindowSession::id)
    }

    // --- Event delivery ---------------------------------------------------

    /// Applies every batch queued for window `id`. Returns how many there
    /// were.
    pub fn pump(&mut self, id: SessionId) -> CoreResult<usize> {
        let batches = self.get_mut(id)?.drain_events();
        let count = batches.len();
        for batch in batches {
            let Some(session) = self.sessions.get_mut(&id) else {
                break;
            };
            if session.apply(batch) {
                self.update_display(id)?;
            }
        }
        Ok(count)
    }

    /// [`WindowManager::pump`] for every window.
    pub fn pump_all(&mut self) -> usize {
        self.session_ids()
            .into_iter()
            .filter_map(|id| self.pump(id).ok())
            .sum()
    }

    /// A scan has finished: place the cursor, restore a group selection and
    /// queue thumbnails.
    fn update_display(&mut self, id: SessionId) -> CoreResult<()> {
        let session = self.get_mut(id)?;
        if let Some(leaf) = session.auto_select.take() {
            session.set_cursor(&leaf);
        }
        let restored = match session.pending_select.take() {
            Some(leaves) => {
                session.clear_selection();
                for leaf in &leaves {
                    session.select(leaf);
                }
                true
            }
            None => false,
        };
        if restored {
            self.selection_changed(id)?;
        }

        self.create_thumbs(id)?;
        let session = self.get_mut(id)?;
        if !session.thumbs.is_empty() {
            session.thumbs.start();
        }
        Ok(())
    }

    /// The window title: the path with home shown as `~`, then flags for
    /// scanning, hidden files and thumbnails.
    pub fn title(&self, id: SessionId) -> CoreResult<String> {
        let session = self.get(id)?;
        let flags = [
            (session.is_scanning(), "S", "Scanning"),
            (session.options().show_hidden, "A", "All"),
            (session.options().show_thumbs, "T", "Thumbs"),
        ];
        let set: Vec<_> = flags.iter().filter(|(on, _, _)| *on).collect();

        let suffix = if set.is_empty() {
            String::new()
        } else if self.general.short_flag_names {
            let letters: String = set.iter().map(|(_, short, _)| *short).collect();
            format!(" +{letters}")
        } else {
            let names: Vec<_> = set.iter().map(|(_, _, long)| *long).collect();
            format!(" ({})", names.join(", "))
        };

        Ok(format!(
            "{}{suffix}",
            abbreviate_home(session.sym_path(), self.home.as_deref())
        ))
    }

    // --- Display options --------------------------------------------------

    pub fn set_show_hidden(&mut self, id: SessionId, show: bool) -> CoreResult<()> {
        self.get_mut(id)?.options.show_hidden = show;
        Ok(())
    }

    pub fn set_show_thumbs(&mut self, id: SessionId, show: bool) -> CoreResult<()> {
        self.get_mut(id)?.options.show_thumbs = show;
        if show {
            self.create_thumbs(id)
        } else {
            self.cancel_thumbnails(id)
        }
    }

    pub fn visible_items(&self, id: SessionId) -> CoreResult<Vec<Arc<DirEntry>>> {
        Ok(self.get(id)?.visible_items())
    }

    // --- Selection --------------------------------------------------------

    pub fn select(&mut self, id: SessionId, leafname: &str) -> CoreResult<bool> {
        let found = self.get_mut(id)?.select(leafname);
        if found {
            self.selection_changed(id)?;
        }
        Ok(found)
    }

    pub fn toggle(&mut self, id: SessionId, leafname: &str) -> CoreResult<bool> {
        let found = self.get_mut(id)?.toggle(leafname);
        if found {
            self.selection_changed(id)?;
        }
        Ok(found)
    }

    pub fn clear_selection(&mut self, id: SessionId) -> CoreResult<()> {
        self.get_mut(id)?.clear_selection();
        Ok(())
    }

    /// The selection of `id` changed: claim the primary selection unless
    /// it already has it or nothing is selected.
    pub fn selection_changed(&mut self, id: SessionId) -> CoreResult<()> {
        let session = self.get(id)?;
        let previous = self.selection.owner();
        if previous == Some(id) || session.selected_count() == 0 {
            return Ok(());
        }

        let state = if self.selection.claim(id) {
            if let Some(previous) = previous {
                self.lost_primary(previous);
            }
            SelectionState::Normal
        } else {
            SelectionState::Insensitive
        };
        self.get_mut(id)?.set_selection_state(state);
        Ok(())
    }

    /// Another window or program took the primary selection.
    pub fn lost_primary(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.set_selection_state(SelectionState::Insensitive);
        }
    }

    pub fn selected_paths(&self, id: SessionId) -> CoreResult<Vec<PathBuf>> {
        let session = self.get(id)?;
        Ok(session
            .selected()
            .into_iter()
            .filter_map(|leaf| session.item(leaf))
            .map(|entry| Path::new(session.sym_path()).join(entry.name()))
            .collect())
    }

    /// The selection as the primary-selection contents for `target`.
    pub fn selection_text(&self, id: SessionId, target: SelectionTarget) -> CoreResult<String> {
        let session = self.get(id)?;
        let parts: Vec<String> = session
            .selected()
            .into_iter()
            .map(|leaf| {
                let path = make_path(session.sym_path(), leaf);
                match target {
                    SelectionTarget::Text => path,
                    SelectionTarget::UriList => format!("file://{}{path}", self.host),
                }
            })
            .collect();
        Ok(parts.join(" "))
    }

    // --- Target mode ------------------------------------------------------

    /// The next item activated in `id` goes to `callback` instead of being
    /// opened.
    pub fn set_target(&mut self, id: SessionId, callback: TargetCallback) -> CoreResult<()> {
        self.get_mut(id)?.target = Some(callback);
        Ok(())
    }

    pub fn cancel_target(&mut self, id: SessionId) -> CoreResult<()> {
        self.get_mut(id)?.target = None;
        Ok(())
    }

    /// Activates `leafname` in window `id`.
    pub fn activate(&mut self, id: SessionId, leafname: &str) -> CoreResult<OpenOutcome> {
        let session = self.get_mut(id)?;
        let entry = session
            .item(leafname)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(session.real_path().join(leafname)))?;

        if let Some(callback) = session.target.take() {
            callback(id, &entry);
            return Ok(OpenOutcome::Picked);
        }

        let record = entry.record();
        if record.is_dir() && !record.is_app_dir() {
            let path = make_path(session.sym_path(), leafname);
            self.change_to(id, &path, None)?;
            return Ok(OpenOutcome::Navigated);
        }
        Ok(OpenOutcome::Launch(session.real_path().join(entry.name())))
    }

    // --- Thumbnails -------------------------------------------------------

    /// Queues every image in window `id` the icon cache doesn't know yet.
    pub fn create_thumbs(&mut self, id: SessionId) -> CoreResult<()> {
        let session = self.get(id)?;
        if !session.options().show_thumbs {
            return Ok(());
        }
        let wanted: Vec<PathBuf> = session
            .items()
            .iter()
            .filter(|entry| {
                let record = entry.record();
                record.base_type == BaseType::File
                    && record
                        .mime_type
                        .as_ref()
                        .is_some_and(|mime| mime.media_type() == "image")
            })
            .map(|entry| session.real_path().join(entry.name()))
            .filter(|path| !self.icons.lookup_only_new(path).1)
            .collect();

        for path in wanted {
            self.create_thumb(id, path)?;
        }
        Ok(())
    }

    /// Queues one thumbnail, starting the pump unless a scan is running.
    pub fn create_thumb(&mut self, id: SessionId, path: PathBuf) -> CoreResult<()> {
        let session = self.get_mut(id)?;
        session.thumbs.push(path);
        if session.state() != SessionState::Scanning {
            session.thumbs.start();
        }
        Ok(())
    }

    /// Makes one thumbnail. Returns the progress before it, or `None` once
    /// the queue is empty (which also stops the pump).
    pub fn next_thumb(&mut self, id: SessionId) -> CoreResult<Option<ThumbProgress>> {
        let session = self.get_mut(id)?;
        if !session.thumbs.is_running() {
            return Ok(None);
        }
        let Some((path, progress)) = session.thumbs.pop() else {
            session.thumbs.cancel();
            return Ok(None);
        };

        if self.thumbnailer.generate(&path).is_none() {
            tracing::debug!("no thumbnail for {}", path.display());
        }
        self.cache.force_update_path(&path);
        Ok(Some(progress))
    }

    pub fn cancel_thumbnails(&mut self, id: SessionId) -> CoreResult<()> {
        self.get_mut(id)?.thumbs.cancel();
        Ok(())
    }

    // --- Groups -----------------------------------------------------------

    /// Remembers the directory and selection of `id` as group `name`.
    pub fn group_save(&mut self, id: SessionId, name: &str) -> CoreResult<()> {
        let session = self.get(id)?;
        let group = Group::new(
            name,
            session.sym_path(),
            session.selected().into_iter().map(str::to_owned),
        );
        self.groups = std::mem::take(&mut self.groups).with_group(group);
        if let Some(file) = &self.groups_file {
            self.groups.save_to_file(file)?;
        }
        Ok(())
    }

    /// Returns window `id` to group `name`'s directory and reselects its
    /// items once they are listed. Missing items are skipped.
    pub fn group_restore(&mut self, id: SessionId, name: &str) -> CoreResult<()> {
        let Some(group) = self.groups.get(name).cloned() else {
            self.notifier.warn(&format!("Group {name} is not set"));
            return Err(CoreError::UnknownGroup(name.to_string()));
        };

        if self.get(id)?.sym_path() != group.directory {
            self.change_to(id, &group.directory, None)?;
        }

        let session = self.get_mut(id)?;
        session.pending_select = Some(group.items);
        if session.state() == SessionState::Idle {
            self.update_display(id)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is valid for writes of its full length.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(not(unix))]
fn host_name() -> String {
    "localhost".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::FsDirectoryCache;
    use crate::fs::resolver::tests::resolver;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        fn warn(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }

        fn info(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }

    impl Recorder {
        fn last(&self) -> Option<String> {
            self.messages.lock().last().cloned()
        }
    }

    fn manager(general: GeneralConfig) -> (WindowManager, Arc<Recorder>) {
        let (resolver, icons) = resolver();
        let cache = Arc::new(FsDirectoryCache::new(Arc::new(resolver)));
        let notes = Arc::new(Recorder::default());
        let wm = WindowManager::new(cache, icons)
            .with_config(general)
            .with_notifier(notes.clone())
            .with_home(None)
            .with_host("box");
        (wm, notes)
    }

    /// A temp tree: `a.txt`, `b.txt`, `.hidden`, `sub/inner`.
    fn tree() -> (TempDir, String) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join(".hidden"), "h").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("inner"), "i").unwrap();
        let root = fs::canonicalize(tmp.path())
            .unwrap()
            .to_string_lossy()
            .into_owned();
        (tmp, root)
    }

    fn leaves(wm: &WindowManager, id: SessionId) -> Vec<String> {
        wm.visible_items(id)
            .unwrap()
            .iter()
            .map(|e| e.leafname().to_string())
            .collect()
    }

    #[test]
    fn open_dir_lists_entries() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&format!("{root}/"), None).unwrap();

        assert_eq!(wm.session(id).unwrap().sym_path(), root);
        assert!(wm.pump(id).unwrap() > 0);
        assert_eq!(wm.session(id).unwrap().state(), SessionState::Idle);
        assert_eq!(leaves(&wm, id), vec!["a.txt", "b.txt", "sub"]);

        wm.set_show_hidden(id, true).unwrap();
        assert_eq!(leaves(&wm, id).len(), 4);
    }

    #[test]
    fn open_missing_dir_notifies() {
        let (mut wm, notes) = manager(GeneralConfig::default());
        assert!(wm.open_dir("/nonexistent/dir", None).is_none());
        assert_eq!(
            notes.last().as_deref(),
            Some("Directory '/nonexistent/dir' not found.")
        );
        assert!(wm.is_empty());
    }

    #[test]
    fn unique_windows_reuse_existing() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig {
            unique_windows: true,
            ..GeneralConfig::default()
        });
        let first = wm.open_dir(&root, None).unwrap();
        let second = wm.open_dir(&format!("{root}//"), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(wm.len(), 1);
    }

    #[test]
    fn unique_windows_close_duplicate_on_change() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig {
            unique_windows: true,
            ..GeneralConfig::default()
        });
        let top = wm.open_dir(&root, None).unwrap();
        let sub = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        wm.change_to(sub, &root, None).unwrap();
        assert!(wm.session(top).is_none());
        assert_eq!(wm.find_window(&root, None), Some(sub));
    }

    #[cfg(unix)]
    #[test]
    fn unique_windows_match_through_symlinks() {
        let (_tmp, root) = tree();
        let links = TempDir::new().unwrap();
        let alias = links.path().join("alias");
        std::os::unix::fs::symlink(&root, &alias).unwrap();
        let (mut wm, _) = manager(GeneralConfig {
            unique_windows: true,
            ..GeneralConfig::default()
        });

        let first = wm.open_dir(&root, None).unwrap();
        let second = wm.open_dir(&alias.to_string_lossy(), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(wm.len(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn raw_names_reach_launch_and_selection_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let raw = OsStr::from_bytes(b"caf\xe9.txt");
        fs::write(tmp.path().join(raw), "x").unwrap();
        let root = fs::canonicalize(tmp.path())
            .unwrap()
            .to_string_lossy()
            .into_owned();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();

        let shown = "caf\u{fffd}.txt";
        assert_eq!(leaves(&wm, id), vec![shown]);
        let expected = PathBuf::from(&root).join(raw);
        assert_eq!(
            wm.activate(id, shown).unwrap(),
            OpenOutcome::Launch(expected.clone())
        );
        assert!(wm.select(id, shown).unwrap());
        assert_eq!(wm.selected_paths(id).unwrap(), vec![expected]);
    }

    #[test]
    fn new_window_inherits_display_options() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let src = wm.open_dir(&root, None).unwrap();
        wm.set_show_hidden(src, true).unwrap();

        let child = wm.open_dir(&format!("{root}/sub"), Some(src)).unwrap();
        assert!(wm.session(child).unwrap().options().show_hidden);
        let plain = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        assert!(!wm.session(plain).unwrap().options().show_hidden);
    }

    #[test]
    fn change_to_parent_puts_cursor_on_origin() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        wm.pump(id).unwrap();

        wm.change_to_parent(id).unwrap();
        wm.pump(id).unwrap();
        let session = wm.session(id).unwrap();
        assert_eq!(session.sym_path(), root);
        assert_eq!(session.cursor(), Some("sub"));
    }

    #[test]
    fn change_to_parent_at_root_does_nothing() {
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir("/", None).unwrap();
        wm.change_to_parent(id).unwrap();
        assert_eq!(wm.session(id).unwrap().sym_path(), "/");
        assert_eq!(wm.open_parent(id).unwrap(), None);
    }

    #[test]
    fn inaccessible_target_leaves_window_alone() {
        let (_tmp, root) = tree();
        let (mut wm, notes) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();

        let missing = format!("{root}/missing");
        let err = wm.change_to(id, &missing, None).unwrap_err();
        assert!(matches!(err, CoreError::DirectoryInaccessible(_)));
        assert_eq!(
            notes.last(),
            Some(format!("Directory '{missing}' is not accessible"))
        );
        assert_eq!(wm.session(id).unwrap().sym_path(), root);
        assert_eq!(leaves(&wm, id).len(), 3);
    }

    #[test]
    fn update_dir_sees_new_files() {
        let (tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();

        fs::write(tmp.path().join("c.txt"), "c").unwrap();
        fs::remove_file(tmp.path().join("a.txt")).unwrap();
        assert!(wm.update_dir(id, true).unwrap());
        wm.pump(id).unwrap();
        assert_eq!(leaves(&wm, id), vec!["b.txt", "c.txt", "sub"]);
    }

    #[test]
    fn update_dir_closes_deleted_directory() {
        let (tmp, root) = tree();
        let (mut wm, notes) = manager(GeneralConfig::default());
        let id = wm.open_dir(&format!("{root}/sub"), None).unwrap();

        fs::remove_dir_all(tmp.path().join("sub")).unwrap();
        assert!(!wm.update_dir(id, true).unwrap());
        assert!(wm.session(id).is_none());
        assert_eq!(notes.last().as_deref(), Some("Directory missing/deleted"));
    }

    #[test]
    fn detach_rescan_reloads_listing() {
        let (tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();

        fs::write(tmp.path().join("new"), "n").unwrap();
        wm.detach_rescan(id).unwrap();
        wm.pump(id).unwrap();
        assert!(leaves(&wm, id).contains(&"new".to_string()));
        assert_eq!(wm.session(id).unwrap().state(), SessionState::Idle);
    }

    #[test]
    fn title_flags() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        assert_eq!(wm.title(id).unwrap(), format!("{root} (Scanning)"));

        wm.pump(id).unwrap();
        assert_eq!(wm.title(id).unwrap(), root);

        wm.set_show_hidden(id, true).unwrap();
        wm.set_show_thumbs(id, true).unwrap();
        assert_eq!(wm.title(id).unwrap(), format!("{root} (All, Thumbs)"));

        let (mut short, _) = manager(GeneralConfig {
            short_flag_names: true,
            show_hidden: true,
            ..GeneralConfig::default()
        });
        let id = short.open_dir(&root, None).unwrap();
        assert_eq!(short.title(id).unwrap(), format!("{root} +SA"));
    }

    #[test]
    fn title_abbreviates_home() {
        let (_tmp, root) = tree();
        let (wm, _) = manager(GeneralConfig::default());
        let mut wm = wm.with_home(Some(PathBuf::from(&root)));
        let id = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        wm.pump(id).unwrap();
        assert_eq!(wm.title(id).unwrap(), "~/sub");
    }

    #[test]
    fn primary_selection_moves_between_windows() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let a = wm.open_dir(&root, None).unwrap();
        let b = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        wm.pump_all();

        assert_eq!(
            wm.session(a).unwrap().selection_state(),
            SelectionState::Insensitive
        );
        assert!(wm.select(a, "a.txt").unwrap());
        assert_eq!(wm.session(a).unwrap().selection_state(), SelectionState::Normal);

        assert!(wm.select(b, "inner").unwrap());
        assert_eq!(wm.session(b).unwrap().selection_state(), SelectionState::Normal);
        assert_eq!(
            wm.session(a).unwrap().selection_state(),
            SelectionState::Insensitive
        );
        assert!(!wm.select(b, "missing").unwrap());
    }

    #[test]
    fn selection_text_formats() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();
        wm.select(id, "b.txt").unwrap();
        wm.select(id, "a.txt").unwrap();

        assert_eq!(
            wm.selection_text(id, SelectionTarget::Text).unwrap(),
            format!("{root}/a.txt {root}/b.txt")
        );
        assert_eq!(
            wm.selection_text(id, SelectionTarget::UriList).unwrap(),
            format!("file://box{root}/a.txt file://box{root}/b.txt")
        );
        assert_eq!(
            wm.selected_paths(id).unwrap(),
            vec![
                PathBuf::from(format!("{root}/a.txt")),
                PathBuf::from(format!("{root}/b.txt"))
            ]
        );
    }

    #[test]
    fn target_callback_fires_once() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();

        let picked = Arc::new(Mutex::new(None));
        let sink = picked.clone();
        wm.set_target(
            id,
            Box::new(move |_: SessionId, entry: &Arc<DirEntry>| {
                *sink.lock() = Some(entry.leafname().to_string());
            }),
        )
        .unwrap();

        assert_eq!(wm.activate(id, "a.txt").unwrap(), OpenOutcome::Picked);
        assert_eq!(picked.lock().as_deref(), Some("a.txt"));
        assert!(!wm.session(id).unwrap().has_target());

        assert_eq!(
            wm.activate(id, "a.txt").unwrap(),
            OpenOutcome::Launch(PathBuf::from(&root).join("a.txt"))
        );
        assert_eq!(wm.activate(id, "sub").unwrap(), OpenOutcome::Navigated);
        assert_eq!(wm.session(id).unwrap().sym_path(), format!("{root}/sub"));
        assert!(wm.activate(id, "nope").is_err());
    }

    #[test]
    fn thumbnails_are_queued_and_drained() {
        let (tmp, root) = tree();
        fs::write(tmp.path().join("pic.png"), b"png").unwrap();
        fs::write(tmp.path().join("pic2.jpg"), b"jpg").unwrap();
        let (mut wm, _) = manager(GeneralConfig {
            show_thumbs: true,
            ..GeneralConfig::default()
        });
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();

        let session = wm.session(id).unwrap();
        assert!(session.thumbs_running());
        assert_eq!(session.thumb_progress().total, 2);

        let first = wm.next_thumb(id).unwrap().unwrap();
        assert_eq!((first.done, first.total), (0, 2));
        let second = wm.next_thumb(id).unwrap().unwrap();
        assert_eq!(second.fraction(), 0.5);
        assert_eq!(wm.next_thumb(id).unwrap(), None);
        assert!(!wm.session(id).unwrap().thumbs_running());

        // The thumbnails were recorded, so reopening queues nothing.
        let again = wm.open_dir(&root, None).unwrap();
        wm.pump(again).unwrap();
        assert_eq!(wm.session(again).unwrap().thumb_progress().total, 0);
    }

    #[test]
    fn navigation_cancels_thumbnails() {
        let (tmp, root) = tree();
        fs::write(tmp.path().join("pic.png"), b"png").unwrap();
        let (mut wm, _) = manager(GeneralConfig {
            show_thumbs: true,
            ..GeneralConfig::default()
        });
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();
        assert_eq!(wm.session(id).unwrap().thumb_progress().total, 1);

        wm.change_to(id, &format!("{root}/sub"), None).unwrap();
        assert_eq!(wm.session(id).unwrap().thumb_progress().total, 0);
        assert_eq!(wm.next_thumb(id).unwrap(), None);
    }

    #[test]
    fn groups_save_and_restore() {
        let (tmp, root) = tree();
        let file = tmp.path().join("conf").join("Groups.xml");
        let (wm, notes) = manager(GeneralConfig::default());
        let mut wm = wm.with_groups(GroupStore::new(), Some(file.clone()));
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();
        wm.select(id, "a.txt").unwrap();
        wm.select(id, "sub").unwrap();
        wm.group_save(id, "1").unwrap();
        assert!(file.exists());

        wm.change_to(id, &format!("{root}/sub"), None).unwrap();
        wm.pump(id).unwrap();
        fs::remove_file(tmp.path().join("a.txt")).unwrap();

        wm.group_restore(id, "1").unwrap();
        wm.pump(id).unwrap();
        let session = wm.session(id).unwrap();
        assert_eq!(session.sym_path(), root);
        assert_eq!(session.selected(), vec!["sub"]);

        assert!(matches!(
            wm.group_restore(id, "9"),
            Err(CoreError::UnknownGroup(_))
        ));
        assert_eq!(notes.last().as_deref(), Some("Group 9 is not set"));
        assert_eq!(GroupStore::load(&file).get("1").unwrap().items, vec!["a.txt", "sub"]);
    }

    #[test]
    fn group_restore_in_place_selects_now() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let id = wm.open_dir(&root, None).unwrap();
        wm.pump(id).unwrap();
        wm.select(id, "b.txt").unwrap();
        wm.group_save(id, "x").unwrap();
        wm.clear_selection(id).unwrap();

        wm.group_restore(id, "x").unwrap();
        assert_eq!(wm.session(id).unwrap().selected(), vec!["b.txt"]);
    }

    #[test]
    fn close_recursive_closes_subtree() {
        let (_tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let top = wm.open_dir(&root, None).unwrap();
        let sub = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        let elsewhere = TempDir::new().unwrap();
        let other = wm
            .open_dir(&elsewhere.path().to_string_lossy(), None)
            .unwrap();

        assert_eq!(wm.close_recursive(Path::new(&format!("{root}/sub"))), 1);
        assert!(wm.session(sub).is_none());
        assert_eq!(wm.close_recursive(Path::new(&root)), 1);
        assert!(wm.session(top).is_none());
        assert!(wm.session(other).is_some());
    }

    #[test]
    fn check_mounted_rescans_windows_below() {
        let (tmp, root) = tree();
        let (mut wm, _) = manager(GeneralConfig::default());
        let sub = wm.open_dir(&format!("{root}/sub"), None).unwrap();
        wm.pump(sub).unwrap();

        fs::write(tmp.path().join("sub").join("mounted"), "m").unwrap();
        wm.check_mounted(Path::new(&root));
        wm.pump(sub).unwrap();
        assert_eq!(leaves(&wm, sub), vec!["inner", "mounted"]);
    }

    #[test]
    fn unknown_window_is_an_error() {
        let (mut wm, _) = manager(GeneralConfig::default());
        assert!(matches!(
            wm.change_to(SessionId(42), "/", None),
            Err(CoreError::UnknownSession(42))
        ));
        assert!(wm.title(SessionId(42)).is_err());
    }
}
