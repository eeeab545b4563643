//! Filesystem-backed [`DirectoryCache`].

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::dir::{AttachmentId, Directory, DirectoryCache, DirectoryHandle};
use crate::event::{DirAction, DirBatch};
use crate::fs::classify::StatInfo;
use crate::fs::entry::{DirEntry, EntryRecord};
use crate::fs::pool::{RestatJob, RestatPool};
use crate::fs::resolver::DirEntryResolver;
use crate::icons::IconHandle;

/// Restats in flight at once during a background scan.
pub const DEFAULT_WORKERS: usize = 4;

/// Where scans run.
#[derive(Debug, Clone, Default)]
pub enum ScanMode {
    /// On the calling thread, before `attach`/`update` return.
    #[default]
    Inline,
    /// On the runtime, with restats spread over a [`RestatPool`].
    Background(Handle),
}

/// Caches directories by canonical path and keeps their listings fresh.
///
/// Directories are held weakly: once no window has one open it is freed.
pub struct FsDirectoryCache {
    resolver: Arc<DirEntryResolver>,
    pool: Arc<RestatPool>,
    dirs: Mutex<HashMap<PathBuf, Weak<Directory>>>,
    mode: ScanMode,
    next_id: AtomicU64,
}

impl FsDirectoryCache {
    pub fn new(resolver: Arc<DirEntryResolver>) -> Self {
        Self {
            pool: Arc::new(RestatPool::new(resolver.clone(), DEFAULT_WORKERS)),
            resolver,
            dirs: Mutex::new(HashMap::new()),
            mode: ScanMode::Inline,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_mode(self, mode: ScanMode) -> Self {
        Self { mode, ..self }
    }

    #[must_use]
    pub fn with_workers(self, workers: usize) -> Self {
        Self {
            pool: Arc::new(RestatPool::new(self.resolver.clone(), workers)),
            ..self
        }
    }

    pub fn resolver(&self) -> &Arc<DirEntryResolver> {
        &self.resolver
    }

    /// Directories that are still alive.
    pub fn cached(&self) -> Vec<DirectoryHandle> {
        let mut dirs = self.dirs.lock();
        dirs.retain(|_, weak| weak.strong_count() > 0);
        dirs.values().filter_map(Weak::upgrade).collect()
    }

    fn start_scan(&self, dir: DirectoryHandle) {
        match &self.mode {
            ScanMode::Inline => scan_until_settled(&self.resolver, &dir),
            ScanMode::Background(handle) => {
                let pool = self.pool.clone();
                let _ = handle.spawn(async move { scan_in_background(&pool, &dir).await });
            }
        }
    }
}

impl DirectoryCache for FsDirectoryCache {
    fn lookup(&self, real_path: &Path) -> Option<DirectoryHandle> {
        match StatInfo::stat(real_path) {
            Ok(info) if info.is_dir() => {}
            Ok(_) => {
                tracing::debug!("not a directory: {}", real_path.display());
                return None;
            }
            Err(e) => {
                tracing::debug!("directory lookup failed for {}: {e}", real_path.display());
                self.dirs.lock().remove(real_path);
                return None;
            }
        }

        let mut dirs = self.dirs.lock();
        if let Some(dir) = dirs.get(real_path).and_then(Weak::upgrade) {
            return Some(dir);
        }
        let dir = Arc::new(Directory::new(real_path));
        dirs.insert(real_path.to_path_buf(), Arc::downgrade(&dir));
        Some(dir)
    }

    fn attach(&self, dir: &DirectoryHandle, tx: UnboundedSender<DirBatch>) -> AttachmentId {
        let id = AttachmentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!("attach {id} to {}", dir.path().display());
        if dir.subscribe(id, tx) {
            self.start_scan(dir.clone());
        }
        id
    }

    fn detach(&self, dir: &DirectoryHandle, id: AttachmentId) {
        if !dir.unsubscribe(id) {
            tracing::debug!("detach of unknown attachment {id}");
        }
    }

    fn update(&self, dir: &DirectoryHandle) {
        if dir.begin_scan() {
            self.start_scan(dir.clone());
        }
    }

    fn force_update_path(&self, path: &Path) {
        let (Some(parent), Some(leaf)) = (path.parent(), path.file_name()) else {
            return;
        };
        let parent = std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());

        for dir in self.cached() {
            if dir.path() != parent {
                continue;
            }
            let Some(entry) = dir.get(leaf) else {
                continue;
            };
            let parent_info = StatInfo::stat(dir.path()).ok();
            self.resolver
                .restat(&dir.path().join(leaf), &entry, parent_info.as_ref(), true);
            dir.broadcast(DirBatch::new(DirAction::Update, vec![entry]));
        }
    }

    fn refresh_dirs(&self, path: &Path) {
        for dir in self.cached() {
            if dir.path().starts_with(path) {
                self.update(&dir);
            }
        }
    }

    fn refresh_mounts(&self) -> bool {
        self.resolver.refresh_mounts()
    }
}

/// Scans until no further rescan has been requested.
fn scan_until_settled(resolver: &DirEntryResolver, dir: &Directory) {
    loop {
        resolver.begin_batch();
        let plan = plan_scan(dir);
        for pending in &plan.entries {
            let entry = &pending.entry;
            resolver.restat(&dir.path().join(entry.name()), entry, plan.parent.as_ref(), true);
        }
        finish_scan(dir, plan);
        if !dir.end_scan() {
            break;
        }
    }
}

/// Like [`scan_until_settled`], with the directory read on the blocking
/// pool and restats handed to `pool`.
async fn scan_in_background(pool: &RestatPool, dir: &DirectoryHandle) {
    loop {
        let reader = dir.clone();
        match tokio::task::spawn_blocking(move || plan_scan(&reader)).await {
            Ok(plan) => {
                let jobs = plan
                    .entries
                    .iter()
                    .map(|pending| {
                        let path = dir.path().join(pending.entry.name());
                        RestatJob::new(path, pending.entry.clone())
                            .with_parent(plan.parent)
                            .with_examine(true)
                    })
                    .collect();
                pool.run(jobs).await;
                finish_scan(dir, plan);
            }
            Err(e) => tracing::warn!("scan of {} failed: {e}", dir.path().display()),
        }
        if !dir.end_scan() {
            break;
        }
    }
}

/// An entry about to be restatted, with what it looked like before.
struct Pending {
    entry: Arc<DirEntry>,
    is_new: bool,
    before: (Arc<EntryRecord>, Option<IconHandle>),
}

struct ScanPlan {
    names: HashSet<OsString>,
    parent: Option<StatInfo>,
    entries: Vec<Pending>,
}

/// Reads the directory and pairs every name with its entry.
fn plan_scan(dir: &Directory) -> ScanPlan {
    let names = match read_names(dir.path()) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!("cannot scan {}: {e}", dir.path().display());
            HashSet::new()
        }
    };
    let parent = StatInfo::stat(dir.path()).ok();
    let entries = names
        .iter()
        .map(|name| {
            let existing = dir.get(name);
            let is_new = existing.is_none();
            let entry = existing.unwrap_or_else(|| Arc::new(DirEntry::from_os(name.clone())));
            let before = entry.snapshot();
            Pending {
                entry,
                is_new,
                before,
            }
        })
        .collect();
    ScanPlan {
        names,
        parent,
        entries,
    }
}

/// Stores new entries, drops vanished ones and broadcasts what changed.
fn finish_scan(dir: &Directory, plan: ScanPlan) {
    let mut added = Vec::new();
    let mut updated = Vec::new();
    for Pending {
        entry,
        is_new,
        before: (before, before_image),
    } in plan.entries
    {
        if is_new {
            added.push(entry);
            continue;
        }
        let (after, after_image) = entry.snapshot();
        let image_changed = match (&before_image, &after_image) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if *before != *after || image_changed {
            updated.push(entry);
        }
    }

    let removed: Vec<_> = {
        let mut entries = dir.entries.lock();
        for entry in &added {
            entries.insert(entry.name().to_os_string(), entry.clone());
        }
        let gone: Vec<OsString> = entries
            .keys()
            .filter(|name| !plan.names.contains(*name))
            .cloned()
            .collect();
        gone.iter().filter_map(|name| entries.remove(name)).collect()
    };

    tracing::debug!(
        "scanned {}: {} added, {} updated, {} removed",
        dir.path().display(),
        added.len(),
        updated.len(),
        removed.len()
    );

    for (action, mut items) in [
        (DirAction::Add, added),
        (DirAction::Update, updated),
        (DirAction::Remove, removed),
    ] {
        if !items.is_empty() {
            items.sort_by(|a, b| a.collation_key().cmp(b.collation_key()));
            dir.broadcast(DirBatch::new(action, items));
        }
    }
}

fn read_names(path: &Path) -> std::io::Result<HashSet<OsString>> {
    std::fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect()
}
