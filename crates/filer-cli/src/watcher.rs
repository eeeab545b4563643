//! Filesystem watcher that tells the main loop which directory to rescan.
//!
//! Uses [`notify`] with debouncing. Only direct children of watched
//! directories are reported.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};

/// Messages from the watcher to the main loop.
#[derive(Debug)]
pub enum WatchMessage {
    /// Something changed in these directories.
    Changed(Vec<PathBuf>),
    /// An error occurred while watching.
    Error(String),
}

/// Watches directories for changes with debouncing.
pub struct DirWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher>,
    watched: BTreeSet<PathBuf>,
}

impl DirWatcher {
    /// Creates a watcher that sends messages through `tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying notify watcher cannot be initialised.
    pub fn new(tx: Sender<WatchMessage>) -> anyhow::Result<Self> {
        let debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match result {
                    Ok(events) => {
                        let dirs: BTreeSet<PathBuf> = events
                            .iter()
                            .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                            .filter_map(|e| e.path.parent().map(Path::to_path_buf))
                            .collect();
                        if !dirs.is_empty() {
                            let _ = tx.send(WatchMessage::Changed(dirs.into_iter().collect()));
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(WatchMessage::Error(format!("{e}")));
                    }
                }
            },
        )?;

        Ok(Self {
            debouncer,
            watched: BTreeSet::new(),
        })
    }

    /// Starts watching `dir`. Watching the same directory twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched.
    pub fn watch(&mut self, dir: &Path) -> anyhow::Result<()> {
        if self.watched.contains(dir) {
            return Ok(());
        }
        self.debouncer
            .watcher()
            .watch(dir, notify::RecursiveMode::NonRecursive)?;
        self.watched.insert(dir.to_path_buf());
        Ok(())
    }

    pub fn unwatch(&mut self, dir: &Path) {
        if self.watched.remove(dir) {
            let _ = self.debouncer.watcher().unwatch(dir);
        }
    }

    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }
}
