//! Things a window needs from the outside world.
//!
//! The controller talks to the user, the primary selection and the
//! thumbnail generator only through these traits, so a frontend can plug
//! in its own and tests can record what happened.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::icons::{IconCache, IconHandle};
use crate::window::session::SessionId;

/// Non-blocking user-visible messages.
pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
}

/// Sends messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }
}

/// The primary selection. At most one window owns it at a time.
pub trait SelectionOwner: Send + Sync {
    /// Tries to make `id` the owner. `false` if the claim was refused.
    fn claim(&self, id: SessionId) -> bool;

    /// Gives up ownership if `id` holds it.
    fn release(&self, id: SessionId);

    fn owner(&self) -> Option<SessionId>;
}

/// In-process selection: every claim succeeds.
#[derive(Debug, Default)]
pub struct LocalSelection {
    owner: Mutex<Option<SessionId>>,
}

impl LocalSelection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionOwner for LocalSelection {
    fn claim(&self, id: SessionId) -> bool {
        *self.owner.lock() = Some(id);
        true
    }

    fn release(&self, id: SessionId) {
        let mut owner = self.owner.lock();
        if *owner == Some(id) {
            *owner = None;
        }
    }

    fn owner(&self) -> Option<SessionId> {
        *self.owner.lock()
    }
}

/// Produces a thumbnail for one image file.
pub trait Thumbnailer: Send + Sync {
    fn generate(&self, path: &Path) -> Option<IconHandle>;
}

/// Loads the image itself through the icon cache, which also records
/// the result so the file is not queued again.
pub struct IconThumbnailer {
    icons: Arc<dyn IconCache>,
}

impl IconThumbnailer {
    pub fn new(icons: Arc<dyn IconCache>) -> Self {
        Self { icons }
    }
}

impl Thumbnailer for IconThumbnailer {
    fn generate(&self, path: &Path) -> Option<IconHandle> {
        self.icons.lookup_by_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::FsIconCache;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn local_selection_has_one_owner() {
        let sel = LocalSelection::new();
        assert!(sel.claim(SessionId(1)));
        assert!(sel.claim(SessionId(2)));
        assert_eq!(sel.owner(), Some(SessionId(2)));

        sel.release(SessionId(1));
        assert_eq!(sel.owner(), Some(SessionId(2)));
        sel.release(SessionId(2));
        assert_eq!(sel.owner(), None);
    }

    #[test]
    fn icon_thumbnailer_records_in_cache() {
        let tmp = TempDir::new().unwrap();
        let image = tmp.path().join("pic.png");
        fs::write(&image, b"png").unwrap();

        let icons = Arc::new(FsIconCache::new());
        let thumbs = IconThumbnailer::new(icons.clone());
        assert!(!icons.lookup_only_new(&image).1);
        assert!(thumbs.generate(&image).is_some());
        assert!(icons.lookup_only_new(&image).1);
    }
}
