//! Change notifications from the directory cache to windows.
//!
//! The cache pushes [`DirBatch`]es down a channel for each attached window.
//! Within one scan, `StartScan` always comes before any `Add`/`Update` for
//! that scan and `EndScan` always comes last.

use std::sync::Arc;

use crate::fs::entry::DirEntry;

/// What happened to the entries in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirAction {
    /// Names that appeared (or that a newly attached window hasn't seen).
    Add,
    /// Names that disappeared from the listing.
    Remove,
    /// Existing entries whose record was replaced.
    Update,
    /// A scan of the directory began.
    StartScan,
    /// The scan finished; the listing is complete.
    EndScan,
}

/// One ordered group of affected entries.
#[derive(Debug, Clone)]
pub struct DirBatch {
    pub action: DirAction,
    pub items: Vec<Arc<DirEntry>>,
}

impl DirBatch {
    pub fn new(action: DirAction, items: Vec<Arc<DirEntry>>) -> Self {
        Self { action, items }
    }

    /// A batch with no entries (`StartScan`/`EndScan`).
    pub fn marker(action: DirAction) -> Self {
        Self::new(action, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_has_no_items() {
        let batch = DirBatch::marker(DirAction::StartScan);
        assert_eq!(batch.action, DirAction::StartScan);
        assert!(batch.is_empty());
    }

    #[test]
    fn batch_keeps_item_order() {
        let items = vec![Arc::new(DirEntry::new("b")), Arc::new(DirEntry::new("a"))];
        let batch = DirBatch::new(DirAction::Add, items);
        let names: Vec<_> = batch.items.iter().map(|e| e.leafname()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
