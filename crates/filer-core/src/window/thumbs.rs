//! Per-window thumbnail queue.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// How far the thumbnail pump has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbProgress {
    pub done: usize,
    pub total: usize,
}

impl ThumbProgress {
    /// `done / total`, or `0.0` for an empty run.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.done as f32 / self.total as f32
        }
    }
}

/// FIFO of image paths waiting for a thumbnail.
///
/// `total` counts everything queued since the last cancel, so progress
/// keeps growing as more files are added mid-run.
#[derive(Debug, Default)]
pub struct ThumbnailQueue {
    pending: VecDeque<PathBuf>,
    total: usize,
    running: bool,
}

impl ThumbnailQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.total += 1;
        self.pending.push_back(path.into());
    }

    /// Takes the next path, with the progress made before it.
    pub fn pop(&mut self) -> Option<(PathBuf, ThumbProgress)> {
        let progress = self.progress();
        self.pending.pop_front().map(|path| (path, progress))
    }

    /// Drops everything queued and stops the pump.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.total = 0;
        self.running = false;
    }

    pub fn progress(&self) -> ThumbProgress {
        ThumbProgress {
            done: self.total - self.pending.len(),
            total: self.total,
        }
    }

    /// Starts the pump. `false` if it was already running.
    pub fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.running, true)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.pending.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
