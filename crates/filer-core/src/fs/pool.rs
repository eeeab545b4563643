//! Background restat workers.
//!
//! Restats block on filesystem calls, so they run on tokio's blocking pool
//! and never on the thread that reads entries for display.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::fs::classify::StatInfo;
use crate::fs::entry::DirEntry;
use crate::fs::resolver::DirEntryResolver;

/// One entry to refresh.
#[derive(Debug, Clone)]
pub struct RestatJob {
    pub path: PathBuf,
    pub entry: Arc<DirEntry>,
    pub parent: Option<StatInfo>,
    pub examine: bool,
}

impl RestatJob {
    pub fn new(path: impl Into<PathBuf>, entry: Arc<DirEntry>) -> Self {
        Self {
            path: path.into(),
            entry,
            parent: None,
            examine: false,
        }
    }

    #[must_use]
    pub fn with_parent(self, parent: Option<StatInfo>) -> Self {
        Self { parent, ..self }
    }

    #[must_use]
    pub fn with_examine(self, examine: bool) -> Self {
        Self { examine, ..self }
    }
}

/// Runs restat jobs with at most `workers` in flight.
pub struct RestatPool {
    resolver: Arc<DirEntryResolver>,
    workers: usize,
}

impl RestatPool {
    pub fn new(resolver: Arc<DirEntryResolver>, workers: usize) -> Self {
        Self {
            resolver,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Restats every job and returns the entries in job order once all are
    /// published. The "recent" reference is refreshed once for the batch.
    pub async fn run(&self, jobs: Vec<RestatJob>) -> Vec<Arc<DirEntry>> {
        self.resolver.begin_batch();
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let resolver = self.resolver.clone();
            let permits = permits.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let entry = job.entry.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    resolver.restat(&job.path, &job.entry, job.parent.as_ref(), job.examine);
                })
                .await;
                if let Err(e) = joined {
                    tracing::warn!("restat worker failed for {}: {e}", entry.leafname());
                }
                entry
            }));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("restat task failed: {e}"),
            }
        }
        entries
    }
}
