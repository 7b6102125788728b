//! Coalesced download counters.
//!
//! Incrementing the catalog row on every download would hot-spot the
//! writer; completed downloads instead bump an in-memory map that a
//! background task flushes every few seconds (and once more on shutdown).
//! Counters stay monotonic — a crash loses at most one flush window.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use zg_catalog::Catalog;

/// Flush interval for the background task.
pub const FLUSH_INTERVAL_SECS: u64 = 5;

#[derive(Default)]
pub struct DownloadCoalescer {
    pending: Mutex<HashMap<(String, String, String), i64>>,
}

impl DownloadCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed download.
    pub fn record(&self, owner: &str, repo: &str, tag: &str) {
        let mut pending = self.pending.lock();
        *pending
            .entry((owner.to_owned(), repo.to_owned(), tag.to_owned()))
            .or_insert(0) += 1;
    }

    /// Take the accumulated increments, leaving the map empty.
    fn drain(&self) -> HashMap<(String, String, String), i64> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Apply all pending increments to the catalog. Failed rows are
    /// re-queued so the counts are not lost.
    pub fn flush(&self, catalog: &Catalog) {
        let drained = self.drain();
        for ((owner, repo, tag), count) in drained {
            if let Err(e) = catalog.increment_download_count(&owner, &repo, &tag, count) {
                tracing::warn!(
                    package = %format!("{owner}/{repo}"),
                    tag = %tag,
                    error = %e,
                    "download-count flush failed, re-queueing"
                );
                let mut pending = self.pending.lock();
                *pending.entry((owner, repo, tag)).or_insert(0) += count;
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Spawn the periodic flush loop.
pub fn spawn_flush_task(coalescer: Arc<DownloadCoalescer>, catalog: Arc<Catalog>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(FLUSH_INTERVAL_SECS));
        loop {
            interval.tick().await;
            coalescer.flush(&catalog);
        }
    });
}
