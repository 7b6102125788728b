//! Per-release publish serialization.
//!
//! Two uploads racing to the same `(owner, repo, tag)` must not interleave
//! blob ingest and catalog commit. Each key maps to a `Semaphore(1)`; the
//! loser of the race waits, then finds the version taken and 409s.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct PublishLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for PublishLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the exclusive lock for one release path. Hold the permit for
    /// the duration of store-and-commit — it auto-releases on drop.
    pub async fn acquire(&self, owner: &str, repo: &str, tag: &str) -> OwnedSemaphorePermit {
        let key = format!("{owner}/{repo}@{tag}");
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned()
            .await
            .expect("publish lock semaphore is never closed")
    }

    /// Number of tracked keys (for monitoring).
    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop entries whose permit is free (nothing in flight).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_acquire_release() {
        let map = PublishLockMap::new();
        let permit = map.acquire("alice", "widget", "1.0.0").await;
        drop(permit);
        let permit = map.acquire("alice", "widget", "1.0.0").await;
        drop(permit);
    }

    #[tokio::test]
    async fn different_releases_do_not_contend() {
        let map = PublishLockMap::new();
        let p1 = map.acquire("alice", "widget", "1.0.0").await;
        let p2 = map.acquire("alice", "widget", "1.1.0").await;
        assert_eq!(map.lock_count(), 2);
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn same_release_waits_for_the_holder() {
        let map = Arc::new(PublishLockMap::new());
        let p1 = map.acquire("alice", "widget", "1.0.0").await;

        let map2 = map.clone();
        let waiter = tokio::spawn(async move {
            let _p2 = map2.acquire("alice", "widget", "1.0.0").await;
            "acquired"
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(p1);
        assert_eq!(waiter.await.unwrap(), "acquired");
    }

    #[tokio::test]
    async fn prune_drops_only_idle_entries() {
        let map = PublishLockMap::new();
        let held = map.acquire("alice", "widget", "1.0.0").await;
        let released = map.acquire("alice", "widget", "2.0.0").await;
        drop(released);

        map.prune_idle();
        assert_eq!(map.lock_count(), 1);
        drop(held);
    }
}
