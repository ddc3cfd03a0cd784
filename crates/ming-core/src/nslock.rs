//! In-memory namespace locking
//!
//! A namespace lock covers a bucket and a set of object names. Each
//! `(bucket, object)` resource maps to a reference-counted reader/writer lock
//! that is created on first use and removed when the last holder or waiter
//! goes away. Multi-object locks take their resources in sorted order, so two
//! overlapping acquisitions can never wait on each other in a cycle.

use crate::{ObjectLayerError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

/// Lock mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of shared holders, no exclusive holder
    Shared,
    /// A single holder
    Exclusive,
}

struct LockEntry {
    lock: Arc<RwLock<()>>,
    refs: usize,
}

#[derive(Default)]
struct LockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl LockTable {
    fn reference(self: &Arc<Self>, resource: &str) -> ResourceRef {
        let mut entries = self.entries.lock();
        let entry = entries.entry(resource.to_string()).or_insert_with(|| LockEntry {
            lock: Arc::new(RwLock::new(())),
            refs: 0,
        });
        entry.refs += 1;
        ResourceRef {
            table: Arc::clone(self),
            resource: resource.to_string(),
            lock: Arc::clone(&entry.lock),
        }
    }

    fn release(&self, resource: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(resource) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(resource);
            }
        }
    }
}

/// Counts one holder or waiter of a resource until dropped
struct ResourceRef {
    table: Arc<LockTable>,
    resource: String,
    lock: Arc<RwLock<()>>,
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        self.table.release(&self.resource);
    }
}

enum HeldGuard {
    Shared { _read: OwnedRwLockReadGuard<()> },
    Exclusive { _write: OwnedRwLockWriteGuard<()> },
}

// Field order matters: the guard is released before the reference count drops.
struct Held {
    _guard: HeldGuard,
    _reference: ResourceRef,
}

/// Process-local namespace lock map
#[derive(Clone, Default)]
pub struct NsLockMap {
    table: Arc<LockTable>,
}

impl NsLockMap {
    /// Create an empty lock map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a lock handle for a bucket and a set of objects.
    /// An empty object set locks the bucket itself.
    pub fn new_ns_lock(&self, bucket: &str, objects: &[&str]) -> NsLock {
        let mut resources: Vec<String> = if objects.is_empty() {
            vec![bucket.to_string()]
        } else {
            objects.iter().map(|object| format!("{bucket}/{object}")).collect()
        };
        resources.sort();
        resources.dedup();

        NsLock {
            table: Arc::clone(&self.table),
            resources,
        }
    }

    /// Acquire a lock, waiting until every resource is free
    pub async fn acquire(&self, bucket: &str, objects: &[&str], mode: LockMode) -> NsLockGuard {
        self.new_ns_lock(bucket, objects).lock(mode).await
    }

    /// Number of resources currently held or waited on
    pub fn active_resources(&self) -> usize {
        self.table.entries.lock().len()
    }
}

impl fmt::Debug for NsLockMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NsLockMap")
            .field("active_resources", &self.active_resources())
            .finish()
    }
}

/// Lock handle for one bucket/object-set scope
pub struct NsLock {
    table: Arc<LockTable>,
    resources: Vec<String>,
}

impl NsLock {
    /// Resources covered by this lock, in acquisition order
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Wait for the lock. Dropping the returned guard releases it.
    pub async fn lock(&self, mode: LockMode) -> NsLockGuard {
        let mut held = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let reference = self.table.reference(resource);
            let guard = match mode {
                LockMode::Shared => HeldGuard::Shared {
                    _read: Arc::clone(&reference.lock).read_owned().await,
                },
                LockMode::Exclusive => HeldGuard::Exclusive {
                    _write: Arc::clone(&reference.lock).write_owned().await,
                },
            };
            trace!(resource = %resource, ?mode, "namespace lock acquired");
            held.push(Held {
                _guard: guard,
                _reference: reference,
            });
        }
        NsLockGuard { mode, held }
    }

    /// Wait for the lock at most `timeout`
    pub async fn lock_timeout(&self, mode: LockMode, timeout: Duration) -> Result<NsLockGuard> {
        tokio::time::timeout(timeout, self.lock(mode))
            .await
            .map_err(|_| ObjectLayerError::LockTimeout {
                resource: self.resources.join(","),
                millis: timeout.as_millis(),
            })
    }
}

impl fmt::Debug for NsLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NsLock").field("resources", &self.resources).finish()
    }
}

/// Held namespace lock, released on drop
pub struct NsLockGuard {
    mode: LockMode,
    held: Vec<Held>,
}

impl NsLockGuard {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Number of resources held
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl fmt::Debug for NsLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NsLockGuard")
            .field("mode", &self.mode)
            .field("resources", &self.held.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_exclusive_blocks_until_release() {
        let map = NsLockMap::new();
        let first = map.acquire("bucketA", &["obj1"], LockMode::Exclusive).await;

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let map = map.clone();
            let acquired = Arc::clone(&acquired);
            tokio::spawn(async move {
                let _guard = map.acquire("bucketA", &["obj1"], LockMode::Exclusive).await;
                acquired.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        waiter.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let map = NsLockMap::new();
        let lock = map.new_ns_lock("bucketA", &["obj1"]);
        let first = lock.lock(LockMode::Shared).await;

        let second = map
            .new_ns_lock("bucketA", &["obj1"])
            .lock_timeout(LockMode::Shared, Duration::from_millis(100))
            .await;
        assert!(second.is_ok());
        drop(first);
    }

    #[tokio::test]
    async fn test_shared_excludes_exclusive() {
        let map = NsLockMap::new();
        let _reader = map.acquire("bucketA", &["obj1"], LockMode::Shared).await;

        let writer = map
            .new_ns_lock("bucketA", &["obj1"])
            .lock_timeout(LockMode::Exclusive, Duration::from_millis(30))
            .await;
        assert!(matches!(writer, Err(ObjectLayerError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn test_disjoint_objects_do_not_conflict() {
        let map = NsLockMap::new();
        let _a = map.acquire("bucketA", &["obj1"], LockMode::Exclusive).await;
        let b = map
            .new_ns_lock("bucketA", &["obj2"])
            .lock_timeout(LockMode::Exclusive, Duration::from_millis(100))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_entries_removed_after_release() {
        let map = NsLockMap::new();
        {
            let guard = map.acquire("bucketA", &["obj1", "obj2"], LockMode::Exclusive).await;
            assert_eq!(guard.len(), 2);
            assert_eq!(map.active_resources(), 2);
        }
        assert_eq!(map.active_resources(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_no_entry() {
        let map = NsLockMap::new();
        let holder = map.acquire("bucketA", &["obj1"], LockMode::Exclusive).await;

        let result = map
            .new_ns_lock("bucketA", &["obj1"])
            .lock_timeout(LockMode::Exclusive, Duration::from_millis(20))
            .await;
        assert!(result.is_err());
        assert_eq!(map.active_resources(), 1);

        drop(holder);
        assert_eq!(map.active_resources(), 0);
    }

    #[test]
    fn test_resources_sorted_and_deduplicated() {
        let map = NsLockMap::new();
        let lock = map.new_ns_lock("b", &["z", "a", "z"]);
        assert_eq!(lock.resources(), &["b/a".to_string(), "b/z".to_string()]);

        let bucket_lock = map.new_ns_lock("b", &[]);
        assert_eq!(bucket_lock.resources(), &["b".to_string()]);
    }

    #[tokio::test]
    async fn test_overlapping_sets_do_not_deadlock() {
        let map = NsLockMap::new();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let map = map.clone();
            tasks.push(tokio::spawn(async move {
                let objects: [&str; 2] = if i % 2 == 0 { ["x", "y"] } else { ["y", "x"] };
                for _ in 0..20 {
                    let _guard = map.acquire("bucket", &objects, LockMode::Exclusive).await;
                    tokio::task::yield_now().await;
                }
            }));
        }

        let all = futures_join(tasks);
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("lock acquisition deadlocked");
        assert_eq!(map.active_resources(), 0);
    }

    async fn futures_join(tasks: Vec<tokio::task::JoinHandle<()>>) {
        for task in tasks {
            task.await.unwrap();
        }
    }
}
