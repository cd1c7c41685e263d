//! Shared actor directory
//!
//! One table per cluster, created by the bootstrap before any worker starts
//! and shared with every worker by handle. Maps actor path → owner worker
//! id. An entry pins on first write and leaves only when the owning worker
//! explicitly removes it.
//!
//! Capacity is fixed at bootstrap. A full table drops new registrations:
//! lookups for the dropped path miss and placement falls back to the ring,
//! so the cluster degrades instead of failing.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

pub struct Directory {
    capacity: usize,
    entries: RwLock<HashMap<String, u32>>,
}

impl Directory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, u32>> {
        self.entries.read().expect("directory lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, u32>> {
        self.entries.write().expect("directory lock poisoned")
    }

    /// Write `path → worker`. Re-registering an existing path overwrites,
    /// which makes the call idempotent for a stable owner. A new path on a
    /// full table is dropped.
    pub fn register(&self, path: &str, worker: u32) {
        let mut entries = self.write();
        if !entries.contains_key(path) && entries.len() >= self.capacity {
            warn!(path, worker, capacity = self.capacity, "directory full, dropping registration");
            return;
        }
        entries.insert(path.to_string(), worker);
    }

    pub fn lookup(&self, path: &str) -> Option<u32> {
        self.read().get(path).copied()
    }

    pub fn has(&self, path: &str) -> bool {
        self.read().contains_key(path)
    }

    pub fn remove(&self, path: &str) {
        self.write().remove(path);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
