//! In-flight call registry.
//!
//! Tracks the cancellation handle of every executing call. Calls with dedup
//! enabled are indexed by their key; registering a second call under a live
//! key cancels the first (most recent call wins).

use crate::cancel::{CancelHandle, CancelReason};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct InFlightEntry {
    pub key: String,
    pub handle: CancelHandle,
    pub created_at: Instant,
    pub dedup: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    entries: HashMap<u64, InFlightEntry>,
    by_key: HashMap<String, u64>,
}

/// Process-wide table of executing calls. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a call. With `dedup`, a live entry under the same key is
    /// cancelled with [`CancelReason::Superseded`] and replaced.
    ///
    /// The entry is removed when the returned guard drops.
    pub fn register(&self, key: &str, dedup: bool, handle: CancelHandle) -> InFlightGuard {
        let mut inner = self.lock();

        if dedup {
            if let Some(prev_id) = inner.by_key.remove(key) {
                if let Some(prev) = inner.entries.remove(&prev_id) {
                    debug!(
                        dedup_key = key,
                        age_ms = prev.created_at.elapsed().as_millis(),
                        "superseding in-flight request"
                    );
                    prev.handle.cancel_with(CancelReason::Superseded);
                }
            }
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.insert(
            id,
            InFlightEntry {
                key: key.to_string(),
                handle: handle.clone(),
                created_at: Instant::now(),
                dedup,
            },
        );
        if dedup {
            inner.by_key.insert(key.to_string(), id);
        }

        InFlightGuard {
            registry: self.clone(),
            id,
            handle,
        }
    }

    fn release(&self, id: u64) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.remove(&id) {
            if inner.by_key.get(&entry.key) == Some(&id) {
                inner.by_key.remove(&entry.key);
            }
        }
    }

    /// Cancel every live entry registered under `key`. Returns how many fired.
    pub fn cancel(&self, key: &str, reason: CancelReason) -> usize {
        let inner = self.lock();
        inner
            .entries
            .values()
            .filter(|e| e.key == key)
            .map(|e| e.handle.cancel_with(reason))
            .count()
    }

    /// Cancel every live entry. Returns how many fired.
    pub fn cancel_all(&self, reason: CancelReason) -> usize {
        let inner = self.lock();
        for entry in inner.entries.values() {
            entry.handle.cancel_with(reason);
        }
        inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.values().any(|e| e.key == key)
    }

    /// Keys of live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().entries.values().map(|e| e.key.clone()).collect();
        keys.sort();
        keys
    }
}

/// Removes its registry entry on drop, whatever the call's outcome.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    id: u64,
    handle: CancelHandle,
}

impl InFlightGuard {
    pub fn handle(&self) -> &CancelHandle {
        &self.handle
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_supersedes_previous() {
        let reg = InFlightRegistry::new();
        let first = reg.register("GET_/events", true, CancelHandle::new());
        let second = reg.register("GET_/events", true, CancelHandle::new());

        assert_eq!(first.handle().reason(), Some(CancelReason::Superseded));
        assert!(!second.handle().is_cancelled());
        assert_eq!(reg.len(), 1);

        // The superseded call settling must not drop the newer entry.
        drop(first);
        assert!(reg.contains("GET_/events"));
        drop(second);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_without_dedup_both_stay_live() {
        let reg = InFlightRegistry::new();
        let a = reg.register("POST_/orders", false, CancelHandle::new());
        let b = reg.register("POST_/orders", false, CancelHandle::new());
        assert!(!a.handle().is_cancelled());
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.cancel("POST_/orders", CancelReason::External), 2);
        assert!(b.handle().is_cancelled());
    }

    #[test]
    fn test_cancel_all() {
        let reg = InFlightRegistry::new();
        let a = reg.register("GET_/a", true, CancelHandle::new());
        let b = reg.register("GET_/b", true, CancelHandle::new());
        assert_eq!(reg.keys(), vec!["GET_/a".to_string(), "GET_/b".to_string()]);
        assert_eq!(reg.cancel_all(CancelReason::Shutdown), 2);
        assert_eq!(a.handle().reason(), Some(CancelReason::Shutdown));
        assert_eq!(b.handle().reason(), Some(CancelReason::Shutdown));
    }
}
