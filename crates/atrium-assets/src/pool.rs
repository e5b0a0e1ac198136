//! Deduplicating, reference-counted registry of decoded resources.
//!
//! At most one entry exists per cache key, and the pool alone decides when
//! a resource is disposed: exactly on the 1 -> 0 ref count transition.
//! Concurrent loads of the same key are coalesced through in-flight slots
//! so at most one fetch/decode runs per key at a time.
//!
//! Loading is claimed through an RAII guard: a loader that is dropped
//! without publishing (its future cancelled at an await point) removes its
//! in-flight slot on the way out, so queued waiters observe a closed
//! channel, retry, and one of them becomes the new loader. Each slot also
//! carries a claim token, so a loader that survives `clear` and finishes
//! late publishes nothing into the pool and cannot disturb a newer load of
//! the same key.
//!
//! The lock is never held across an await point; every mutation is a single
//! synchronous critical section, which is what makes the check-and-claim in
//! `acquire` atomic under the cooperative scheduling model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::handle::{next_asset_id, AssetHandle, AssetId, Origin};
use crate::key::CacheKey;

/// Per-key lifecycle slot: either a load is in flight (with waiters queued
/// in enrollment order) or a ready, reference-counted resource.
enum Slot<T> {
    InFlight {
        /// Claim token of the loader that owns this slot.
        token: u64,
        waiters: Vec<oneshot::Sender<AssetHandle<T>>>,
    },
    Ready(PoolEntry<T>),
}

struct PoolEntry<T> {
    id: AssetId,
    origin: Origin,
    ref_count: usize,
    resource: Arc<T>,
}

/// Outcome of the synchronous check-and-claim step of an acquire.
pub(crate) enum Acquire<'a, T> {
    /// Cache hit; the ref count has already been bumped.
    Ready(AssetHandle<T>),
    /// Another load of this key is in flight; await the shared handle.
    /// Dropping the receiver (scene teardown) contributes no reference.
    Join(oneshot::Receiver<AssetHandle<T>>),
    /// The caller owns the load; publish through the guard.
    Load(LoadGuard<'a, T>),
}

/// Claim on an in-flight slot. `complete` publishes the loaded resource;
/// dropping the guard without completing abandons the slot so waiters can
/// retry. Either way the slot cannot leak.
pub(crate) struct LoadGuard<'a, T> {
    pool: &'a ResourcePool<T>,
    key: CacheKey,
    token: u64,
    done: bool,
}

impl<T> LoadGuard<'_, T> {
    /// Publish the loaded resource, resolving all waiters in enrollment
    /// order with handles to the identical data. Returns the loader's own
    /// handle.
    ///
    /// The entry's ref count is one (the loader) plus one per waiter still
    /// listening; waiters that dropped their receiver count for nothing.
    /// If the claim was superseded while the load ran (`clear` was called),
    /// nothing is published: the caller still gets a usable handle, but the
    /// pool and any newer load of the key are left untouched.
    pub fn complete(mut self, resource: T, origin: Origin) -> AssetHandle<T> {
        self.done = true;
        self.pool.publish(&self.key, self.token, resource, origin)
    }
}

impl<T> Drop for LoadGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            self.pool.abandon(&self.key, self.token);
        }
    }
}

pub(crate) struct ResourcePool<T> {
    slots: Mutex<HashMap<CacheKey, Slot<T>>>,
    next_token: AtomicU64,
}

impl<T> ResourcePool<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Check-and-claim for `key`. Ready entries are shared immediately;
    /// in-flight loads enroll the caller as a waiter; otherwise the caller
    /// becomes the loader for this key.
    pub fn acquire(&self, key: &CacheKey) -> Acquire<'_, T> {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(Slot::Ready(entry)) => {
                entry.ref_count += 1;
                debug!("pool hit for '{}' (refs: {})", key, entry.ref_count);
                Acquire::Ready(AssetHandle::new(
                    entry.id,
                    key.clone(),
                    entry.origin,
                    Arc::clone(&entry.resource),
                ))
            }
            Some(Slot::InFlight { waiters, .. }) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                debug!("joined in-flight load for '{}'", key);
                Acquire::Join(rx)
            }
            None => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                slots.insert(
                    key.clone(),
                    Slot::InFlight {
                        token,
                        waiters: Vec::new(),
                    },
                );
                Acquire::Load(LoadGuard {
                    pool: self,
                    key: key.clone(),
                    token,
                    done: false,
                })
            }
        }
    }

    fn publish(&self, key: &CacheKey, token: u64, resource: T, origin: Origin) -> AssetHandle<T> {
        let data = Arc::new(resource);
        let id = next_asset_id();
        let mut slots = self.slots.lock();

        let owns_slot = matches!(
            slots.get(key),
            Some(Slot::InFlight { token: t, .. }) if *t == token
        );
        if !owns_slot {
            // Superseded by a clear while the load ran. Hand the caller a
            // detached handle; releasing it later is a logged no-op.
            debug!("stale load of '{}' finished; not pooled", key);
            return AssetHandle::new(id, key.clone(), origin, data);
        }

        let waiters = match slots.remove(key) {
            Some(Slot::InFlight { waiters, .. }) => waiters,
            _ => unreachable!("slot ownership checked above"),
        };

        let mut ref_count = 1;
        for tx in waiters {
            let handle = AssetHandle::new(id, key.clone(), origin, Arc::clone(&data));
            if tx.send(handle).is_ok() {
                ref_count += 1;
            }
        }

        debug!("pooled '{}' ({:?}, refs: {})", key, origin, ref_count);
        slots.insert(
            key.clone(),
            Slot::Ready(PoolEntry {
                id,
                origin,
                ref_count,
                resource: Arc::clone(&data),
            }),
        );
        AssetHandle::new(id, key.clone(), origin, data)
    }

    /// Tear down an in-flight slot whose loader gave up without publishing.
    /// Dropping the waiter senders closes their channels; each waiter
    /// retries its acquire and one of them claims the load afresh.
    fn abandon(&self, key: &CacheKey, token: u64) {
        let mut slots = self.slots.lock();
        if matches!(
            slots.get(key),
            Some(Slot::InFlight { token: t, .. }) if *t == token
        ) {
            slots.remove(key);
            debug!("abandoned in-flight load for '{}'", key);
        }
    }

    /// Bump the ref count of an already-Ready entry. Used by instancing,
    /// which requires the base asset to be loaded first.
    pub fn retain(&self, key: &CacheKey) -> Option<AssetHandle<T>> {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(Slot::Ready(entry)) => {
                entry.ref_count += 1;
                Some(AssetHandle::new(
                    entry.id,
                    key.clone(),
                    entry.origin,
                    Arc::clone(&entry.resource),
                ))
            }
            _ => None,
        }
    }

    /// Drop one reference, identified by key and entry id. The entry is
    /// evicted exactly when the count reaches zero; a later acquire of the
    /// same key starts a fresh load rather than resurrecting the disposed
    /// entry. A release whose id no longer matches (its entry was cleared
    /// and the key reloaded) is a logged no-op, never a decrement of the
    /// newer entry. Returns true on eviction.
    pub fn release(&self, key: &CacheKey, id: AssetId) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(Slot::Ready(entry)) if entry.id == id => {
                entry.ref_count -= 1;
                if entry.ref_count == 0 {
                    slots.remove(key);
                    debug!("evicted '{}'", key);
                    true
                } else {
                    false
                }
            }
            _ => {
                warn!("release for unknown or superseded entry '{}'", key);
                false
            }
        }
    }

    /// Current ref count of a Ready entry.
    pub fn ref_count(&self, key: &CacheKey) -> Option<usize> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(entry)) => Some(entry.ref_count),
            _ => None,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Ready(_)))
    }

    /// Number of Ready entries.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Number of loads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::InFlight { .. }))
            .count()
    }

    /// Drop every slot, Ready and in-flight alike. Used for corruption
    /// recovery: future acquires start fresh loads. Outstanding handles
    /// keep their data alive through their `Arc`s; releasing them after a
    /// clear is a logged no-op. Dropped in-flight waiters observe a closed
    /// channel and re-acquire, and a cleared loader's late `complete`
    /// publishes nothing. Returns the number of Ready entries dropped.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let ready = slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count();
        slots.clear();
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::bare(s)
    }

    fn claim<'a>(pool: &'a ResourcePool<String>, k: &CacheKey) -> LoadGuard<'a, String> {
        match pool.acquire(k) {
            Acquire::Load(guard) => guard,
            _ => panic!("expected to claim the load"),
        }
    }

    fn join(pool: &ResourcePool<String>, k: &CacheKey) -> oneshot::Receiver<AssetHandle<String>> {
        match pool.acquire(k) {
            Acquire::Join(rx) => rx,
            _ => panic!("expected to join the in-flight load"),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let first = claim(&pool, &k).complete("pixels".to_string(), Origin::Fetched);

        let second = match pool.acquire(&k) {
            Acquire::Ready(handle) => handle,
            _ => panic!("expected a pool hit"),
        };
        assert!(first.shares_resource_with(&second));
        assert_eq!(pool.ref_count(&k), Some(2));
    }

    #[test]
    fn test_waiters_share_identity_and_count_once() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let guard = claim(&pool, &k);
        let mut rx_a = join(&pool, &k);
        let mut rx_b = join(&pool, &k);
        assert_eq!(pool.in_flight(), 1);

        let loader = guard.complete("pixels".to_string(), Origin::Fetched);
        let a = rx_a.try_recv().expect("waiter should be resolved");
        let b = rx_b.try_recv().expect("waiter should be resolved");

        assert!(loader.shares_resource_with(&a));
        assert!(loader.shares_resource_with(&b));
        assert_eq!(pool.ref_count(&k), Some(3));
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_dropped_waiter_contributes_no_reference() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let guard = claim(&pool, &k);
        let rx = join(&pool, &k);
        drop(rx); // scene torn down while the load was in flight

        guard.complete("pixels".to_string(), Origin::Fetched);
        assert_eq!(pool.ref_count(&k), Some(1));
    }

    #[test]
    fn test_cancelled_loader_unblocks_waiters() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let guard = claim(&pool, &k);
        let mut rx = join(&pool, &k);

        // The loading future is dropped at an await point without ever
        // publishing.
        drop(guard);

        // The waiter's channel is closed rather than silently pending, so
        // its retry loop runs, and the retry claims a fresh load instead of
        // joining a slot nobody owns.
        assert!(rx.try_recv().is_err());
        assert_eq!(pool.in_flight(), 0);
        let retry = claim(&pool, &k);
        let handle = retry.complete("pixels".to_string(), Origin::Fetched);
        assert_eq!(pool.ref_count(&k), Some(1));
        assert_eq!(handle.data(), "pixels");
    }

    #[test]
    fn test_stale_complete_does_not_disturb_a_newer_load() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let stale = claim(&pool, &k);
        pool.clear();

        // A fresh load of the same key starts after the clear, with a
        // waiter queued on it.
        let fresh = claim(&pool, &k);
        let mut rx = join(&pool, &k);

        // The stale loader finishes late: its caller still gets a usable
        // handle, but nothing is published and the new load is untouched.
        let stale_handle = stale.complete("old".to_string(), Origin::Fetched);
        assert_eq!(stale_handle.data(), "old");
        assert!(rx.try_recv().is_err()); // still pending, not hijacked
        assert!(!pool.contains(&k));

        let fresh_handle = fresh.complete("new".to_string(), Origin::Fetched);
        let waiter = rx.try_recv().expect("fresh load should resolve the waiter");
        assert!(fresh_handle.shares_resource_with(&waiter));
        assert!(!fresh_handle.shares_resource_with(&stale_handle));
        assert_eq!(pool.ref_count(&k), Some(2));

        // A release from the stale handle cannot evict the fresh entry.
        assert!(!pool.release(&k, stale_handle.id()));
        assert_eq!(pool.ref_count(&k), Some(2));
    }

    #[test]
    fn test_release_evicts_exactly_on_zero() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let handle = claim(&pool, &k).complete("pixels".to_string(), Origin::Fetched);
        pool.retain(&k).expect("entry should be ready");
        pool.retain(&k).expect("entry should be ready");
        assert_eq!(pool.ref_count(&k), Some(3));

        assert!(!pool.release(&k, handle.id()));
        assert!(!pool.release(&k, handle.id()));
        assert!(pool.contains(&k));
        assert!(pool.release(&k, handle.id()));
        assert!(!pool.contains(&k));
    }

    #[test]
    fn test_reacquire_after_eviction_starts_fresh() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let first = claim(&pool, &k).complete("pixels".to_string(), Origin::Fetched);
        pool.release(&k, first.id());

        // Fresh cycle: the pool asks the caller to load again and the new
        // entry is a different resource with a different id.
        let second = claim(&pool, &k).complete("pixels".to_string(), Origin::Fetched);
        assert!(!first.shares_resource_with(&second));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_retain_requires_ready_entry() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");
        assert!(pool.retain(&k).is_none());

        let guard = claim(&pool, &k);
        // Still in flight, not ready.
        assert!(pool.retain(&k).is_none());
        drop(guard);
    }

    #[test]
    fn test_clear_drops_everything_but_handles_stay_usable() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let handle = claim(&pool, &k).complete("pixels".to_string(), Origin::Fetched);

        assert_eq!(pool.clear(), 1);
        assert!(!pool.contains(&k));
        // The handle's data survives the clear; releasing it is a no-op.
        assert_eq!(handle.data(), "pixels");
        assert!(!pool.release(&k, handle.id()));
        // A fresh acquire starts a new load cycle.
        assert!(matches!(pool.acquire(&k), Acquire::Load(_)));
    }

    #[test]
    fn test_clear_closes_in_flight_waiters() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let k = key("brick");

        let guard = claim(&pool, &k);
        let mut rx = join(&pool, &k);
        pool.clear();
        drop(guard);
        // The waiter sees a closed channel and re-acquires from scratch.
        assert!(rx.try_recv().is_err());
        assert!(matches!(pool.acquire(&k), Acquire::Load(_)));
    }
}
