//! The entry store collaborator boundary (§6) and a reference in-memory
//! implementation (§2 component 15 / SPEC_FULL §6 "Reference store").
//!
//! The teacher's `CacheManager::put` takes a raw callback baked into the
//! trait object; per the Design Notes' explicit instruction this crate
//! instead models a read-modify-write as a bounded compare-and-swap loop
//! returning [`UpdateOutcome::Committed`] or [`UpdateOutcome::Conflict`],
//! so no lambda is captured into an arbitrary store-internal lifetime.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::entry::CacheEntry;
use crate::error::{CacheCoreError, Result};

/// What an [`EntryStore::update`] callback wants to happen to the entry
/// currently stored at a key (or absent).
#[derive(Debug)]
pub enum UpdateAction {
    /// Store `CacheEntry` as the new value.
    Replace(Box<CacheEntry>),
    /// Remove any entry at this key.
    Remove,
    /// Leave the store unchanged (used when the callback decides, having
    /// seen the current value, that no update is needed).
    NoChange,
}

/// The result of an [`EntryStore::update`] call.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The update committed. Carries the entry now stored, if any.
    Committed(Option<CacheEntry>),
    /// The retry budget was exhausted without a clean compare-and-swap.
    Conflict,
}

/// The shared source of truth for cache entries. Implementations must
/// provide linearizable `get`/`put`/`remove`/`update` per key (§5).
#[async_trait]
pub trait EntryStore: Send + Sync + 'static {
    /// The entry currently stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Unconditionally stores `entry` at `key`, replacing any prior value.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Removes any entry stored at `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Read-modify-write with per-key atomicity, bounded by `max_retries`.
    /// `f` receives the entry currently stored (if any) and decides the
    /// next state; it may be called more than once if the store must
    /// retry under contention.
    async fn update(
        &self,
        key: &str,
        max_retries: usize,
        f: Box<dyn for<'a> Fn(Option<&'a CacheEntry>) -> UpdateAction + Send + Sync>,
    ) -> Result<UpdateOutcome>;
}

/// An in-memory [`EntryStore`] backed by `dashmap`, used by this crate's own
/// tests and doctests. Not a production storage backend -- the Non-goals
/// exclude shipping one.
///
/// Bounded by `max_cache_entries` (§6): an `lru::LruCache` tracks recency of
/// access independently of the dashmap shard locks, and evicts the
/// least-recently-used key once the map would otherwise grow past capacity.
#[derive(Debug)]
pub struct MemoryEntryStore {
    entries: dashmap::DashMap<String, CacheEntry>,
    recency: Mutex<LruCache<String, ()>>,
    /// Count of [`EntryStore::get`] calls that found an entry.
    pub cache_hits: AtomicU64,
    /// Count of [`EntryStore::get`] calls that found nothing.
    pub cache_misses: AtomicU64,
    /// Count of [`EntryStore::put`]/[`EntryStore::update`] writes committed.
    pub cache_updates: AtomicU64,
}

impl Default for MemoryEntryStore {
    fn default() -> Self {
        Self::with_capacity(crate::config::CacheConfig::default().max_cache_entries)
    }
}

impl MemoryEntryStore {
    /// Builds a store with the default capacity from [`crate::config::CacheConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store that evicts its least-recently-used entry once more
    /// than `max_entries` keys would otherwise be live.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: dashmap::DashMap::new(),
            recency: Mutex::new(LruCache::new(NonZeroUsize::new(max_entries.max(1)).unwrap())),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_updates: AtomicU64::new(0),
        }
    }

    /// The number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `key` as just-touched and evicts the least-recently-used key
    /// from both the recency tracker and the entry map if this insert pushed
    /// the store past capacity.
    fn touch_and_evict(&self, key: &str) {
        let evicted = self.recency.lock().unwrap().push(key.to_string(), ());
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                self.entries.remove(&evicted_key);
            }
        }
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let found = self.entries.get(key).map(|r| r.value().clone());
        if found.is_some() {
            self.recency.lock().unwrap().get(key);
        }
        Ok(found)
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        self.touch_and_evict(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        self.recency.lock().unwrap().pop(key);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        max_retries: usize,
        f: Box<dyn for<'a> Fn(Option<&'a CacheEntry>) -> UpdateAction + Send + Sync>,
    ) -> Result<UpdateOutcome> {
        // dashmap's shard lock makes a single `entry()` call atomic with
        // respect to other callers touching the same key, so the "retry"
        // budget only guards against the callback itself panicking or
        // declining repeatedly -- in practice this converges on attempt 1.
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let outcome = match self.entries.entry(key.to_string()) {
                dashmap::mapref::entry::Entry::Occupied(mut occ) => {
                    let action = f(Some(occ.get()));
                    match action {
                        UpdateAction::Replace(new_entry) => {
                            *occ.get_mut() = *new_entry;
                            Some(Some(occ.get().clone()))
                        }
                        UpdateAction::Remove => {
                            occ.remove();
                            Some(None)
                        }
                        UpdateAction::NoChange => Some(Some(occ.get().clone())),
                    }
                }
                dashmap::mapref::entry::Entry::Vacant(vac) => match f(None) {
                    UpdateAction::Replace(new_entry) => {
                        let cloned = (*new_entry).clone();
                        vac.insert(*new_entry);
                        Some(Some(cloned))
                    }
                    UpdateAction::Remove | UpdateAction::NoChange => Some(None),
                },
            };
            match outcome {
                Some(result) => {
                    self.cache_updates.fetch_add(1, Ordering::Relaxed);
                    match &result {
                        Some(_) => self.touch_and_evict(key),
                        None => {
                            self.recency.lock().unwrap().pop(key);
                        }
                    }
                    return Ok(UpdateOutcome::Committed(result));
                }
                None if attempts > max_retries => {
                    return Err(CacheCoreError::EntryUpdateConflict {
                        key: key.to_string(),
                        attempts,
                    });
                }
                None => continue,
            }
        }
    }
}

/// Logs a [`CacheCoreError::StorageIoError`] and converts it to `None`/`()`,
/// implementing §7's "storage errors never cross the core boundary" policy.
/// The orchestrator calls this at every store touchpoint instead of using
/// `?` directly.
pub(crate) fn degrade_storage_error<T>(result: Result<T>, what: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("cache storage degraded ({what}): {e}");
            None
        }
    }
}
