//! Expiring cache persisted through a [`KeyValueStore`]
//!
//! Every entry carries its own expiry timestamp. The whole cache is written as
//! one record on each mutation and read back once at construction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::{KeyValueStore, StorageError};

/// Wrapper struct for one cached value as stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// The cached data
    data: T,
    /// When the data was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: DateTime<Utc>,
}

/// The persisted form of the whole cache
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord<T> {
    entries: BTreeMap<String, CacheEntry<T>>,
}

/// In-memory slot; the value is shared so hits never copy the payload
#[derive(Debug)]
struct Slot<T> {
    data: Arc<T>,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<T> Slot<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Key → value cache with per-key expiry and write-through persistence
///
/// Storage failures never surface to callers: they are logged and the cache
/// keeps working from memory.
pub struct ExpiringCache<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    ttl: Duration,
}

impl<T> std::fmt::Debug for ExpiringCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("entries", &self.slots.lock().len())
            .finish()
    }
}

impl<T> ExpiringCache<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates a cache and hydrates it from the store's `namespace` record
    ///
    /// Expired entries in the record are dropped. A record that cannot be
    /// decoded, or that holds nothing but expired entries, is removed.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        let namespace = namespace.into();
        let slots = hydrate(store.as_ref(), &namespace);
        Self {
            slots: Mutex::new(slots),
            store,
            namespace,
            ttl,
        }
    }

    /// Returns the value for `key` if it is present and not expired
    ///
    /// Expired entries are evicted and reported as misses.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let now = Utc::now();
        let mut slots = self.slots.lock();

        match slots.get(key) {
            Some(slot) if slot.is_fresh(now) => Some(Arc::clone(&slot.data)),
            Some(_) => {
                debug!(key, "cache entry expired");
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key`, stamping `expires_at = now + ttl`, and persists
    ///
    /// Returns the shared handle to the stored value.
    pub fn set(&self, key: &str, value: T) -> Arc<T> {
        let now = Utc::now();
        let data = Arc::new(value);
        let mut slots = self.slots.lock();

        slots.insert(
            key.to_string(),
            Slot {
                data: Arc::clone(&data),
                cached_at: now,
                expires_at: now + self.ttl,
            },
        );

        if let Err(e) = self.persist(&slots, now) {
            warn!(namespace = %self.namespace, error = %e, "failed to persist cache");
        }

        data
    }

    /// Removes every entry from memory and from the store
    pub fn clear(&self) {
        self.slots.lock().clear();

        if let Err(e) = self.store.remove(&self.namespace) {
            warn!(namespace = %self.namespace, error = %e, "failed to remove persisted cache");
        }
    }

    /// Returns when the live entry for `key` was cached
    pub fn cached_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        self.slots
            .lock()
            .get(key)
            .filter(|slot| slot.is_fresh(now))
            .map(|slot| slot.cached_at)
    }

    /// Number of unexpired entries
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.is_fresh(now))
            .count()
    }

    /// Returns true if there are no unexpired entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(
        &self,
        slots: &HashMap<String, Slot<T>>,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let record = CacheRecord {
            entries: slots
                .iter()
                .filter(|(_, slot)| slot.is_fresh(now))
                .map(|(key, slot)| {
                    (
                        key.clone(),
                        CacheEntry {
                            data: &*slot.data,
                            cached_at: slot.cached_at,
                            expires_at: slot.expires_at,
                        },
                    )
                })
                .collect(),
        };

        let json = serde_json::to_string(&record)?;
        self.store.write(&self.namespace, &json)
    }
}

fn hydrate<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    namespace: &str,
) -> HashMap<String, Slot<T>> {
    let content = match store.read(namespace) {
        Ok(Some(content)) => content,
        Ok(None) => return HashMap::new(),
        Err(e) => {
            warn!(namespace, error = %e, "failed to read persisted cache");
            return HashMap::new();
        }
    };

    let record: CacheRecord<T> = match serde_json::from_str(&content) {
        Ok(record) => record,
        Err(e) => {
            warn!(namespace, error = %e, "discarding unreadable persisted cache");
            discard(store, namespace);
            return HashMap::new();
        }
    };

    let now = Utc::now();
    let total = record.entries.len();
    let slots: HashMap<String, Slot<T>> = record
        .entries
        .into_iter()
        .filter(|(_, entry)| now < entry.expires_at)
        .map(|(key, entry)| {
            (
                key,
                Slot {
                    data: Arc::new(entry.data),
                    cached_at: entry.cached_at,
                    expires_at: entry.expires_at,
                },
            )
        })
        .collect();

    if slots.is_empty() && total > 0 {
        info!(namespace, "persisted cache fully expired");
        discard(store, namespace);
    } else {
        info!(namespace, loaded = slots.len(), dropped = total - slots.len(), "cache loaded");
    }

    slots
}

fn discard(store: &dyn KeyValueStore, namespace: &str) {
    if let Err(e) = store.remove(namespace) {
        warn!(namespace, error = %e, "failed to remove stale cache record");
    }
}
