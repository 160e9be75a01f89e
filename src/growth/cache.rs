//! Read-through cache in front of the progression and paragon stores.
//!
//! Snapshots are JSON under `progression:<id>`, `paragon:<id>`,
//! `prestige:<id>` and `mastery:<id>` with a fixed expiry. The cache is optional: every client failure is logged and the
//! caller falls back to the store. Services call [`GrowthCache::invalidate`]
//! after each successful store write, before returning.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::growth::errors::GrowthError;
use crate::metrics;

/// Fixed snapshot lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Key-value cache with per-entry expiry (Redis-like).
pub trait CacheClient: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GrowthError>;
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), GrowthError>;
    fn delete(&self, key: &str) -> Result<(), GrowthError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    expires_at: Instant,
    value: Vec<u8>,
}

/// In-process [`CacheClient`]. Expired entries are dropped on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|map| map.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> GrowthError {
    GrowthError::Cache("cache lock poisoned".to_string())
}

impl CacheClient for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, GrowthError> {
        let now = Instant::now();
        {
            let map = self.entries.read().map_err(poisoned)?;
            match map.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(None)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), GrowthError> {
        let entry = CacheEntry {
            expires_at: Instant::now() + ttl,
            value,
        };
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), GrowthError> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

pub fn progression_key(character_id: Uuid) -> String {
    format!("progression:{}", character_id)
}

pub fn paragon_key(character_id: Uuid) -> String {
    format!("paragon:{}", character_id)
}

pub fn prestige_key(character_id: Uuid) -> String {
    format!("prestige:{}", character_id)
}

pub fn mastery_key(character_id: Uuid) -> String {
    format!("mastery:{}", character_id)
}

/// Cache-aside helper shared by the services. A `None` client disables caching.
#[derive(Clone)]
pub struct GrowthCache {
    client: Option<Arc<dyn CacheClient>>,
    ttl: Duration,
}

impl GrowthCache {
    pub fn new(client: Arc<dyn CacheClient>) -> Self {
        Self {
            client: Some(client),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: None,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached snapshot at `key`, or run `load` and cache its result.
    ///
    /// Cache read, decode and write failures never fail the call; errors from
    /// `load` do. Callers that also write the underlying row must run this
    /// under the same lock as their writes, or a slow fill can overwrite a
    /// newer invalidation with an old snapshot.
    pub fn get_or_load<T, F>(&self, key: &str, load: F) -> Result<T, GrowthError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, GrowthError>,
    {
        let Some(client) = &self.client else {
            return load();
        };

        match client.get(key) {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    metrics::inc_cache_hit();
                    debug!("cache hit for {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    metrics::inc_cache_error();
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                }
            },
            Ok(None) => {
                metrics::inc_cache_miss();
                debug!("cache miss for {}", key);
            }
            Err(e) => {
                metrics::inc_cache_error();
                warn!("Cache read failed for {}: {} (falling back to store)", key, e);
            }
        }

        let value = load()?;
        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = client.set(key, bytes, self.ttl) {
                    metrics::inc_cache_error();
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Could not encode cache snapshot for {}: {}", key, e),
        }
        Ok(value)
    }

    /// Drop the snapshot at `key` so the next read goes to the store.
    pub fn invalidate(&self, key: &str) {
        let Some(client) = &self.client else {
            return;
        };
        match client.delete(key) {
            Ok(()) => debug!("invalidated {}", key),
            Err(e) => {
                metrics::inc_cache_error();
                warn!("Cache invalidation failed for {}: {}", key, e);
            }
        }
    }
}
