//! In-process cache backend.

use super::traits::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats};
use crate::config::RegistryConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

type EntryKey = (String, String);

/// Memory-only cache backend.
///
/// Entries live for the lifetime of the process and honor per-entry expiry. This is
/// the registry's default backend; use [`SqliteCache`](super::SqliteCache) to reuse
/// descriptors across restarts.
pub struct MemoryCache {
    entries: Cache<EntryKey, CacheEntry>,
    config: CacheConfig,
    last_cleanup: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(RegistryConfig::MEMORY_CACHE_MAX_ENTRIES)
            .build();
        Self {
            entries,
            config,
            last_cleanup: Mutex::new(None),
        }
    }

    fn entry_key(namespace: &str, key: &str) -> EntryKey {
        (namespace.to_string(), key.to_string())
    }

    fn live_entries(&self) -> Vec<(EntryKey, CacheEntry)> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let entry_key = Self::entry_key(namespace, key);
        match self.entries.get(&entry_key) {
            Some(entry) if entry.is_expired() => {
                self.entries.invalidate(&entry_key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries.insert(
            Self::entry_key(namespace, key),
            CacheEntry::new(value.to_vec(), ttl),
        );
        Ok(())
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let entry_key = Self::entry_key(namespace, key);
        let existed = self.entries.contains_key(&entry_key);
        self.entries.invalidate(&entry_key);
        Ok(existed)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let doomed: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &doomed {
            self.entries.invalidate(key);
        }
        debug!(
            "Invalidated {} entries from namespace '{}'",
            doomed.len(),
            namespace
        );
        Ok(doomed.len())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .live_entries()
            .into_iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, key), _)| key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let mut namespaces: BTreeMap<String, CacheMeta> = BTreeMap::new();
        let last_cleanup = *self.last_cleanup.lock();

        for ((namespace, _), entry) in self.live_entries() {
            let meta = namespaces
                .entry(namespace.clone())
                .or_insert_with(|| CacheMeta {
                    namespace,
                    entry_count: 0,
                    total_size_bytes: 0,
                    last_modified: None,
                    last_cleanup,
                });
            meta.entry_count += 1;
            meta.total_size_bytes += entry.size_bytes;
            meta.last_modified = meta.last_modified.max(Some(entry.cached_at));
        }

        let namespaces: Vec<CacheMeta> = namespaces.into_values().collect();
        Ok(CacheStats {
            total_entries: namespaces.iter().map(|m| m.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|m| m.total_size_bytes).sum(),
            max_size_bytes: self.config.max_size_bytes,
            namespace_count: namespaces.len(),
            namespaces,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let expired: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.entries.invalidate(key);
        }
        *self.last_cleanup.lock() = Some(Utc::now());

        if !expired.is_empty() {
            debug!("Cleaned up {} expired cache entries", expired.len());
        }
        Ok(expired.len())
    }
}
