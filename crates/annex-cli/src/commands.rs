//! Cache maintenance commands.
//!
//! Each command works on one namespace of a [`SqliteCache`] and returns a
//! serializable report; printing is left to `main`.

use annex_core::{CacheBackend, CacheSettings, CacheStats, DescriptorRecord, SqliteCache, TypeKey};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Cached descriptor as shown by `list`.
#[derive(Debug, Serialize)]
pub struct DescriptorSummary {
    pub type_name: String,
    pub operation_count: usize,
    pub size_bytes: u64,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Cached descriptor as shown by `show`.
#[derive(Debug, Serialize)]
pub struct DescriptorDetail {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub descriptor: DescriptorRecord,
}

#[derive(Debug, Serialize)]
pub struct RemovalReport {
    pub removed: usize,
}

fn decode(key: &str, bytes: &[u8]) -> Result<DescriptorRecord> {
    serde_json::from_slice(bytes)
        .with_context(|| format!("Cache entry '{}' is not a descriptor record", key))
}

pub fn stats(cache: &SqliteCache) -> Result<CacheStats> {
    Ok(cache.get_stats()?)
}

pub fn list(cache: &SqliteCache, settings: &CacheSettings) -> Result<Vec<DescriptorSummary>> {
    let mut summaries = Vec::new();

    for key in cache.keys(&settings.namespace)? {
        let Some(type_name) = settings.type_name_from_key(&key) else {
            debug!("Skipping foreign key '{}'", key);
            continue;
        };
        // Entries can expire between listing and reading.
        let Some(entry) = cache.get_entry(&settings.namespace, &key)? else {
            continue;
        };
        let operation_count = match decode(&key, &entry.value) {
            Ok(record) => record.operations.len(),
            Err(e) => {
                warn!("{:#}", e);
                continue;
            }
        };

        summaries.push(DescriptorSummary {
            type_name: type_name.to_string(),
            operation_count,
            size_bytes: entry.size_bytes,
            cached_at: entry.cached_at,
            expires_at: entry.expires_at,
        });
    }

    Ok(summaries)
}

pub fn show(cache: &SqliteCache, settings: &CacheSettings, type_name: &str) -> Result<DescriptorDetail> {
    let key = settings.key_for(&TypeKey::new(type_name));
    let entry = cache
        .get_entry(&settings.namespace, &key)?
        .ok_or_else(|| anyhow!("No cached descriptor for type {}", type_name))?;
    let descriptor = decode(&key, &entry.value)?;

    Ok(DescriptorDetail {
        key,
        cached_at: entry.cached_at,
        expires_at: entry.expires_at,
        descriptor,
    })
}

/// Remove one type's descriptor, or every descriptor `list` would show when
/// `type_name` is `None`. Keys outside the prefix are left alone.
pub fn purge(
    cache: &SqliteCache,
    settings: &CacheSettings,
    type_name: Option<&str>,
) -> Result<RemovalReport> {
    let keys = match type_name {
        Some(type_name) => vec![settings.key_for(&TypeKey::new(type_name))],
        None => cache
            .keys(&settings.namespace)?
            .into_iter()
            .filter(|key| settings.type_name_from_key(key).is_some())
            .collect(),
    };

    let mut removed = 0;
    for key in &keys {
        if cache.invalidate(&settings.namespace, key)? {
            debug!("Purged '{}'", key);
            removed += 1;
        }
    }
    Ok(RemovalReport { removed })
}

pub fn cleanup(cache: &SqliteCache) -> Result<RemovalReport> {
    Ok(RemovalReport {
        removed: cache.cleanup_expired()?,
    })
}
