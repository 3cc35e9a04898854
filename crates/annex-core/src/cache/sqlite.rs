//! SQLite-based persistent cache implementation.

use super::traits::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats};
use crate::error::{RegistryError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// SQLite-based cache backend.
///
/// Provides namespace-isolated caching in a single database file that survives
/// process restarts. Thread-safe via internal mutex on the connection; WAL mode
/// lets several processes share the file.
pub struct SqliteCache {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
    /// Cache configuration.
    config: CacheConfig,
}

fn parse_timestamp(value: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback)
}

impl SqliteCache {
    /// Create a new cache at the specified database path.
    ///
    /// Creates the database and tables if they don't exist.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(db_path, CacheConfig::default())
    }

    /// Create a new cache with custom configuration.
    ///
    /// The configuration belongs to this handle; nothing of it is stored in the file.
    pub fn with_config(db_path: impl AsRef<Path>, config: CacheConfig) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RegistryError::io_with_path(e, parent))?;
        }

        let conn = Connection::open(db_path).map_err(|e| RegistryError::Cache {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };

        cache.init_schema()?;

        Ok(cache)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| RegistryError::Cache {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                last_accessed TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires
                ON cache_entries(namespace, expires_at);

            -- LRU eviction order
            CREATE INDEX IF NOT EXISTS idx_cache_accessed
                ON cache_entries(last_accessed);

            CREATE TABLE IF NOT EXISTS cache_namespaces (
                namespace TEXT PRIMARY KEY,
                entry_count INTEGER DEFAULT 0,
                total_size_bytes INTEGER DEFAULT 0,
                last_modified TEXT,
                last_cleanup TEXT
            );

            "#,
        )
        .map_err(|e| RegistryError::Cache {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    /// Configuration this handle was opened with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get cached data with full entry metadata.
    pub fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock_conn()?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let row: Option<(Vec<u8>, String, String, i64)> = conn
            .query_row(
                r#"
                SELECT value, cached_at, expires_at, size_bytes
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2 AND expires_at > ?3
                "#,
                params![namespace, key, now_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let Some((value, cached_at_str, expires_at_str, size_bytes)) = row else {
            return Ok(None);
        };

        // Access time only feeds LRU eviction; a failed update is harmless
        let _ = conn.execute(
            "UPDATE cache_entries SET last_accessed = ?1 WHERE namespace = ?2 AND key = ?3",
            params![now_str, namespace, key],
        );

        Ok(Some(CacheEntry {
            value,
            cached_at: parse_timestamp(&cached_at_str, now),
            expires_at: parse_timestamp(&expires_at_str, now),
            size_bytes: size_bytes as u64,
        }))
    }

    /// Set cached data with explicit expiration time.
    pub fn set_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock_conn()?;

        let now = Utc::now().to_rfc3339();
        let expires_str = expires_at.to_rfc3339();
        let size_bytes = value.len() as i64;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (namespace, key, value, cached_at, expires_at, size_bytes, last_accessed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![namespace, key, value, now, expires_str, size_bytes, now],
        )
        .map_err(|e| RegistryError::Cache {
            message: format!("Failed to set cache entry: {}", e),
            source: Some(e),
        })?;

        self.update_namespace_meta(&conn, namespace)?;

        // Release lock before checking eviction
        drop(conn);
        if let Err(e) = self.check_eviction() {
            debug!("Skipped cache eviction: {}", e);
        }

        Ok(())
    }

    /// Evict entries until the cache is under `max_bytes`.
    ///
    /// Uses LRU (least recently accessed) order. Returns the number of entries evicted.
    pub fn evict_to_size(&self, max_bytes: u64) -> Result<usize> {
        let conn = self.lock_conn()?;

        let current_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if (current_size as u64) <= max_bytes {
            return Ok(0);
        }

        let excess = current_size as u64 - max_bytes;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT namespace, key, size_bytes
                FROM cache_entries
                ORDER BY last_accessed ASC
                "#,
            )
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to prepare eviction query: {}", e),
                source: Some(e),
            })?;

        let entries: Vec<(String, String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to query for eviction: {}", e),
                source: Some(e),
            })?
            .filter_map(|r| r.ok())
            .collect();

        drop(stmt);

        let mut evicted_bytes = 0u64;
        let mut evicted_count = 0;
        let mut affected_namespaces = std::collections::HashSet::new();

        for (namespace, key, size) in entries {
            if evicted_bytes >= excess {
                break;
            }

            conn.execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )?;

            evicted_bytes += size as u64;
            evicted_count += 1;
            affected_namespaces.insert(namespace);
        }

        for namespace in affected_namespaces {
            self.update_namespace_meta(&conn, &namespace)?;
        }

        debug!("Evicted {} entries ({} bytes)", evicted_count, evicted_bytes);

        Ok(evicted_count)
    }

    /// Update namespace metadata after modifications.
    fn update_namespace_meta(&self, conn: &Connection, namespace: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        let (count, size): (i64, i64) = conn
            .query_row(
                r#"
                SELECT COUNT(*), COALESCE(SUM(size_bytes), 0)
                FROM cache_entries
                WHERE namespace = ?1
                "#,
                params![namespace],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap_or((0, 0));

        conn.execute(
            r#"
            INSERT INTO cache_namespaces (namespace, entry_count, total_size_bytes, last_modified)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace) DO UPDATE SET
                entry_count = ?2,
                total_size_bytes = ?3,
                last_modified = ?4
            "#,
            params![namespace, count, size, now],
        )
        .map_err(|e| RegistryError::Cache {
            message: format!("Failed to update namespace metadata: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    /// Check and perform eviction if needed.
    fn check_eviction(&self) -> Result<()> {
        let config = &self.config;
        if !config.enable_eviction || config.max_size_bytes == 0 {
            return Ok(());
        }

        let stats = self.get_stats()?;
        if stats.total_size_bytes > config.max_size_bytes {
            self.evict_to_size(config.max_size_bytes)?;
        }

        Ok(())
    }
}

impl CacheBackend for SqliteCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(namespace, key)
            .map(|opt| opt.map(|e| e.value))
    }

    fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        self.set_with_expiry(namespace, key, value, expires_at)
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock_conn()?;

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to invalidate cache entry: {}", e),
                source: Some(e),
            })?;

        if deleted > 0 {
            self.update_namespace_meta(&conn, namespace)?;
        }

        Ok(deleted > 0)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock_conn()?;

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to invalidate namespace: {}", e),
                source: Some(e),
            })?;

        conn.execute(
            "DELETE FROM cache_namespaces WHERE namespace = ?1",
            params![namespace],
        )?;

        debug!(
            "Invalidated {} entries from namespace '{}'",
            deleted, namespace
        );

        Ok(deleted)
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();

        let mut stmt = conn.prepare(
            r#"
            SELECT key FROM cache_entries
            WHERE namespace = ?1 AND expires_at > ?2
            ORDER BY key
            "#,
        )?;
        let keys = stmt
            .query_map(params![namespace, now], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(keys)
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let conn = self.lock_conn()?;

        let (total_entries, total_size): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM cache_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap_or((0, 0));

        let mut stmt = conn
            .prepare(
                r#"
                SELECT namespace, entry_count, total_size_bytes, last_modified, last_cleanup
                FROM cache_namespaces
                ORDER BY namespace
                "#,
            )
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to prepare namespace stats query: {}", e),
                source: Some(e),
            })?;

        let namespaces: Vec<CacheMeta> = stmt
            .query_map([], |row| {
                let namespace: String = row.get(0)?;
                let entry_count: i64 = row.get(1)?;
                let total_size_bytes: i64 = row.get(2)?;
                let last_modified_str: Option<String> = row.get(3)?;
                let last_cleanup_str: Option<String> = row.get(4)?;

                Ok(CacheMeta {
                    namespace,
                    entry_count: entry_count as usize,
                    total_size_bytes: total_size_bytes as u64,
                    last_modified: last_modified_str
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                    last_cleanup: last_cleanup_str
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                })
            })
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to query namespace stats: {}", e),
                source: Some(e),
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(CacheStats {
            total_entries: total_entries as usize,
            total_size_bytes: total_size as u64,
            max_size_bytes: self.config.max_size_bytes,
            namespace_count: namespaces.len(),
            namespaces,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock_conn()?;

        let now = Utc::now().to_rfc3339();

        let mut stmt = conn
            .prepare("SELECT DISTINCT namespace FROM cache_entries WHERE expires_at <= ?1")
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to prepare cleanup query: {}", e),
                source: Some(e),
            })?;

        let affected_namespaces: Vec<String> = stmt
            .query_map(params![now], |row| row.get(0))
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to query expired entries: {}", e),
                source: Some(e),
            })?
            .filter_map(|r| r.ok())
            .collect();

        drop(stmt);

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now],
            )
            .map_err(|e| RegistryError::Cache {
                message: format!("Failed to cleanup expired entries: {}", e),
                source: Some(e),
            })?;

        for namespace in affected_namespaces {
            self.update_namespace_meta(&conn, &namespace)?;
        }

        conn.execute(
            "UPDATE cache_namespaces SET last_cleanup = ?1",
            params![now],
        )?;

        if deleted > 0 {
            debug!("Cleaned up {} expired cache entries", deleted);
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (TempDir, SqliteCache) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_cache.sqlite");
        let cache = SqliteCache::new(&db_path).unwrap();
        (temp_dir, cache)
    }

    fn small_config(max_size_bytes: u64) -> CacheConfig {
        CacheConfig {
            max_size_bytes,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_cache_creation() {
        let (_temp, cache) = create_test_cache();
        assert_eq!(cache.config().max_size_bytes, CacheConfig::DEFAULT_MAX_SIZE_BYTES);
        assert_eq!(
            cache.get_stats().unwrap().max_size_bytes,
            CacheConfig::DEFAULT_MAX_SIZE_BYTES
        );
    }

    #[test]
    fn test_reopen_uses_new_config() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("config.sqlite");
        {
            let cache = SqliteCache::with_config(&db_path, small_config(100)).unwrap();
            assert_eq!(cache.get_stats().unwrap().max_size_bytes, 100);
        }

        let reopened = SqliteCache::with_config(&db_path, small_config(1_000_000)).unwrap();
        assert_eq!(reopened.config().max_size_bytes, 1_000_000);
        assert_eq!(reopened.get_stats().unwrap().max_size_bytes, 1_000_000);
    }

    #[test]
    fn test_lru_eviction_over_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("evict.sqlite");
        let cache = SqliteCache::with_config(&db_path, small_config(150)).unwrap();
        let ttl = Duration::from_secs(3600);
        let payload = [b'x'; 60];

        cache.set("ns", "a", &payload, ttl).unwrap();
        cache.set("ns", "b", &payload, ttl).unwrap();
        // Touch "a" so "b" becomes the least recently accessed entry.
        assert!(cache.get("ns", "a").unwrap().is_some());
        cache.set("ns", "c", &payload, ttl).unwrap();

        assert_eq!(cache.keys("ns").unwrap(), ["a", "c"]);
        assert_eq!(cache.get_stats().unwrap().total_size_bytes, 120);
    }

    #[test]
    fn test_eviction_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let config = CacheConfig {
            enable_eviction: false,
            ..small_config(100)
        };
        let cache = SqliteCache::with_config(temp_dir.path().join("keep.sqlite"), config).unwrap();
        let ttl = Duration::from_secs(3600);

        cache.set("ns", "a", &[0u8; 60], ttl).unwrap();
        cache.set("ns", "b", &[0u8; 60], ttl).unwrap();
        assert_eq!(cache.keys("ns").unwrap(), ["a", "b"]);
        assert_eq!(cache.evict_to_size(100).unwrap(), 1);
        assert_eq!(cache.keys("ns").unwrap(), ["b"]);
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("deeper").join("c.sqlite");
        SqliteCache::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_set_and_get() {
        let (_temp, cache) = create_test_cache();

        cache
            .set("test_ns", "key1", b"hello world", Duration::from_secs(3600))
            .unwrap();

        let value = cache.get("test_ns", "key1").unwrap();
        assert_eq!(value.unwrap(), b"hello world");

        let entry = cache.get_entry("test_ns", "key1").unwrap().unwrap();
        assert_eq!(entry.size_bytes, 11);
        assert!(entry.expires_at > entry.cached_at);
    }

    #[test]
    fn test_expiration() {
        let (_temp, cache) = create_test_cache();

        let expired_at = Utc::now() - chrono::Duration::seconds(1);
        cache
            .set_with_expiry("test_ns", "expired_key", b"old data", expired_at)
            .unwrap();

        assert!(cache.get("test_ns", "expired_key").unwrap().is_none());
        assert!(cache.keys("test_ns").unwrap().is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("persist.sqlite");
        {
            let cache = SqliteCache::new(&db_path).unwrap();
            cache
                .set("ns", "descriptor:blog.Post", b"{}", Duration::from_secs(3600))
                .unwrap();
        }
        let reopened = SqliteCache::new(&db_path).unwrap();
        assert_eq!(reopened.get("ns", "descriptor:blog.Post").unwrap().unwrap(), b"{}");
    }

    #[test]
    fn test_invalidate_and_namespace() {
        let (_temp, cache) = create_test_cache();
        let ttl = Duration::from_secs(3600);

        cache.set("ns1", "key1", b"data1", ttl).unwrap();
        cache.set("ns1", "key2", b"data2", ttl).unwrap();
        cache.set("ns2", "key1", b"data3", ttl).unwrap();

        assert!(cache.invalidate("ns1", "key1").unwrap());
        assert!(!cache.invalidate("ns1", "key1").unwrap());
        assert_eq!(cache.keys("ns1").unwrap(), ["key2"]);

        assert_eq!(cache.invalidate_namespace("ns1").unwrap(), 1);
        assert!(cache.keys("ns1").unwrap().is_empty());
        assert_eq!(cache.get("ns2", "key1").unwrap().unwrap(), b"data3");
    }

    #[test]
    fn test_stats() {
        let (_temp, cache) = create_test_cache();
        let ttl = Duration::from_secs(3600);

        cache.set("ns1", "key1", b"12345", ttl).unwrap();
        cache.set("ns1", "key2", b"67890", ttl).unwrap();
        cache.set("ns2", "key1", b"abcde", ttl).unwrap();

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 15);
        assert_eq!(stats.namespace_count, 2);
    }

    #[test]
    fn test_cleanup_expired() {
        let (_temp, cache) = create_test_cache();

        let past = Utc::now() - chrono::Duration::seconds(100);
        cache.set_with_expiry("test_ns", "old1", b"data", past).unwrap();
        cache.set_with_expiry("test_ns", "old2", b"data", past).unwrap();
        cache
            .set("test_ns", "new1", b"data", Duration::from_secs(3600))
            .unwrap();

        assert_eq!(cache.cleanup_expired().unwrap(), 2);
        assert_eq!(cache.keys("test_ns").unwrap(), ["new1"]);
    }
}
