//! Builder for configuring an [`AttachmentRegistry`].

use super::AttachmentRegistry;
use crate::cache::{CacheBackend, MemoryCache, SqliteCache};
use crate::config::CacheSettings;
use crate::error::{RegistryError, Result};
use crate::platform;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

enum CacheChoice {
    Memory,
    Backend(Arc<dyn CacheBackend>),
    Sqlite(Option<PathBuf>),
}

/// Builder for configuring an [`AttachmentRegistry`].
///
/// # Example
///
/// ```rust
/// use annex_core::AttachmentRegistry;
/// use std::time::Duration;
///
/// let registry = AttachmentRegistry::builder()
///     .namespace("my-app")
///     .descriptor_ttl(Duration::from_secs(600))
///     .build()?;
/// assert_eq!(registry.cache_settings().namespace, "my-app");
/// # Ok::<(), annex_core::RegistryError>(())
/// ```
pub struct AttachmentRegistryBuilder {
    cache: CacheChoice,
    settings: CacheSettings,
}

impl AttachmentRegistryBuilder {
    pub fn new() -> Self {
        Self {
            cache: CacheChoice::Memory,
            settings: CacheSettings::default(),
        }
    }

    /// Use a caller-supplied cache backend.
    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = CacheChoice::Backend(cache);
        self
    }

    /// Persist descriptors in a SQLite database at `db_path`.
    ///
    /// If the database cannot be opened, `build` logs a warning and falls back to
    /// an in-memory cache.
    pub fn sqlite_cache(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.cache = CacheChoice::Sqlite(Some(db_path.into()));
        self
    }

    /// Persist descriptors in the platform default database
    /// (`{config dir}/annex/descriptors.sqlite`).
    pub fn default_sqlite_cache(mut self) -> Self {
        self.cache = CacheChoice::Sqlite(None);
        self
    }

    /// Cache namespace for descriptors.
    ///
    /// Default: `attached-methods`
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.settings.namespace = namespace.into();
        self
    }

    /// Prefix placed before the type name in every descriptor cache key.
    ///
    /// Default: `descriptor:`
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.key_prefix = prefix.into();
        self
    }

    /// Lifetime of descriptors written to the cache.
    ///
    /// Default: one day
    pub fn descriptor_ttl(mut self, ttl: Duration) -> Self {
        self.settings.descriptor_ttl = ttl;
        self
    }

    fn validate(settings: &CacheSettings) -> Result<()> {
        if settings.namespace.trim().is_empty() {
            return Err(RegistryError::Config {
                message: "Cache namespace must not be empty".to_string(),
            });
        }
        if settings.descriptor_ttl.is_zero() {
            return Err(RegistryError::Config {
                message: "Descriptor TTL must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn open_sqlite(path: Option<PathBuf>) -> Result<SqliteCache> {
        let path = match path {
            Some(path) => path,
            None => platform::default_cache_db_path()?,
        };
        let cache = SqliteCache::new(&path)?;
        info!("Using descriptor cache at {}", path.display());
        Ok(cache)
    }

    /// Build the registry.
    pub fn build(self) -> Result<AttachmentRegistry> {
        Self::validate(&self.settings)?;

        let cache: Arc<dyn CacheBackend> = match self.cache {
            CacheChoice::Memory => Arc::new(MemoryCache::new()),
            CacheChoice::Backend(cache) => cache,
            CacheChoice::Sqlite(path) => match Self::open_sqlite(path) {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    warn!("Failed to open descriptor cache, using memory cache: {}", e);
                    Arc::new(MemoryCache::new())
                }
            },
        };

        Ok(AttachmentRegistry::with_parts(cache, self.settings))
    }
}

impl Default for AttachmentRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
