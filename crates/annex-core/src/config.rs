//! Centralized configuration for the attachment registry.
//!
//! Constants live on zero-sized config structs; the one value that callers tune at
//! runtime is [`CacheSettings`], which decides where descriptors land in the external
//! cache.

use crate::types::TypeKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registry-level configuration.
pub struct RegistryConfig;

impl RegistryConfig {
    /// Cache namespace holding serialized type descriptors.
    pub const CACHE_NAMESPACE: &'static str = "attached-methods";
    /// Fixed prefix of every descriptor cache key; the type name follows it.
    pub const DESCRIPTOR_KEY_PREFIX: &'static str = "descriptor:";
    /// How long a built descriptor stays in the external cache.
    pub const DESCRIPTOR_TTL: Duration = Duration::from_secs(86_400);
    /// Directory under the platform config dir holding the persistent cache.
    pub const APP_CONFIG_DIR_NAME: &'static str = "annex";
    pub const CACHE_DB_FILENAME: &'static str = "descriptors.sqlite";
    /// Entry cap for the in-process memory cache.
    pub const MEMORY_CACHE_MAX_ENTRIES: u64 = 10_000;
}

/// Where and for how long descriptors are stored in the external cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheSettings {
    pub namespace: String,
    pub key_prefix: String,
    pub descriptor_ttl: Duration,
}

impl CacheSettings {
    /// Cache key for a type: `<key_prefix><type name>`.
    pub fn key_for(&self, ty: &TypeKey) -> String {
        format!("{}{}", self.key_prefix, ty)
    }

    /// Inverse of [`key_for`](Self::key_for); `None` for keys outside this prefix.
    pub fn type_name_from_key<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.key_prefix.as_str())
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: RegistryConfig::CACHE_NAMESPACE.to_string(),
            key_prefix: RegistryConfig::DESCRIPTOR_KEY_PREFIX.to_string(),
            descriptor_ttl: RegistryConfig::DESCRIPTOR_TTL,
        }
    }
}
