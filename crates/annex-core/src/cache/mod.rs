//! External cache services for type descriptors.
//!
//! The registry keeps descriptors in memory for the life of the process and writes
//! each freshly built one through a [`CacheBackend`], so later processes (or a
//! registry that was reset) can adopt it instead of running the builder hook again.
//! Two backends ship with the crate:
//! - [`MemoryCache`]: process-local, the default
//! - [`SqliteCache`]: a database file shared across processes and restarts

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats};
