//! Annex Core - runtime method attachment for Rust types.
//!
//! Types opt in by implementing [`Extensible`]. Client code then attaches operations
//! of shared [`Delegate`] objects to those types under an alias of its choosing, and
//! calls them on any instance by name. Each type's aliases live in a
//! [`TypeDescriptor`], built lazily on first use by the type's builder hook and
//! written through to an external [`CacheBackend`] so a later process can adopt it.
//!
//! # Example
//!
//! ```rust
//! use annex_core::{AttachmentRegistry, Extensible, MethodSet, Value};
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! impl Extensible for Greeter {
//!     const TYPE_NAME: &'static str = "demo.Greeter";
//! }
//!
//! fn main() -> annex_core::Result<()> {
//!     let registry = AttachmentRegistry::new();
//!
//!     let logger = Arc::new(MethodSet::new("logger").method(
//!         "logMessage",
//!         ["owner", "msg"],
//!         |owner, args| {
//!             let name = owner
//!                 .downcast_ref::<Greeter>()
//!                 .map(|g| g.name.as_str())
//!                 .unwrap_or("?");
//!             Ok(Value::from(format!("{}: {}", name, args[0])))
//!         },
//!     ));
//!     registry.attach_to::<Greeter>("greet", logger, "logMessage")?;
//!
//!     let greeter = Greeter { name: "ada".into() };
//!     let out = registry.bind(&greeter).call("greet", &[Value::from("hi")])?;
//!     assert_eq!(out, Value::from("ada: \"hi\""));
//!
//!     let attached = registry.list_attached("demo.Greeter")?;
//!     assert_eq!(attached[0].1.parameter_count()?, 1);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod delegate;
pub mod descriptor;
pub mod error;
pub mod operation;
pub mod platform;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats, MemoryCache, SqliteCache};
pub use config::{CacheSettings, RegistryConfig};
pub use delegate::{Delegate, MethodSet, OperationSignature, Parameter, SourceLocation};
pub use descriptor::{DescriptorHandle, DescriptorRecord, OperationRecord, StaleRecord, TypeDescriptor};
pub use error::{RegistryError, Result};
pub use operation::AttachedOperation;
pub use registry::{AttachmentRegistry, AttachmentRegistryBuilder, Bound};
pub use types::{Extensible, Receiver, TypeInfo, TypeKey, TypeKind, TypeTarget};

pub use serde_json::Value;
