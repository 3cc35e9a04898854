//! The attachment registry: type catalog, descriptor table, and delegate directory.
//!
//! # Resolution
//!
//! [`AttachmentRegistry::resolve_descriptor`] turns a type (given by instance, type
//! record, or name) into its descriptor:
//!
//! 1. Normalize to a registered type. Unknown names are a configuration error;
//!    abstract types get a fresh, uncached empty descriptor.
//! 2. Return the in-memory entry if there is one.
//! 3. Otherwise adopt the external cache's copy, if it can be decoded and every
//!    delegate it names is known and still defines the recorded operation.
//! 4. Otherwise run the type's builder hook and write the result to the cache.
//!
//! Steps 3 and 4 run inside a per-type `OnceLock`, so racing resolvers of the same
//! type wait for one another and the hook runs (and the cache is written) at most
//! once per type until [`reset`](AttachmentRegistry::reset).

mod builder;
mod dispatch;

pub use builder::AttachmentRegistryBuilder;
pub use dispatch::Bound;

use crate::cache::{CacheBackend, MemoryCache};
use crate::config::CacheSettings;
use crate::delegate::Delegate;
use crate::descriptor::{DescriptorHandle, DescriptorRecord, TypeDescriptor};
use crate::error::{RegistryError, Result};
use crate::operation::AttachedOperation;
use crate::types::{Extensible, TypeInfo, TypeKey, TypeTarget};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

type Slot = Arc<OnceLock<DescriptorHandle>>;

/// Process-wide directory from type identity to descriptor.
///
/// Construct one at startup and pass it by reference to every call site.
pub struct AttachmentRegistry {
    types: RwLock<HashMap<String, TypeInfo>>,
    descriptors: RwLock<HashMap<TypeKey, Slot>>,
    delegates: RwLock<HashMap<String, Arc<dyn Delegate>>>,
    cache: Arc<dyn CacheBackend>,
    settings: CacheSettings,
}

impl std::fmt::Debug for AttachmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AttachmentRegistry {
    /// A registry backed by an in-process [`MemoryCache`] and default settings.
    pub fn new() -> Self {
        Self::with_parts(Arc::new(MemoryCache::new()), CacheSettings::default())
    }

    pub fn builder() -> AttachmentRegistryBuilder {
        AttachmentRegistryBuilder::new()
    }

    pub(crate) fn with_parts(cache: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            descriptors: RwLock::new(HashMap::new()),
            delegates: RwLock::new(HashMap::new()),
            cache,
            settings,
        }
    }

    pub fn cache_settings(&self) -> &CacheSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Type catalog
    // ------------------------------------------------------------------

    /// Make `T` resolvable by name.
    pub fn register_type<T: Extensible>(&self) -> Result<()> {
        self.register_info(TypeInfo::of::<T>())
    }

    /// Declare a name-only abstract type, e.g. the base of a family of types.
    pub fn register_abstract(&self, name: &'static str) -> Result<()> {
        self.register_info(TypeInfo::abstract_named(name))
    }

    fn register_info(&self, info: TypeInfo) -> Result<()> {
        if let Some(existing) = self.types.read().get(info.name()) {
            return Self::check_same_type(existing, &info);
        }

        let mut types = self.types.write();
        match types.get(info.name()) {
            Some(existing) => Self::check_same_type(existing, &info),
            None => {
                debug!("Registered extensible type {}", info.name());
                types.insert(info.name().to_string(), info);
                Ok(())
            }
        }
    }

    fn check_same_type(existing: &TypeInfo, incoming: &TypeInfo) -> Result<()> {
        if existing.type_id() == incoming.type_id() && existing.kind() == incoming.kind() {
            Ok(())
        } else {
            Err(RegistryError::TypeNameConflict {
                type_name: incoming.name().to_string(),
            })
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Step 1 of resolution: find the catalog record for a target.
    fn normalize(&self, target: TypeTarget<'_>) -> Result<TypeInfo> {
        match target {
            TypeTarget::Instance(instance) => {
                let info = instance.type_info();
                self.register_info(info)?;
                Ok(info)
            }
            TypeTarget::Info(info) => {
                self.register_info(info)?;
                Ok(info)
            }
            TypeTarget::Name(name) => {
                self.types
                    .read()
                    .get(name)
                    .copied()
                    .ok_or_else(|| RegistryError::UnsupportedType {
                        type_name: name.to_string(),
                    })
            }
        }
    }

    // ------------------------------------------------------------------
    // Delegate directory
    // ------------------------------------------------------------------

    /// Make a delegate available to descriptors adopted from the external cache.
    ///
    /// A later delegate with the same name replaces the earlier one.
    pub fn register_delegate(&self, delegate: Arc<dyn Delegate>) {
        let name = delegate.name().to_string();
        let mut delegates = self.delegates.write();
        if let Some(previous) = delegates.get(&name) {
            if !Arc::ptr_eq(previous, &delegate) {
                debug!("Delegate '{}' replaced in directory", name);
            }
        }
        delegates.insert(name, delegate);
    }

    pub fn delegate(&self, name: &str) -> Option<Arc<dyn Delegate>> {
        self.delegates.read().get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    /// Resolve the descriptor for a type or instance.
    pub fn resolve_descriptor<'a>(
        &self,
        target: impl Into<TypeTarget<'a>>,
    ) -> Result<DescriptorHandle> {
        let info = self.normalize(target.into())?;
        Ok(self.descriptor_for(&info))
    }

    pub fn descriptor_of<T: Extensible>(&self) -> Result<DescriptorHandle> {
        self.resolve_descriptor(TypeInfo::of::<T>())
    }

    fn descriptor_for(&self, info: &TypeInfo) -> DescriptorHandle {
        let key = info.key();
        if info.is_abstract() {
            return DescriptorHandle::detached(TypeDescriptor::new(key));
        }

        if let Some(handle) = self.descriptors.read().get(&key).and_then(|slot| slot.get()) {
            return handle.clone();
        }

        let slot = Arc::clone(self.descriptors.write().entry(key).or_default());
        slot.get_or_init(|| DescriptorHandle::cached(self.load_or_build(info)))
            .clone()
    }

    /// Steps 3 and 4: adopt from the external cache, or build and write through.
    fn load_or_build(&self, info: &TypeInfo) -> TypeDescriptor {
        let key = info.key();
        let cache_key = self.settings.key_for(&key);

        if let Some(descriptor) = self.load_cached(&key, &cache_key) {
            debug!(
                "Adopted cached descriptor for {} ({} attached)",
                key,
                descriptor.len()
            );
            return descriptor;
        }

        let descriptor = info.build_descriptor();
        debug!("Built descriptor for {} ({} attached)", key, descriptor.len());

        for delegate in descriptor.delegates() {
            self.register_delegate(delegate);
        }
        self.store_cached(&cache_key, &descriptor);
        descriptor
    }

    fn load_cached(&self, key: &TypeKey, cache_key: &str) -> Option<TypeDescriptor> {
        let bytes = match self.cache.get(&self.settings.namespace, cache_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Descriptor cache lookup failed for {}: {}", key, e);
                return None;
            }
        };

        let record: DescriptorRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding undecodable cached descriptor for {}: {}", key, e);
                return None;
            }
        };

        if record.type_name != key.as_str() {
            warn!(
                "Discarding cached descriptor for {}: entry belongs to {}",
                key, record.type_name
            );
            return None;
        }

        match TypeDescriptor::from_record(&record, |name| self.delegate(name)) {
            Ok(descriptor) => Some(descriptor),
            Err(stale) => {
                warn!("Discarding cached descriptor for {}: {}", key, stale);
                None
            }
        }
    }

    fn store_cached(&self, cache_key: &str, descriptor: &TypeDescriptor) {
        let bytes = match serde_json::to_vec(&descriptor.to_record()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not encode descriptor for {}: {}", descriptor.type_key(), e);
                return;
            }
        };

        if let Err(e) = self.cache.set(
            &self.settings.namespace,
            cache_key,
            &bytes,
            self.settings.descriptor_ttl,
        ) {
            warn!("Descriptor cache write failed for {}: {}", descriptor.type_key(), e);
        }
    }

    // ------------------------------------------------------------------
    // Attachment
    // ------------------------------------------------------------------

    /// Expose `operation` of `delegate` on the target type under `alias`.
    ///
    /// Creates the type's descriptor first if needed. Rebinding an existing alias
    /// replaces it silently.
    pub fn attach<'a>(
        &self,
        target: impl Into<TypeTarget<'a>>,
        alias: &str,
        delegate: Arc<dyn Delegate>,
        operation: &str,
    ) -> Result<()> {
        let info = self.normalize(target.into())?;
        if info.is_abstract() {
            return Err(RegistryError::AbstractType {
                type_name: info.name().to_string(),
            });
        }

        self.register_delegate(Arc::clone(&delegate));
        self.descriptor_for(&info)
            .insert(AttachedOperation::new(delegate, operation, alias));
        Ok(())
    }

    pub fn attach_to<T: Extensible>(
        &self,
        alias: &str,
        delegate: Arc<dyn Delegate>,
        operation: &str,
    ) -> Result<()> {
        self.attach(TypeInfo::of::<T>(), alias, delegate, operation)
    }

    /// Attached operations of a type, in insertion order.
    pub fn list_attached<'a>(
        &self,
        target: impl Into<TypeTarget<'a>>,
    ) -> Result<Vec<(String, AttachedOperation)>> {
        Ok(self.resolve_descriptor(target)?.list_all())
    }

    /// Types with an in-memory descriptor, sorted by name.
    pub fn cached_types(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self
            .descriptors
            .read()
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Drop every in-memory descriptor.
    ///
    /// The external cache is left alone: the next resolution of a type adopts the
    /// cached copy if it is still there. Attachments made with [`attach`](Self::attach)
    /// after a type was built are not in that copy.
    pub fn reset(&self) {
        let mut descriptors = self.descriptors.write();
        debug!("Resetting {} in-memory descriptors", descriptors.len());
        descriptors.clear();
    }
}

impl Default for AttachmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::MethodSet;
    use crate::types::TypeKind;
    use serde_json::Value;

    struct Post;

    impl Extensible for Post {
        const TYPE_NAME: &'static str = "blog.Post";
    }

    struct Content;

    impl Extensible for Content {
        const TYPE_NAME: &'static str = "blog.Content";
        const KIND: TypeKind = TypeKind::Abstract;
    }

    struct Impostor;

    impl Extensible for Impostor {
        const TYPE_NAME: &'static str = "blog.Post";
    }

    fn slugger() -> Arc<dyn Delegate> {
        Arc::new(MethodSet::new("slugger").method("slug", ["owner"], |_, _| {
            Ok(Value::from("a-post"))
        }))
    }

    #[test]
    fn test_name_resolution_requires_registration() {
        let registry = AttachmentRegistry::new();
        let err = registry.resolve_descriptor("blog.Post").unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedType { .. }));

        registry.register_type::<Post>().unwrap();
        assert!(registry.resolve_descriptor("blog.Post").unwrap().is_empty());
    }

    #[test]
    fn test_instance_resolution_registers_type() {
        let registry = AttachmentRegistry::new();
        let post = Post;
        let receiver: &dyn crate::types::Receiver = &post;
        registry.resolve_descriptor(receiver).unwrap();
        assert!(registry.is_registered("blog.Post"));
    }

    #[test]
    fn test_conflicting_type_names_rejected() {
        let registry = AttachmentRegistry::new();
        registry.register_type::<Post>().unwrap();
        registry.register_type::<Post>().unwrap();
        assert!(matches!(
            registry.register_type::<Impostor>(),
            Err(RegistryError::TypeNameConflict { .. })
        ));
    }

    #[test]
    fn test_abstract_types_are_never_cached() {
        let registry = AttachmentRegistry::new();
        let first = registry.descriptor_of::<Content>().unwrap();
        let second = registry.descriptor_of::<Content>().unwrap();
        assert!(first.is_empty());
        assert!(!first.is_cached());
        assert!(!first.ptr_eq(&second));
        assert!(registry.cached_types().is_empty());

        registry.register_abstract("blog.Media").unwrap();
        assert!(!registry.resolve_descriptor("blog.Media").unwrap().is_cached());
    }

    #[test]
    fn test_attach_to_abstract_type_rejected() {
        let registry = AttachmentRegistry::new();
        let err = registry
            .attach_to::<Content>("slug", slugger(), "slug")
            .unwrap_err();
        assert!(matches!(err, RegistryError::AbstractType { .. }));
    }

    #[test]
    fn test_attach_registers_delegate_and_creates_descriptor() {
        let registry = AttachmentRegistry::new();
        registry.attach_to::<Post>("slug", slugger(), "slug").unwrap();

        assert!(registry.delegate("slugger").is_some());
        assert_eq!(registry.cached_types(), [TypeKey::new("blog.Post")]);
        let listed = registry.list_attached("blog.Post").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "slug");
    }

    #[test]
    fn test_resolution_returns_shared_handle() {
        let registry = AttachmentRegistry::new();
        let a = registry.descriptor_of::<Post>().unwrap();
        let b = registry.descriptor_of::<Post>().unwrap();
        assert!(a.ptr_eq(&b));
        assert!(a.is_cached());

        registry.reset();
        assert!(registry.cached_types().is_empty());
        let c = registry.descriptor_of::<Post>().unwrap();
        assert!(!a.ptr_eq(&c));
    }
}
