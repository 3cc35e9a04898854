//! Type identity for the extension system.
//!
//! A type takes part in method attachment by implementing [`Extensible`]. Its identity
//! is a stable name ([`TypeKey`]) rather than a `TypeId`, so descriptors can be keyed
//! the same way in the in-memory table and in a cache that outlives the process.

use crate::descriptor::TypeDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;

/// Stable, process-independent identity of an extensible type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Whether a type can own a cached descriptor.
///
/// Abstract types (family bases, marker types) always resolve to a fresh empty
/// descriptor and never reach the builder hook or the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Concrete,
    Abstract,
}

/// A type whose instances can receive attached methods.
///
/// # Example
///
/// ```
/// use annex_core::{Extensible, TypeDescriptor, TypeKey};
///
/// struct Invoice {
///     total: u64,
/// }
///
/// impl Extensible for Invoice {
///     const TYPE_NAME: &'static str = "billing.Invoice";
/// }
///
/// let descriptor = Invoice::build_descriptor(&TypeKey::new(Invoice::TYPE_NAME));
/// assert!(descriptor.is_empty());
/// # let _ = Invoice { total: 0 }.total;
/// ```
pub trait Extensible: Any + Send + Sync {
    /// Stable name; becomes the type's [`TypeKey`] and its cache key suffix.
    const TYPE_NAME: &'static str;

    const KIND: TypeKind = TypeKind::Concrete;

    /// Builder hook, run once per cache miss.
    ///
    /// Receives only the type identity. Override it to declare the type's own
    /// attachments up front with [`TypeDescriptor::attach`].
    fn build_descriptor(ty: &TypeKey) -> TypeDescriptor {
        TypeDescriptor::new(ty.clone())
    }

    /// Operations defined directly on the type, looked up by name.
    ///
    /// `None` means the type has no such operation of its own, which is what sends a
    /// call on to the registry.
    fn call_direct(&self, _operation: &str, _args: &[Value]) -> Option<anyhow::Result<Value>> {
        None
    }
}

/// Copyable per-type record the registry keeps in its type catalog.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    name: &'static str,
    kind: TypeKind,
    type_id: Option<TypeId>,
    build: fn(&TypeKey) -> TypeDescriptor,
}

impl TypeInfo {
    pub fn of<T: Extensible>() -> Self {
        Self {
            name: T::TYPE_NAME,
            kind: T::KIND,
            type_id: Some(TypeId::of::<T>()),
            build: T::build_descriptor,
        }
    }

    /// An abstract type known only by name, with no Rust type behind it.
    pub fn abstract_named(name: &'static str) -> Self {
        Self {
            name,
            kind: TypeKind::Abstract,
            type_id: None,
            build: empty_descriptor,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self) -> TypeKey {
        TypeKey::new(self.name)
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.kind == TypeKind::Abstract
    }

    pub(crate) fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub(crate) fn build_descriptor(&self) -> TypeDescriptor {
        (self.build)(&self.key())
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn empty_descriptor(ty: &TypeKey) -> TypeDescriptor {
    TypeDescriptor::new(ty.clone())
}

/// Object-safe view of an extensible instance.
///
/// Implemented for every [`Extensible`] type. Delegates receive the instance a call
/// was made on as `&dyn Receiver` and downcast it to the concrete type they expect.
pub trait Receiver: Send + Sync {
    fn type_info(&self) -> TypeInfo;

    fn as_any(&self) -> &dyn Any;

    fn call_direct(&self, operation: &str, args: &[Value]) -> Option<anyhow::Result<Value>>;
}

impl<T: Extensible> Receiver for T {
    fn type_info(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_direct(&self, operation: &str, args: &[Value]) -> Option<anyhow::Result<Value>> {
        Extensible::call_direct(self, operation, args)
    }
}

impl dyn Receiver + '_ {
    pub fn type_name(&self) -> &'static str {
        self.type_info().name()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A type, given by instance, by type record, or by name.
#[derive(Clone, Copy)]
pub enum TypeTarget<'a> {
    Instance(&'a dyn Receiver),
    Info(TypeInfo),
    Name(&'a str),
}

impl TypeTarget<'_> {
    /// Name used in error messages before the target has been resolved.
    pub fn display_name(&self) -> &str {
        match self {
            TypeTarget::Instance(instance) => instance.type_name(),
            TypeTarget::Info(info) => info.name(),
            TypeTarget::Name(name) => name,
        }
    }
}

impl<'a> From<&'a dyn Receiver> for TypeTarget<'a> {
    fn from(instance: &'a dyn Receiver) -> Self {
        TypeTarget::Instance(instance)
    }
}

impl From<TypeInfo> for TypeTarget<'_> {
    fn from(info: TypeInfo) -> Self {
        TypeTarget::Info(info)
    }
}

impl<'a> From<&'a str> for TypeTarget<'a> {
    fn from(name: &'a str) -> Self {
        TypeTarget::Name(name)
    }
}

impl<'a> From<&'a TypeKey> for TypeTarget<'a> {
    fn from(key: &'a TypeKey) -> Self {
        TypeTarget::Name(key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    impl Extensible for Widget {
        const TYPE_NAME: &'static str = "ui.Widget";

        fn call_direct(&self, operation: &str, _args: &[Value]) -> Option<anyhow::Result<Value>> {
            (operation == "kind").then(|| Ok(Value::from("widget")))
        }
    }

    struct Shape;

    impl Extensible for Shape {
        const TYPE_NAME: &'static str = "geo.Shape";
        const KIND: TypeKind = TypeKind::Abstract;
    }

    #[test]
    fn test_type_info_of() {
        let info = TypeInfo::of::<Widget>();
        assert_eq!(info.name(), "ui.Widget");
        assert_eq!(info.key(), TypeKey::new("ui.Widget"));
        assert!(!info.is_abstract());
        assert_eq!(info.type_id(), Some(TypeId::of::<Widget>()));
        assert!(info.build_descriptor().is_empty());

        assert!(TypeInfo::of::<Shape>().is_abstract());
        assert!(TypeInfo::abstract_named("geo.Solid").type_id().is_none());
    }

    #[test]
    fn test_receiver_downcast_and_direct_call() {
        let widget = Widget;
        let receiver: &dyn Receiver = &widget;

        assert_eq!(receiver.type_name(), "ui.Widget");
        assert!(receiver.is::<Widget>());
        assert!(receiver.downcast_ref::<Shape>().is_none());

        let direct = receiver.call_direct("kind", &[]).unwrap().unwrap();
        assert_eq!(direct, Value::from("widget"));
        assert!(receiver.call_direct("resize", &[]).is_none());
    }

    #[test]
    fn test_target_display_name() {
        let widget = Widget;
        let receiver: &dyn Receiver = &widget;
        assert_eq!(TypeTarget::from(receiver).display_name(), "ui.Widget");
        assert_eq!(TypeTarget::from("blog.Post").display_name(), "blog.Post");
        assert_eq!(
            TypeTarget::from(TypeInfo::of::<Shape>()).display_name(),
            "geo.Shape"
        );
    }
}
