//! Per-type descriptors: the alias table of one extensible type.

use crate::delegate::Delegate;
use crate::operation::AttachedOperation;
use crate::types::TypeKey;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Alias table for one type, in insertion order.
///
/// A type with no attachments has an empty descriptor, never a missing one.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    type_key: TypeKey,
    operations: IndexMap<String, AttachedOperation>,
}

impl TypeDescriptor {
    pub fn new(type_key: TypeKey) -> Self {
        Self {
            type_key,
            operations: IndexMap::new(),
        }
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    pub fn lookup(&self, alias: &str) -> Option<&AttachedOperation> {
        self.operations.get(alias)
    }

    /// Upsert under the operation's alias; the last writer wins.
    ///
    /// Returns the operation that was replaced, if any. Overwrites are never refused.
    pub fn insert(&mut self, operation: AttachedOperation) -> Option<AttachedOperation> {
        let alias = operation.alias().to_string();
        let replaced = self.operations.insert(alias, operation);
        if let Some(previous) = &replaced {
            debug!(
                "Alias '{}' on {} rebound (was {}.{})",
                previous.alias(),
                self.type_key,
                previous.delegate_name(),
                previous.delegate_operation()
            );
        }
        replaced
    }

    /// Bind `alias` to `operation` on `delegate`. Meant for builder hooks.
    pub fn attach(
        &mut self,
        alias: impl Into<String>,
        delegate: Arc<dyn Delegate>,
        operation: impl Into<String>,
    ) -> &mut Self {
        self.insert(AttachedOperation::new(delegate, operation, alias));
        self
    }

    pub fn list_all(&self) -> impl Iterator<Item = (&str, &AttachedOperation)> {
        self.operations.iter().map(|(alias, op)| (alias.as_str(), op))
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Distinct delegates referenced by this descriptor.
    pub fn delegates(&self) -> Vec<Arc<dyn Delegate>> {
        let mut seen: IndexMap<&str, Arc<dyn Delegate>> = IndexMap::new();
        for op in self.operations.values() {
            seen.entry(op.delegate_name())
                .or_insert_with(|| Arc::clone(op.delegate()));
        }
        seen.into_values().collect()
    }

    pub fn to_record(&self) -> DescriptorRecord {
        DescriptorRecord {
            type_name: self.type_key.to_string(),
            operations: self
                .operations
                .values()
                .map(|op| OperationRecord {
                    alias: op.alias().to_string(),
                    delegate: op.delegate_name().to_string(),
                    operation: op.delegate_operation().to_string(),
                })
                .collect(),
        }
    }

    /// Rebuild a descriptor from its cached form.
    ///
    /// `find_delegate` maps delegate names back to live delegates. Every recorded
    /// operation must still exist on the delegate it names.
    pub fn from_record<F>(record: &DescriptorRecord, mut find_delegate: F) -> Result<Self, StaleRecord>
    where
        F: FnMut(&str) -> Option<Arc<dyn Delegate>>,
    {
        let mut descriptor = TypeDescriptor::new(TypeKey::new(record.type_name.as_str()));
        for op in &record.operations {
            let delegate = find_delegate(&op.delegate).ok_or_else(|| StaleRecord::UnknownDelegate {
                delegate: op.delegate.clone(),
            })?;
            if delegate.signature(&op.operation).is_none() {
                return Err(StaleRecord::MissingOperation {
                    delegate: op.delegate.clone(),
                    operation: op.operation.clone(),
                });
            }
            descriptor.insert(AttachedOperation::new(
                delegate,
                op.operation.as_str(),
                op.alias.as_str(),
            ));
        }
        Ok(descriptor)
    }
}

/// Why a cached record no longer matches the live delegates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleRecord {
    #[error("delegate '{delegate}' is not registered")]
    UnknownDelegate { delegate: String },

    #[error("delegate '{delegate}' has no operation named '{operation}'")]
    MissingOperation { delegate: String, operation: String },
}

/// Serialized descriptor as stored in the external cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub type_name: String,
    pub operations: Vec<OperationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub alias: String,
    pub delegate: String,
    pub operation: String,
}

/// Shared handle to a resolved descriptor.
///
/// Handles for the same cached type point at the same table, so an attachment made
/// through one is visible through all of them.
#[derive(Debug, Clone)]
pub struct DescriptorHandle {
    inner: Arc<RwLock<TypeDescriptor>>,
    cached: bool,
}

impl DescriptorHandle {
    pub(crate) fn cached(descriptor: TypeDescriptor) -> Self {
        Self {
            inner: Arc::new(RwLock::new(descriptor)),
            cached: true,
        }
    }

    /// A throwaway handle that no registry entry refers to.
    pub(crate) fn detached(descriptor: TypeDescriptor) -> Self {
        Self {
            inner: Arc::new(RwLock::new(descriptor)),
            cached: false,
        }
    }

    pub fn type_key(&self) -> TypeKey {
        self.inner.read().type_key().clone()
    }

    pub fn lookup(&self, alias: &str) -> Option<AttachedOperation> {
        self.inner.read().lookup(alias).cloned()
    }

    pub fn insert(&self, operation: AttachedOperation) -> Option<AttachedOperation> {
        self.inner.write().insert(operation)
    }

    pub fn list_all(&self) -> Vec<(String, AttachedOperation)> {
        self.inner
            .read()
            .list_all()
            .map(|(alias, op)| (alias.to_string(), op.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the descriptor as it is now.
    pub fn snapshot(&self) -> TypeDescriptor {
        self.inner.read().clone()
    }

    /// Whether this handle is the registry's authoritative entry for its type.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn ptr_eq(&self, other: &DescriptorHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::MethodSet;
    use serde_json::Value;

    fn delegate(name: &str) -> Arc<dyn Delegate> {
        Arc::new(MethodSet::new(name).method("run", ["owner"], |_, _| Ok(Value::Null)))
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let descriptor = TypeDescriptor::new(TypeKey::new("t.Empty"));
        assert!(descriptor.is_empty());
        assert!(descriptor.lookup("anything").is_none());
    }

    #[test]
    fn test_insert_last_writer_wins_in_original_position() {
        let mut descriptor = TypeDescriptor::new(TypeKey::new("t.Doc"));
        descriptor
            .attach("save", delegate("first"), "run")
            .attach("load", delegate("loader"), "run");
        let replaced = descriptor.insert(AttachedOperation::new(delegate("second"), "run", "save"));

        assert_eq!(replaced.unwrap().delegate_name(), "first");
        assert_eq!(descriptor.lookup("save").unwrap().delegate_name(), "second");
        assert_eq!(descriptor.aliases(), ["save", "load"]);
        assert_eq!(descriptor.len(), 2);
    }

    #[test]
    fn test_record_roundtrip_through_directory() {
        let shared = delegate("audit");
        let mut descriptor = TypeDescriptor::new(TypeKey::new("t.Order"));
        descriptor
            .attach("audit", Arc::clone(&shared), "run")
            .attach("trace", Arc::clone(&shared), "run");
        assert_eq!(descriptor.delegates().len(), 1);

        let record = descriptor.to_record();
        let json = serde_json::to_string(&record).unwrap();
        let decoded: DescriptorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);

        let rebuilt = TypeDescriptor::from_record(&decoded, |name| {
            (name == "audit").then(|| Arc::clone(&shared))
        })
        .unwrap();
        assert_eq!(rebuilt.aliases(), ["audit", "trace"]);
        assert_eq!(rebuilt.type_key(), &TypeKey::new("t.Order"));
    }

    #[test]
    fn test_from_record_reports_unknown_delegate() {
        let record = DescriptorRecord {
            type_name: "t.Order".into(),
            operations: vec![OperationRecord {
                alias: "audit".into(),
                delegate: "gone".into(),
                operation: "run".into(),
            }],
        };
        let err = TypeDescriptor::from_record(&record, |_| None).unwrap_err();
        assert_eq!(
            err,
            StaleRecord::UnknownDelegate {
                delegate: "gone".into()
            }
        );
    }

    #[test]
    fn test_from_record_reports_missing_operation() {
        let record = DescriptorRecord {
            type_name: "t.Order".into(),
            operations: vec![OperationRecord {
                alias: "audit".into(),
                delegate: "audit".into(),
                operation: "renamed".into(),
            }],
        };
        let live = delegate("audit");
        let err = TypeDescriptor::from_record(&record, |_| Some(Arc::clone(&live))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "delegate 'audit' has no operation named 'renamed'"
        );
    }

    #[test]
    fn test_handles_share_one_table() {
        let handle = DescriptorHandle::cached(TypeDescriptor::new(TypeKey::new("t.Shared")));
        let other = handle.clone();
        other.insert(AttachedOperation::new(delegate("d"), "run", "go"));
        assert!(handle.lookup("go").is_some());
        assert!(handle.ptr_eq(&other));
        assert!(handle.is_cached());
        assert!(!DescriptorHandle::detached(handle.snapshot()).is_cached());
    }
}
