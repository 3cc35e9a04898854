//! Attached operations: an alias bound to an operation on a delegate.

use crate::delegate::{Delegate, OperationSignature, Parameter, SourceLocation};
use crate::error::{RegistryError, Result};
use crate::types::Receiver;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Immutable record binding `alias` to `delegate_operation` on a delegate.
///
/// The delegate is shared with client code; the registry never manages its lifetime
/// beyond holding a reference count. The operation name is resolved against the
/// delegate when it is used, so a binding to a missing operation is only reported
/// at introspection or call time.
#[derive(Clone)]
pub struct AttachedOperation {
    delegate: Arc<dyn Delegate>,
    delegate_operation: String,
    alias: String,
}

impl AttachedOperation {
    pub fn new(
        delegate: Arc<dyn Delegate>,
        delegate_operation: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            delegate,
            delegate_operation: delegate_operation.into(),
            alias: alias.into(),
        }
    }

    pub fn delegate(&self) -> &Arc<dyn Delegate> {
        &self.delegate
    }

    pub fn delegate_name(&self) -> &str {
        self.delegate.name()
    }

    pub fn delegate_operation(&self) -> &str {
        &self.delegate_operation
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The delegate's full signature, receiver parameter included.
    pub fn signature(&self) -> Result<&OperationSignature> {
        self.delegate
            .signature(&self.delegate_operation)
            .ok_or_else(|| RegistryError::MissingDelegateOperation {
                delegate: self.delegate.name().to_string(),
                operation: self.delegate_operation.clone(),
            })
    }

    /// Parameters a caller passes: the delegate's list without the receiver.
    pub fn parameters(&self) -> Result<&[Parameter]> {
        let parameters = &self.signature()?.parameters;
        Ok(parameters.get(1..).unwrap_or_default())
    }

    pub fn parameter_count(&self) -> Result<usize> {
        Ok(self.parameters()?.len())
    }

    pub fn required_parameter_count(&self) -> Result<usize> {
        Ok(self.parameters()?.iter().filter(|p| p.required).count())
    }

    pub fn location(&self) -> Result<Option<SourceLocation>> {
        Ok(self.signature()?.location)
    }

    /// Forward a call to the delegate with `receiver` in front of `args`.
    ///
    /// The delegate's result comes back as is; its error comes back as
    /// [`RegistryError::Invocation`] wrapping the original value.
    pub fn invoke(&self, receiver: &dyn Receiver, args: &[Value]) -> Result<Value> {
        self.signature()?;
        self.delegate
            .invoke(&self.delegate_operation, receiver, args)
            .map_err(RegistryError::Invocation)
    }
}

impl fmt::Debug for AttachedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedOperation")
            .field("alias", &self.alias)
            .field("delegate", &self.delegate.name())
            .field("delegate_operation", &self.delegate_operation)
            .finish()
    }
}
