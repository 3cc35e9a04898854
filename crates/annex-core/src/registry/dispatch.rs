//! Call resolution for attached methods.
//!
//! A call on an extensible instance first looks for an operation defined on the
//! type itself ([`Extensible::call_direct`](crate::Extensible::call_direct)) and
//! only on a miss consults the instance type's descriptor.

use super::AttachmentRegistry;
use crate::error::{RegistryError, Result};
use crate::types::Receiver;
use serde_json::Value;
use tracing::trace;

impl AttachmentRegistry {
    /// Second phase of a call: look `operation` up in the instance type's descriptor
    /// and forward to the delegate with `instance` as the receiver.
    ///
    /// Nothing is cached on the instance; every call repeats the lookup.
    pub fn dispatch(&self, instance: &dyn Receiver, operation: &str, args: &[Value]) -> Result<Value> {
        let descriptor = self.resolve_descriptor(instance)?;
        let attached = descriptor
            .lookup(operation)
            .ok_or_else(|| RegistryError::UnknownOperation {
                type_name: instance.type_name().to_string(),
                operation: operation.to_string(),
            })?;

        trace!(
            "Dispatching {}.{} to {}.{}",
            instance.type_name(),
            operation,
            attached.delegate_name(),
            attached.delegate_operation()
        );
        attached.invoke(instance, args)
    }

    /// Pair an instance with this registry so operations can be called on it by name.
    pub fn bind<'a>(&'a self, instance: &'a dyn Receiver) -> Bound<'a> {
        Bound {
            registry: self,
            instance,
        }
    }
}

/// An instance paired with the registry that resolves its attached methods.
///
/// # Example
///
/// ```
/// use annex_core::{AttachmentRegistry, Extensible, MethodSet, Value};
/// use std::sync::Arc;
///
/// struct Greeter;
///
/// impl Extensible for Greeter {
///     const TYPE_NAME: &'static str = "demo.Greeter";
/// }
///
/// let registry = AttachmentRegistry::new();
/// let logger = MethodSet::new("logger").method("logMessage", ["owner", "msg"], |_, args| {
///     Ok(Value::from(format!("LOG:{}", args[0].as_str().unwrap_or_default())))
/// });
/// registry.attach_to::<Greeter>("greet", Arc::new(logger), "logMessage")?;
///
/// let out = registry.bind(&Greeter).call("greet", &[Value::from("hi")])?;
/// assert_eq!(out, Value::from("LOG:hi"));
/// # Ok::<(), annex_core::RegistryError>(())
/// ```
#[derive(Clone, Copy)]
pub struct Bound<'a> {
    registry: &'a AttachmentRegistry,
    instance: &'a dyn Receiver,
}

impl<'a> Bound<'a> {
    pub fn instance(&self) -> &'a dyn Receiver {
        self.instance
    }

    /// Call `operation`: the type's own operation if it has one, otherwise the
    /// attached method registered under that name.
    pub fn call(&self, operation: &str, args: &[Value]) -> Result<Value> {
        if let Some(result) = self.instance.call_direct(operation, args) {
            return result.map_err(RegistryError::Invocation);
        }
        self.registry.dispatch(self.instance, operation, args)
    }

    /// Whether `operation` resolves to an attached method on this instance's type.
    pub fn responds_to(&self, operation: &str) -> Result<bool> {
        Ok(self
            .registry
            .resolve_descriptor(self.instance)?
            .lookup(operation)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{Delegate, MethodSet};
    use crate::types::Extensible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Account {
        balance: i64,
    }

    impl Extensible for Account {
        const TYPE_NAME: &'static str = "bank.Account";

        fn call_direct(&self, operation: &str, _args: &[Value]) -> Option<anyhow::Result<Value>> {
            match operation {
                "balance" => Some(Ok(Value::from(self.balance))),
                "close" => Some(Err(anyhow::anyhow!("account is frozen"))),
                _ => None,
            }
        }
    }

    fn ledger(calls: Arc<AtomicUsize>) -> Arc<dyn Delegate> {
        Arc::new(
            MethodSet::new("ledger")
                .method("deposit", ["account", "amount"], move |receiver, args| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let account = receiver
                        .downcast_ref::<Account>()
                        .ok_or_else(|| anyhow::anyhow!("not an account"))?;
                    Ok(Value::from(account.balance + args[0].as_i64().unwrap_or_default()))
                })
                .method("balance", ["account"], |_, _| Ok(Value::from(-1)))
                .method("fail", ["account"], |_, _| {
                    Err(anyhow::anyhow!("ledger offline"))
                }),
        )
    }

    #[test]
    fn test_dispatch_forwards_receiver() {
        let registry = AttachmentRegistry::new();
        registry
            .attach_to::<Account>("deposit", ledger(Arc::default()), "deposit")
            .unwrap();

        let account = Account { balance: 100 };
        let out = registry
            .dispatch(&account, "deposit", &[Value::from(25)])
            .unwrap();
        assert_eq!(out, Value::from(125));
    }

    #[test]
    fn test_dispatch_unknown_operation() {
        let registry = AttachmentRegistry::new();
        let err = registry
            .dispatch(&Account { balance: 0 }, "withdraw", &[])
            .unwrap_err();
        assert!(err.is_unknown_operation());
        assert_eq!(
            err.to_string(),
            "Unknown operation 'withdraw' on type bank.Account"
        );
    }

    #[test]
    fn test_direct_operation_wins_over_attachment() {
        let registry = AttachmentRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .attach_to::<Account>("balance", ledger(Arc::clone(&calls)), "balance")
            .unwrap();

        let account = Account { balance: 7 };
        let bound = registry.bind(&account);
        assert_eq!(bound.call("balance", &[]).unwrap(), Value::from(7));
        assert!(bound.responds_to("balance").unwrap());
        assert!(!bound.responds_to("deposit").unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failures_surface_as_invocation_errors() {
        let registry = AttachmentRegistry::new();
        registry
            .attach_to::<Account>("fail", ledger(Arc::default()), "fail")
            .unwrap();
        let account = Account { balance: 0 };
        let bound = registry.bind(&account);

        let attached = bound.call("fail", &[]).unwrap_err();
        assert_eq!(attached.to_string(), "ledger offline");
        assert!(matches!(attached, RegistryError::Invocation(_)));

        let direct = bound.call("close", &[]).unwrap_err();
        assert_eq!(direct.to_string(), "account is frozen");
    }
}
