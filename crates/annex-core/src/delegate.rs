//! Delegates: the objects that supply attached methods.
//!
//! Every delegate operation declares the receiver as its first parameter. The
//! registry supplies that argument itself when it forwards a call, which is why
//! introspection on an [`AttachedOperation`](crate::AttachedOperation) drops it.

use crate::types::Receiver;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::Location;

/// One declared parameter of a delegate operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub required: bool,
}

impl Parameter {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

impl From<&str> for Parameter {
    fn from(name: &str) -> Self {
        Parameter::required(name)
    }
}

/// Where a delegate operation was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    /// Location of the caller, for use inside `#[track_caller]` functions.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Declared shape of a delegate operation, receiver parameter included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSignature {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub location: Option<SourceLocation>,
}

impl OperationSignature {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            parameters,
            location: None,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// An object whose operations can be attached to extensible types.
pub trait Delegate: Send + Sync {
    /// Stable name. Persisted descriptors refer to the delegate by it.
    fn name(&self) -> &str;

    /// Signature of `operation`, or `None` if the delegate has no such operation.
    fn signature(&self, operation: &str) -> Option<&OperationSignature>;

    fn operations(&self) -> Vec<&OperationSignature>;

    /// Run `operation` with `receiver` as its first argument, followed by `args`.
    ///
    /// Errors are returned to the caller of the attached method unchanged.
    fn invoke(&self, operation: &str, receiver: &dyn Receiver, args: &[Value])
        -> anyhow::Result<Value>;
}

type OperationFn = Box<dyn Fn(&dyn Receiver, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

struct Method {
    signature: OperationSignature,
    func: OperationFn,
}

/// A [`Delegate`] assembled from closures.
///
/// # Example
///
/// ```
/// use annex_core::{Delegate, MethodSet, Value};
///
/// let logger = MethodSet::new("logger").method("logMessage", ["owner", "msg"], |_, args| {
///     Ok(Value::from(format!("LOG:{}", args[0].as_str().unwrap_or_default())))
/// });
/// assert_eq!(logger.signature("logMessage").unwrap().parameters.len(), 2);
/// ```
pub struct MethodSet {
    name: String,
    methods: IndexMap<String, Method>,
}

impl MethodSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: IndexMap::new(),
        }
    }

    /// Define an operation. The first parameter names the receiver.
    ///
    /// `f` gets the receiver and the caller's arguments; it is only called once the
    /// required arguments are all present. Redefining a name replaces the operation.
    #[track_caller]
    pub fn method<P, F>(mut self, name: &str, parameters: impl IntoIterator<Item = P>, f: F) -> Self
    where
        P: Into<Parameter>,
        F: Fn(&dyn Receiver, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let signature = OperationSignature::new(
            name,
            parameters.into_iter().map(Into::into).collect(),
        )
        .with_location(SourceLocation::caller());
        self.methods.insert(
            name.to_string(),
            Method {
                signature,
                func: Box::new(f),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Delegate for MethodSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self, operation: &str) -> Option<&OperationSignature> {
        self.methods.get(operation).map(|m| &m.signature)
    }

    fn operations(&self) -> Vec<&OperationSignature> {
        self.methods.values().map(|m| &m.signature).collect()
    }

    fn invoke(
        &self,
        operation: &str,
        receiver: &dyn Receiver,
        args: &[Value],
    ) -> anyhow::Result<Value> {
        let method = self.methods.get(operation).ok_or_else(|| {
            anyhow::anyhow!("{} has no operation named '{}'", self.name, operation)
        })?;

        let required = method
            .signature
            .parameters
            .iter()
            .skip(1)
            .filter(|p| p.required)
            .count();
        if args.len() < required {
            anyhow::bail!(
                "{}.{} expects at least {} argument(s), got {}",
                self.name,
                operation,
                required,
                args.len()
            );
        }

        (method.func)(receiver, args)
    }
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSet")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Extensible;

    struct Counter {
        start: i64,
    }

    impl Extensible for Counter {
        const TYPE_NAME: &'static str = "test.Counter";
    }

    fn math() -> MethodSet {
        MethodSet::new("math").method(
            "add",
            vec![
                Parameter::required("owner"),
                Parameter::required("n"),
                Parameter::optional("scale"),
            ],
            |receiver, args| {
                let counter = receiver
                    .downcast_ref::<Counter>()
                    .ok_or_else(|| anyhow::anyhow!("not a counter"))?;
                let n = args[0].as_i64().unwrap_or_default();
                let scale = args.get(1).and_then(Value::as_i64).unwrap_or(1);
                Ok(Value::from((counter.start + n) * scale))
            },
        )
    }

    #[test]
    fn test_method_set_invoke() {
        let delegate = math();
        let counter = Counter { start: 10 };

        let plain = delegate.invoke("add", &counter, &[Value::from(5)]).unwrap();
        assert_eq!(plain, Value::from(15));

        let scaled = delegate
            .invoke("add", &counter, &[Value::from(5), Value::from(2)])
            .unwrap();
        assert_eq!(scaled, Value::from(30));
    }

    #[test]
    fn test_method_set_rejects_missing_arguments() {
        let err = math().invoke("add", &Counter { start: 0 }, &[]).unwrap_err();
        assert!(err.to_string().contains("expects at least 1 argument"));
    }

    #[test]
    fn test_signature_records_definition_site() {
        let delegate = math();
        let signature = delegate.signature("add").unwrap();
        assert_eq!(signature.parameters.len(), 3);
        let location = signature.location.unwrap();
        assert!(location.file.ends_with("delegate.rs"));
        assert!(location.line > 0);
        assert!(delegate.signature("sub").is_none());
        assert_eq!(delegate.operations().len(), 1);
    }

    #[test]
    fn test_redefining_a_method_replaces_it() {
        let delegate = MethodSet::new("twice")
            .method("echo", ["owner"], |_, _| Ok(Value::from(1)))
            .method("echo", ["owner"], |_, _| Ok(Value::from(2)));
        assert_eq!(delegate.len(), 1);
        let out = delegate.invoke("echo", &Counter { start: 0 }, &[]).unwrap();
        assert_eq!(out, Value::from(2));
    }
}
