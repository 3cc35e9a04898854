//! Greeter example - attach a logger's method to a type and call it by alias.
//!
//! Pass a path to keep descriptors in a SQLite database between runs:
//!
//! ```text
//! cargo run --example greeter -- /tmp/annex-demo.sqlite
//! ```

use annex_core::{AttachmentRegistry, Extensible, MethodSet, Result, TypeDescriptor, TypeKey, Value};
use std::sync::Arc;

struct Greeter {
    name: String,
}

impl Extensible for Greeter {
    const TYPE_NAME: &'static str = "demo.Greeter";

    fn build_descriptor(ty: &TypeKey) -> TypeDescriptor {
        println!("Building descriptor for {}", ty);
        let mut descriptor = TypeDescriptor::new(ty.clone());
        descriptor.attach("greet", logger(), "logMessage");
        descriptor
    }

    fn call_direct(&self, operation: &str, _args: &[Value]) -> Option<anyhow::Result<Value>> {
        (operation == "name").then(|| Ok(Value::from(self.name.clone())))
    }
}

fn logger() -> Arc<MethodSet> {
    Arc::new(
        MethodSet::new("logger").method("logMessage", ["owner", "msg"], |owner, args| {
            let who = owner
                .downcast_ref::<Greeter>()
                .map(|g| g.name.as_str())
                .unwrap_or("someone");
            let msg = args[0].as_str().unwrap_or_default();
            Ok(Value::from(format!("LOG:{} says {}", who, msg)))
        }),
    )
}

fn main() -> Result<()> {
    let mut builder = AttachmentRegistry::builder();
    if let Some(path) = std::env::args().nth(1) {
        println!("Using descriptor cache at {}", path);
        builder = builder.sqlite_cache(path);
    }
    let registry = builder.build()?;
    // Descriptors adopted from the database name the delegate; make it resolvable.
    registry.register_delegate(logger());

    let greeter = Greeter {
        name: "Ada".to_string(),
    };
    let bound = registry.bind(&greeter);

    println!("name  -> {}", bound.call("name", &[])?);
    println!("greet -> {}", bound.call("greet", &[Value::from("hi")])?);

    println!("Attached to {}:", Greeter::TYPE_NAME);
    for (alias, op) in registry.list_attached(Greeter::TYPE_NAME)? {
        println!(
            "  - {} -> {}.{} ({} parameter(s))",
            alias,
            op.delegate_name(),
            op.delegate_operation(),
            op.parameter_count()?
        );
    }

    match bound.call("wave", &[]) {
        Err(e) if e.is_unknown_operation() => println!("wave  -> {}", e),
        other => println!("wave  -> unexpected {:?}", other),
    }

    Ok(())
}
