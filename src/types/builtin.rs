use crate::annotations::Annotations;
use crate::types::model::{BuiltinType, Type, TypeName};
use std::collections::HashMap;
use std::sync::Arc;

/// Types with a hand-written shape that are never read from source.
///
/// Filled before resolution starts and shared read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct BuiltinRegistry {
    types: HashMap<TypeName, Type>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard library types generators rely on.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("time", "Time", "date-time", Type::basic("string"));
        registry.register("time", "Duration", "duration", Type::basic("int64"));
        registry.register("encoding/json", "RawMessage", "json", Type::Array {
            element: Box::new(Type::basic("byte")),
        });
        registry
    }

    /// Registers a framework error type, e.g. `errors.CodeError`.
    pub fn register_error(&mut self, path: &str, name: &str) {
        self.register(path, name, "error", Type::basic("error"));
    }

    /// Adds or replaces a builtin. Later registrations win.
    pub fn register(&mut self, path: &str, name: &str, format: &str, underlying: Type) {
        let key = TypeName::new(path, name);
        let builtin = Type::Builtin(Arc::new(BuiltinType {
            name: key.clone(),
            annotations: Annotations::default(),
            format: format.to_string(),
            underlying,
        }));
        self.types.insert(key, builtin);
    }

    pub fn get(&self, path: &str, name: &str) -> Option<Type> {
        self.types.get(&TypeName::new(path, name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
