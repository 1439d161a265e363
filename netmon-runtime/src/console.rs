//! Read-only introspection towards the embedded management console.
//!
//! The console is an external collaborator. The runtime only pushes named,
//! structured tables into it; it never reads anything back.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Sink for introspection tables, implemented by the embedding console.
pub trait Console {
    /// Publish `table` under `name`, replacing any previous value.
    fn push_table(&mut self, name: &str, table: Value);
}

/// In-memory console collecting tables into a JSON object.
#[derive(Debug, Default, Clone)]
pub struct JsonConsole {
    tables: Map<String, Value>,
}

impl JsonConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.tables.get(name)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.tables)
    }
}

impl Console for JsonConsole {
    fn push_table(&mut self, name: &str, table: Value) {
        self.tables.insert(name.to_string(), table);
    }
}

/// Serialize `snapshot` and push it; a snapshot that fails to serialize is
/// logged and skipped.
pub(crate) fn publish<T: Serialize>(console: &mut dyn Console, name: &str, snapshot: &T) {
    match serde_json::to_value(snapshot) {
        Ok(value) => console.push_table(name, value),
        Err(e) => warn!(table = name, error = %e, "Failed to serialize introspection table"),
    }
}
