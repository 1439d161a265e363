use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Identifier of the pseudo-interface that stands for the whole system.
pub const SYSTEM_INTERFACE_ID: i32 = -1;

/// Lightweight reference to a monitored network interface.
///
/// The runtime never touches the interface itself; it only needs a stable id
/// for fan-out, dump file layout and introspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InterfaceRef {
    pub id: i32,
    pub name: Arc<str>,
}

impl InterfaceRef {
    pub fn new(id: i32, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The system pseudo-interface used by system-wide activities.
    pub fn system() -> Self {
        Self::new(SYSTEM_INTERFACE_ID, "system")
    }

    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_INTERFACE_ID
    }
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.id)
    }
}
