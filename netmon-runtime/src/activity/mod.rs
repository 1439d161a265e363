mod cadence;
mod discovery;
mod r#trait;
mod script;

pub use cadence::{Cadence, Scope};
pub use discovery::{discover_scripts, threads_per_pool, ScriptInventory};
pub use r#trait::{ActivityContext, Runnable};
pub use script::{ScriptActivity, ScriptRunner};
