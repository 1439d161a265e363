use super::r#trait::{ActivityContext, Runnable};
use crate::error::ActivityResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Executes a discovered script for one target. Provided by the embedding
/// engine, which owns the scripting VM.
pub trait ScriptRunner: Send + Sync {
    fn run_script(&self, script: &Path, ctx: &ActivityContext) -> ActivityResult;
}

/// Activity backed by a script file.
pub struct ScriptActivity {
    script: PathBuf,
    runner: Arc<dyn ScriptRunner>,
}

impl ScriptActivity {
    pub fn new(script: impl Into<PathBuf>, runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            script: script.into(),
            runner,
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl Runnable for ScriptActivity {
    fn run(&self, ctx: &ActivityContext) -> ActivityResult {
        self.runner.run_script(&self.script, ctx)
    }
}
