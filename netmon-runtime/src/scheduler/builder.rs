use super::periodic::{ActivitySpec, PeriodicActivities};
use crate::activity::{Cadence, Runnable, ScriptRunner, Scope};
use crate::config::{load_toml_config, load_yaml_config, RuntimeConfig, SchedulerSettings};
use crate::error::ConfigError;
use crate::interface::InterfaceRef;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Builder for [`PeriodicActivities`]
pub struct PeriodicActivitiesBuilder {
    settings: SchedulerSettings,
    interfaces: Vec<InterfaceRef>,
    runner: Option<Arc<dyn ScriptRunner>>,
    activities: Vec<ActivitySpec>,
}

impl Default for PeriodicActivitiesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicActivitiesBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::with_settings(SchedulerSettings::default())
    }

    pub fn with_settings(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            interfaces: Vec::new(),
            runner: None,
            activities: Vec::new(),
        }
    }

    /// Create with the `[scheduler]` table of a TOML config file
    pub fn with_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = RuntimeConfig::from_config(&load_toml_config(path)?)?;
        Ok(Self::with_settings(config.scheduler))
    }

    /// Create with the `[scheduler]` table of a YAML config file
    pub fn with_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = RuntimeConfig::from_config(&load_yaml_config(path)?)?;
        Ok(Self::with_settings(config.scheduler))
    }

    /// Add a monitored interface. Per-interface activities run once for each.
    pub fn interface(mut self, interface: InterfaceRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn interfaces<I>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = InterfaceRef>,
    {
        self.interfaces.extend(interfaces);
        self
    }

    /// Runner used to execute discovered scripts. Without one, discovered
    /// scripts still size the pool but are not scheduled.
    pub fn script_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register an activity alongside the discovered scripts
    ///
    /// # Example
    ///
    /// ```rust
    /// use netmon_runtime::{ActivityContext, ActivityResult, Cadence, PeriodicActivitiesBuilder, Scope};
    /// use std::time::Duration;
    ///
    /// let scheduler = PeriodicActivitiesBuilder::new()
    ///     .register(
    ///         "system/housekeeping",
    ///         Cadence::Periodic(Duration::from_secs(5)),
    ///         Scope::SystemWide,
    ///         |_: &ActivityContext| -> ActivityResult { Ok(()) },
    ///     )
    ///     .build();
    /// assert!(!scheduler.is_running());
    /// ```
    pub fn register<T>(mut self, name: impl Into<String>, cadence: Cadence, scope: Scope, instance: T) -> Self
    where
        T: Runnable + 'static,
    {
        self.activities.push(ActivitySpec {
            name: name.into(),
            cadence,
            scope,
            handle: Arc::new(instance),
        });
        self
    }

    /// Build the scheduler (does not start it yet)
    pub fn build(self) -> PeriodicActivities {
        info!(
            registered_activities = self.activities.len(),
            interfaces = self.interfaces.len(),
            script_runner = self.runner.is_some(),
            "Building periodic activities"
        );
        PeriodicActivities::new(self.settings, self.interfaces, self.runner, self.activities)
    }
}
