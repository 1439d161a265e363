//! Startup and configuration errors.
//!
//! These are the only failures the runtime surfaces to callers. Everything
//! that happens after the scheduler is running is absorbed into logs and
//! counters.

use thiserror::Error;

/// Result of a single activity run.
pub type ActivityResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration source could not be read or deserialized.
    #[error("config error: {0}")]
    Source(#[from] config::ConfigError),

    /// A duration setting is not a number or a shorthand like "30s".
    #[error("invalid duration for '{key}': {value}")]
    InvalidDuration { key: &'static str, value: String },

    /// The daily anchor is not a valid "HH:MM" time of day.
    #[error("invalid time of day for 'scheduler.daily_at': {0}")]
    InvalidTimeOfDay(String),

    /// A value is outside its allowed range.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Errors that prevent the periodic activities loop from starting.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The worker pool runtime could not be built.
    #[error("failed to build worker pool with {threads} threads: {source}")]
    PoolConstruction {
        threads: usize,
        #[source]
        source: std::io::Error,
    },

    /// The control thread could not be spawned or did not come up.
    #[error("failed to spawn control thread: {0}")]
    ControlThread(String),

    /// More activities were registered than the slot table can hold.
    #[error("too many periodic activities: {requested} exceeds the maximum of {max}")]
    TooManyActivities { requested: usize, max: usize },

    /// Two activities share the same name.
    #[error("duplicate periodic activity '{0}'")]
    DuplicateActivity(String),

    /// `start_periodic_activities_loop` was called on a running scheduler.
    #[error("periodic activities loop already started")]
    AlreadyStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
