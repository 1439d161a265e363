//! Netmon Runtime - periodic activities and timeseries export
//!
//! This crate provides the runtime infrastructure of a traffic monitoring
//! engine that is not tied to packet processing: a scheduler dispatching
//! periodic maintenance activities on a bounded worker pool, and per-interface
//! exporters buffering serialized timeseries points into rotating dump files.

mod activity;
mod config;
mod console;
mod error;
mod export;
mod interface;
mod scheduler;
mod time_unit;

// Re-export public API
pub use activity::{
    discover_scripts, threads_per_pool, ActivityContext, Cadence, Runnable, ScriptActivity,
    ScriptInventory, ScriptRunner, Scope,
};
pub use config::{
    load_toml_config, load_yaml_config, resolve_config_value, ExporterSettings, RuntimeConfig,
    SchedulerSettings,
};
pub use console::{Console, JsonConsole};
pub use error::{ActivityResult, ConfigError, SchedulerError};
pub use export::{
    DumpSink, DumpStore, ExportGuard, ExportStats, ExporterSnapshot, FileSink, TimeseriesExporter,
};
pub use interface::{InterfaceRef, SYSTEM_INTERFACE_ID};
pub use scheduler::{
    ActivitiesSnapshot, ActivitySnapshot, PeriodicActivities, PeriodicActivitiesBuilder,
    Submission, TargetSnapshot, WorkerPool, MAX_ACTIVITIES,
};
pub use time_unit::{parse_duration_setting, TimeUnit};
