//! # Netmon - periodic activities and timeseries export
//!
//! The maintenance half of a network traffic monitoring engine.
//!
//! ## Features
//!
//! - **Periodic activities**: per-interface and system-wide scripts or Rust
//!   activities run every second, minute, five minutes, hour or day
//! - **Bounded worker pool**: sized from the discovered script inventory,
//!   never queues, never runs the same activity twice at once
//! - **Daily fallback**: daily work that finds the pool busy moves to
//!   `daily_delayed` and runs as soon as a worker frees up
//! - **Timeseries export**: per-interface buffering of serialized points into
//!   rotating dump files, with retry, drop and failure accounting
//! - **Introspection**: read-only tables for the management console
//! - **Config support**: TOML or YAML files with `APP_` environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netmon::{
//!     ActivityContext, ActivityResult, Cadence, InterfaceRef, PeriodicActivitiesBuilder,
//!     RuntimeConfig, Scope, TimeseriesExporter,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RuntimeConfig::from_toml("config/netmon.toml")?;
//!     let eth0 = InterfaceRef::new(0, "eth0");
//!     let exporter = Arc::new(TimeseriesExporter::new(eth0.clone(), &config.exporter));
//!
//!     let sink = exporter.clone();
//!     let scheduler = PeriodicActivitiesBuilder::with_settings(config.scheduler)
//!         .interface(eth0)
//!         .register(
//!             "interface/traffic_points",
//!             Cadence::Periodic(Duration::from_secs(60)),
//!             Scope::PerInterface,
//!             move |ctx: &ActivityContext| -> ActivityResult {
//!                 let line = format!("iface:traffic,ifid={} bytes=0\n", ctx.interface.id);
//!                 sink.export_data(line.as_bytes());
//!                 Ok(())
//!             },
//!         )
//!         .build();
//!
//!     scheduler.start_periodic_activities_loop()?;
//!     assert!(scheduler.is_running());
//!     # scheduler.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Create `config/netmon.toml`:
//!
//! ```toml
//! [scheduler]
//! scripts_dir = "${paths.scripts:/usr/share/netmon/scripts/callbacks}"
//! tick = "1s"
//! daily_at = "00:00"
//! min_threads = 2
//! disabled = ["system/hourly"]
//!
//! [exporter]
//! dump_dir = "/var/lib/netmon"
//! capacity = 65536
//! flush_interval = "60s"
//! rotation = "1h"
//! max_retries = 3
//! ```
//!
//! Scripts are discovered under `<scripts_dir>/interface` and
//! `<scripts_dir>/system`; the file stem selects the cadence (`second`,
//! `minute`, `5min`, `hourly`, `daily`, or a shorthand such as `30s`).

// Re-export core types
pub use netmon_runtime::{
    discover_scripts, load_toml_config, load_yaml_config, threads_per_pool, ActivitiesSnapshot,
    ActivityContext, ActivityResult, ActivitySnapshot, Cadence, ConfigError, Console, DumpSink,
    ExportGuard, ExportStats, ExporterSettings, ExporterSnapshot, FileSink, InterfaceRef,
    JsonConsole, PeriodicActivities, PeriodicActivitiesBuilder, Runnable, RuntimeConfig,
    SchedulerError, SchedulerSettings, Scope, ScriptActivity, ScriptInventory, ScriptRunner,
    TargetSnapshot, TimeUnit, TimeseriesExporter, MAX_ACTIVITIES,
};

// Make netmon_runtime available for lower-level access
pub use netmon_runtime;
