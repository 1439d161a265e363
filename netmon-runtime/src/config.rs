use crate::error::ConfigError;
use crate::time_unit::{parse_duration_setting, TimeUnit};
use chrono::NaiveTime;
use config::{Config, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default capacity of an export buffer in bytes.
pub const DEFAULT_EXPORT_CAPACITY: usize = 64 * 1024;
/// Default number of write retries within a single flush.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Smallest worker pool the scheduler will build.
pub const DEFAULT_MIN_THREADS: usize = 2;

/// Load config from a specific TOML file
pub fn load_toml_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
        .add_source(config::Environment::with_prefix("APP").separator("_"))
        .build()?;
    Ok(config)
}

/// Load config from a specific YAML file
pub fn load_yaml_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path.as_ref()).format(FileFormat::Yaml))
        .add_source(config::Environment::with_prefix("APP").separator("_"))
        .build()?;
    Ok(config)
}

/// Resolve config placeholder like ${paths.data} or ${paths.data:/var/lib/netmon}
pub fn resolve_config_value(value: &str, config: &Config) -> Result<String, ConfigError> {
    if value.starts_with("${") && value.ends_with('}') {
        let inner = &value[2..value.len() - 1];

        if let Some(colon_pos) = inner.find(':') {
            let key = &inner[..colon_pos];
            let default_value = &inner[colon_pos + 1..];

            match config.get_string(key) {
                Ok(resolved) => Ok(resolved),
                Err(_) => Ok(default_value.to_string()),
            }
        } else {
            Ok(config.get_string(inner)?)
        }
    } else {
        Ok(value.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawSchedulerSection {
    scripts_dir: String,
    script_extension: String,
    tick: String,
    daily_at: String,
    min_threads: usize,
    max_threads: Option<usize>,
    disabled: Vec<String>,
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            scripts_dir: "scripts/callbacks".to_string(),
            script_extension: "lua".to_string(),
            tick: "1s".to_string(),
            daily_at: "00:00".to_string(),
            min_threads: DEFAULT_MIN_THREADS,
            max_threads: None,
            disabled: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawExporterSection {
    dump_dir: String,
    base_name: String,
    capacity: usize,
    flush_interval: String,
    rotation: String,
    max_retries: u32,
}

impl Default for RawExporterSection {
    fn default() -> Self {
        Self {
            dump_dir: "data".to_string(),
            base_name: "ts_export".to_string(),
            capacity: DEFAULT_EXPORT_CAPACITY,
            flush_interval: "60s".to_string(),
            rotation: "1h".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Settings of the periodic activities scheduler (`[scheduler]` table).
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Root holding the `interface/` and `system/` script directories.
    pub scripts_dir: PathBuf,
    /// Extension of discoverable scripts, without the dot.
    pub script_extension: String,
    /// Wake interval of the control loop.
    pub tick: Duration,
    /// Time of day (UTC) at which daily activities become due.
    pub daily_at: NaiveTime,
    pub min_threads: usize,
    pub max_threads: usize,
    /// Slot names disabled at start.
    pub disabled: Vec<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let min_threads = DEFAULT_MIN_THREADS;
        Self {
            scripts_dir: PathBuf::from("scripts/callbacks"),
            script_extension: "lua".to_string(),
            tick: Duration::from_secs(1),
            daily_at: NaiveTime::MIN,
            min_threads,
            max_threads: default_max_threads(min_threads),
            disabled: Vec::new(),
        }
    }
}

/// Settings shared by every per-interface exporter (`[exporter]` table).
#[derive(Debug, Clone)]
pub struct ExporterSettings {
    pub dump_dir: PathBuf,
    pub base_name: String,
    /// Threshold capacity of the export buffer in bytes.
    pub capacity: usize,
    pub flush_interval: Duration,
    /// Length of the time window covered by a single dump file.
    pub rotation: Duration,
    pub max_retries: u32,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            dump_dir: PathBuf::from("data"),
            base_name: "ts_export".to_string(),
            capacity: DEFAULT_EXPORT_CAPACITY,
            flush_interval: Duration::from_secs(60),
            rotation: Duration::from_secs(3600),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerSettings,
    pub exporter: ExporterSettings,
}

impl RuntimeConfig {
    /// Build settings from a loaded [`Config`]. Missing tables and keys fall
    /// back to their defaults.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let raw_scheduler: RawSchedulerSection = section(config, "scheduler")?;
        let raw_exporter: RawExporterSection = section(config, "exporter")?;

        let scheduler = SchedulerSettings::from_raw(raw_scheduler, config)?;
        let exporter = ExporterSettings::from_raw(raw_exporter, config)?;
        Ok(Self { scheduler, exporter })
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_config(&load_toml_config(path)?)
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_config(&load_yaml_config(path)?)
    }
}

impl SchedulerSettings {
    fn from_raw(raw: RawSchedulerSection, config: &Config) -> Result<Self, ConfigError> {
        let tick = duration(&raw.tick, "scheduler.tick")?;
        if tick.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.tick",
                reason: "must be greater than zero".to_string(),
            });
        }

        let daily_at = NaiveTime::parse_from_str(raw.daily_at.trim(), "%H:%M")
            .map_err(|_| ConfigError::InvalidTimeOfDay(raw.daily_at.clone()))?;

        if raw.min_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.min_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        let max_threads = raw
            .max_threads
            .unwrap_or_else(|| default_max_threads(raw.min_threads));
        if max_threads < raw.min_threads {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.max_threads",
                reason: format!("{} is below min_threads ({})", max_threads, raw.min_threads),
            });
        }

        Ok(Self {
            scripts_dir: PathBuf::from(resolve_config_value(&raw.scripts_dir, config)?),
            script_extension: raw.script_extension.trim_start_matches('.').to_string(),
            tick,
            daily_at,
            min_threads: raw.min_threads,
            max_threads,
            disabled: raw.disabled,
        })
    }
}

impl ExporterSettings {
    fn from_raw(raw: RawExporterSection, config: &Config) -> Result<Self, ConfigError> {
        if raw.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "exporter.capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        let rotation = duration(&raw.rotation, "exporter.rotation")?;
        if rotation.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                key: "exporter.rotation",
                reason: "must be at least one second".to_string(),
            });
        }

        Ok(Self {
            dump_dir: PathBuf::from(resolve_config_value(&raw.dump_dir, config)?),
            base_name: raw.base_name,
            capacity: raw.capacity,
            flush_interval: duration(&raw.flush_interval, "exporter.flush_interval")?,
            rotation,
            max_retries: raw.max_retries,
        })
    }
}

fn section<T: DeserializeOwned + Default>(config: &Config, key: &str) -> Result<T, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn duration(value: &str, key: &'static str) -> Result<Duration, ConfigError> {
    parse_duration_setting(value, TimeUnit::Seconds).ok_or_else(|| ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
    })
}

fn default_max_threads(min_threads: usize) -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(min_threads)
        .max(min_threads)
}
