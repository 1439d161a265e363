use crate::time_unit::TimeUnit;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub(crate) const DAY: Duration = Duration::from_secs(86_400);

/// How often a slot becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Due whenever the interval has elapsed since the last submission.
    Periodic(Duration),
    /// Due once a day at the configured time of day.
    Daily,
    /// Fallback path for daily work the pool could not take on time.
    DailyDelayed,
}

impl Cadence {
    /// Map a script stem to its cadence.
    ///
    /// Accepts the classic callback names (`second`, `minute`, `5min`,
    /// `hourly`, `daily`) and duration shorthands such as `30s`.
    pub fn from_script_name(stem: &str) -> Option<Self> {
        match stem {
            "second" => Some(Cadence::Periodic(Duration::from_secs(1))),
            "minute" => Some(Cadence::Periodic(Duration::from_secs(60))),
            "5min" => Some(Cadence::Periodic(Duration::from_secs(300))),
            "hourly" => Some(Cadence::Periodic(Duration::from_secs(3600))),
            "daily" => Some(Cadence::Daily),
            other => TimeUnit::parse_duration(other)
                .map(|(value, unit)| unit.to_duration(value))
                .filter(|interval| !interval.is_zero())
                .map(Cadence::Periodic),
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Cadence::Periodic(_) => "periodic",
            Cadence::Daily => "daily",
            Cadence::DailyDelayed => "daily_delayed",
        }
    }

    /// Nominal distance between two runs.
    pub fn interval(&self) -> Duration {
        match self {
            Cadence::Periodic(interval) => *interval,
            Cadence::Daily | Cadence::DailyDelayed => DAY,
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, Cadence::Daily)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Periodic(interval) => write!(f, "periodic({}ms)", interval.as_millis()),
            other => f.write_str(other.class()),
        }
    }
}

/// Whether a slot runs once per monitored interface or once for the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    PerInterface,
    SystemWide,
}

impl Scope {
    /// Directory name used by script discovery.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Scope::PerInterface => "interface",
            Scope::SystemWide => "system",
        }
    }
}
