use std::time::Duration;

/// Time unit used by interval settings such as the scheduler tick or the
/// exporter flush interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    /// Parse TimeUnit from its full lowercase name: "milliseconds", "seconds",
    /// "minutes", "hours", "days".
    /// For shorthand notations like "5s", "10m", use `parse_duration` instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "milliseconds" => Ok(TimeUnit::Milliseconds),
            "seconds" => Ok(TimeUnit::Seconds),
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            "days" => Ok(TimeUnit::Days),
            _ => Err(format!("Invalid time unit: {}", s)),
        }
    }
}

impl TimeUnit {
    pub fn to_millis(&self, value: u64) -> u64 {
        match self {
            TimeUnit::Milliseconds => value,
            TimeUnit::Seconds => value.saturating_mul(1000),
            TimeUnit::Minutes => value.saturating_mul(60_000),
            TimeUnit::Hours => value.saturating_mul(3_600_000),
            TimeUnit::Days => value.saturating_mul(86_400_000),
        }
    }

    pub fn to_duration(&self, value: u64) -> Duration {
        Duration::from_millis(self.to_millis(value))
    }

    /// Parse a duration string like "5s", "10m", "2h", "500ms"
    /// Returns (value, TimeUnit) if successful
    ///
    /// Only lowercase suffixes are accepted and no space is allowed between
    /// the number and the suffix.
    pub fn parse_duration(s: &str) -> Option<(u64, TimeUnit)> {
        let s = s.trim();

        let split_pos = s.find(|c: char| !c.is_ascii_digit())?;
        if split_pos == 0 {
            return None;
        }

        let (num_str, unit_str) = s.split_at(split_pos);
        let value = num_str.parse::<u64>().ok()?;

        let time_unit = match unit_str {
            "ms" => TimeUnit::Milliseconds,
            "s" => TimeUnit::Seconds,
            "m" => TimeUnit::Minutes,
            "h" => TimeUnit::Hours,
            "d" => TimeUnit::Days,
            _ => return None,
        };

        Some((value, time_unit))
    }
}

/// Resolve a duration setting: shorthand ("30s") or a plain number read in
/// `default_unit`.
pub fn parse_duration_setting(value: &str, default_unit: TimeUnit) -> Option<Duration> {
    if let Some((amount, unit)) = TimeUnit::parse_duration(value) {
        return Some(unit.to_duration(amount));
    }
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|amount| default_unit.to_duration(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_suffixes() {
        assert_eq!(TimeUnit::parse_duration("500ms"), Some((500, TimeUnit::Milliseconds)));
        assert_eq!(TimeUnit::parse_duration("5m"), Some((5, TimeUnit::Minutes)));
        assert_eq!(TimeUnit::parse_duration("1d"), Some((1, TimeUnit::Days)));
        assert_eq!(TimeUnit::parse_duration("10S"), None);
        assert_eq!(TimeUnit::parse_duration("s"), None);
        assert_eq!(TimeUnit::parse_duration("42"), None);
    }

    #[test]
    fn plain_numbers_use_the_default_unit() {
        assert_eq!(
            parse_duration_setting("60", TimeUnit::Seconds),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            parse_duration_setting("1h", TimeUnit::Seconds),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(parse_duration_setting("soon", TimeUnit::Seconds), None);
    }

    #[test]
    fn full_names_parse_case_insensitively() {
        assert_eq!("Hours".parse::<TimeUnit>(), Ok(TimeUnit::Hours));
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }
}
