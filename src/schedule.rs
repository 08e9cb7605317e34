// Active window gate for unattended refresh runs

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ConfigError;
use crate::store::{ConfigStore, NSP_SECTION};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Australia::Melbourne;
pub const DEFAULT_START_HOUR: u32 = 5;
pub const DEFAULT_END_HOUR: u32 = 22;

const WORKING_HOURS_KEY: &str = "working_hours";
const TIMEZONE_KEY: &str = "timezone";

/// Half-open hour test `start_hour <= local hour < end_hour` in `tz`
pub fn is_active_time(now: DateTime<Utc>, tz: Tz, start_hour: u32, end_hour: u32) -> bool {
    let hour = now.with_timezone(&tz).hour();
    start_hour <= hour && hour < end_hour
}

/// Daily window during which scheduled refreshes may run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveWindow {
    pub timezone: Tz,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            start_hour: DEFAULT_START_HOUR,
            end_hour: DEFAULT_END_HOUR,
        }
    }
}

impl ActiveWindow {
    /// Read `working_hours` and `timezone` from the [NSP] section, defaulting when absent
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let mut window = Self::default();

        if let Some(tz) = non_blank(store.get_opt(NSP_SECTION, TIMEZONE_KEY)) {
            window.timezone = tz.parse::<Tz>().map_err(|_| ConfigError::Invalid {
                key: TIMEZONE_KEY.to_string(),
                reason: format!("unknown timezone '{}'", tz),
            })?;
        }

        if let Some(hours) = non_blank(store.get_opt(NSP_SECTION, WORKING_HOURS_KEY)) {
            let (start, end) = parse_working_hours(hours)?;
            window.start_hour = start;
            window.end_hour = end;
        }

        Ok(window)
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        is_active_time(now, self.timezone, self.start_hour, self.end_hour)
    }
}

impl std::fmt::Display for ActiveWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:00 - {:02}:00 {}",
            self.start_hour,
            self.end_hour,
            self.timezone.name()
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse `"5-22"` or `"05:00-22:00"` into a start/end hour pair
fn parse_working_hours(value: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: WORKING_HOURS_KEY.to_string(),
        reason: format!("'{}': {}", value, reason),
    };

    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| invalid("expected START-END"))?;

    let hour = |part: &str| -> Result<u32, ConfigError> {
        let part = part.trim();
        let hour = match part.split_once(':') {
            Some((h, m)) if m.trim() == "00" => h,
            Some(_) => return Err(invalid("only whole hours are supported")),
            None => part,
        };
        hour.trim()
            .parse::<u32>()
            .ok()
            .filter(|h| *h <= 24)
            .ok_or_else(|| invalid("hours must be between 0 and 24"))
    };

    let (start, end) = (hour(start)?, hour(end)?);
    if start >= end {
        return Err(invalid("start must be before end"));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// UTC instant for a Melbourne wall-clock time
    fn melbourne(hour: u32, minute: u32) -> DateTime<Utc> {
        DEFAULT_TIMEZONE
            .with_ymd_and_hms(2025, 1, 28, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_window_boundaries() {
        let tz = DEFAULT_TIMEZONE;
        assert!(!is_active_time(melbourne(4, 59), tz, 5, 22));
        assert!(is_active_time(melbourne(5, 0), tz, 5, 22));
        assert!(is_active_time(melbourne(21, 59), tz, 5, 22));
        assert!(!is_active_time(melbourne(22, 0), tz, 5, 22));
    }

    #[test]
    fn test_uses_named_timezone_not_utc() {
        // 05:30 in Melbourne (UTC+11 in January) is 18:30 UTC the previous day
        let now = melbourne(5, 30);
        assert_eq!(now.hour(), 18);
        assert!(is_active_time(now, DEFAULT_TIMEZONE, 5, 22));
        assert!(!is_active_time(now, chrono_tz::UTC, 5, 18));
    }

    #[test]
    fn test_parse_working_hours() {
        assert_eq!(parse_working_hours("5-22").unwrap(), (5, 22));
        assert_eq!(parse_working_hours("05:00-22:00").unwrap(), (5, 22));
        assert_eq!(parse_working_hours(" 0 - 24 ").unwrap(), (0, 24));
        assert!(parse_working_hours("22-5").is_err());
        assert!(parse_working_hours("05:30-22:00").is_err());
        assert!(parse_working_hours("morning").is_err());
        assert!(parse_working_hours("5-25").is_err());
    }

    #[test]
    fn test_window_from_store() {
        let store = ConfigStore::parse(
            "test.ini",
            "[NSP]\nworking_hours = 07:00-19:00\ntimezone = Europe/Paris\n",
        )
        .unwrap();
        let window = ActiveWindow::from_store(&store).unwrap();
        assert_eq!(window.start_hour, 7);
        assert_eq!(window.end_hour, 19);
        assert_eq!(window.timezone, chrono_tz::Europe::Paris);
        assert_eq!(window.to_string(), "07:00 - 19:00 Europe/Paris");
    }

    #[test]
    fn test_window_defaults() {
        let store = ConfigStore::parse("test.ini", "[NSP]\nworking_hours =\n").unwrap();
        assert_eq!(ActiveWindow::from_store(&store).unwrap(), ActiveWindow::default());
    }

    #[test]
    fn test_unknown_timezone() {
        let store = ConfigStore::parse("test.ini", "[NSP]\ntimezone = Mars/Olympus\n").unwrap();
        assert!(matches!(
            ActiveWindow::from_store(&store),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
