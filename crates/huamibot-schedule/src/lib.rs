//! huamibot-schedule: weekly occurrence calculation and the trigger loop.
//!
//! The occurrence calculator is a pure function over any `chrono::TimeZone`;
//! the loop in [`runner`] sleeps until the next occurrence and fires a
//! caller-supplied trigger.

pub mod occurrence;
pub mod runner;

use chrono::{NaiveTime, Weekday};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid time of day: {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
}

/// When the weekly send fires: a weekday plus a wall-clock time of day.
///
/// Immutable once constructed; the same value is used for the whole
/// process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    weekday: Weekday,
    time: NaiveTime,
}

impl ScheduleConfig {
    /// Create a schedule, validating the time of day.
    pub fn new(weekday: Weekday, hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or(ScheduleError::InvalidTime { hour, minute })?;
        Ok(Self { weekday, time })
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.time
    }
}

impl Default for ScheduleConfig {
    /// Friday at 10:00, the historical default.
    fn default() -> Self {
        Self {
            weekday: Weekday::Fri,
            time: NaiveTime::from_hms_opt(10, 0, 0).expect("10:00 is a valid time"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let s = ScheduleConfig::new(Weekday::Mon, 23, 59).unwrap();
        assert_eq!(s.weekday(), Weekday::Mon);
        assert_eq!(s.time_of_day(), NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }

    #[test]
    fn test_new_rejects_bad_time() {
        assert!(ScheduleConfig::new(Weekday::Mon, 24, 0).is_err());
        assert!(ScheduleConfig::new(Weekday::Mon, 0, 60).is_err());
    }

    #[test]
    fn test_default_is_friday_ten() {
        let s = ScheduleConfig::default();
        assert_eq!(s.weekday(), Weekday::Fri);
        assert_eq!(s.time_of_day(), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }
}
