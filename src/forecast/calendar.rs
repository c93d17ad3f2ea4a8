//! Holiday lookup for calendar features

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::HashSet;

use crate::error::{ForecastError, Result};

/// Search horizon for holiday-distance features.
pub const HOLIDAY_SEARCH_DAYS: i64 = 365;

pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;

    /// Days since the most recent holiday strictly before `date`.
    fn days_since_last(&self, date: NaiveDate) -> i64 {
        (1..=HOLIDAY_SEARCH_DAYS)
            .find(|d| self.is_holiday(date - Duration::days(*d)))
            .unwrap_or(HOLIDAY_SEARCH_DAYS)
    }

    /// Days until the next holiday strictly after `date`.
    fn days_to_next(&self, date: NaiveDate) -> i64 {
        (1..=HOLIDAY_SEARCH_DAYS)
            .find(|d| self.is_holiday(date + Duration::days(*d)))
            .unwrap_or(HOLIDAY_SEARCH_DAYS)
    }
}

/// Fixed-date holidays: yearly recurring month/day pairs plus one-off dates.
#[derive(Debug, Clone, Default)]
pub struct FixedHolidayCalendar {
    recurring: HashSet<(u32, u32)>,
    dates: HashSet<NaiveDate>,
}

impl FixedHolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recurring(mut self, month: u32, day: u32) -> Self {
        self.recurring.insert((month, day));
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.dates.insert(date);
        self
    }

    /// Parse `"MM-DD"` recurring entries and `"YYYY-MM-DD"` dates.
    pub fn from_config(recurring: &[String], dates: &[String]) -> Result<Self> {
        let mut calendar = Self::new();
        for entry in recurring {
            let parsed = entry
                .split_once('-')
                .and_then(|(m, d)| Some((m.parse::<u32>().ok()?, d.parse::<u32>().ok()?)))
                .filter(|(m, d)| NaiveDate::from_ymd_opt(2024, *m, *d).is_some())
                .ok_or_else(|| ForecastError::Config(format!("invalid recurring holiday '{entry}'")))?;
            calendar.recurring.insert(parsed);
        }
        for entry in dates {
            let date = NaiveDate::parse_from_str(entry, "%Y-%m-%d")
                .map_err(|e| ForecastError::Config(format!("invalid holiday date '{entry}': {e}")))?;
            calendar.dates.insert(date);
        }
        Ok(calendar)
    }
}

impl HolidayCalendar for FixedHolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date) || self.recurring.contains(&(date.month(), date.day()))
    }
}
