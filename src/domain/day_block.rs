use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Provenance;
use crate::error::{ForecastError, Result};

pub const HOURS_PER_DAY: usize = 24;

/// Midnight UTC of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

/// Exactly 24 hour-0-aligned predictions for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBlock {
    pub date: NaiveDate,
    predictions: Vec<f64>,
    pub provenance: Provenance,
    pub inserted_at: DateTime<Utc>,
}

impl DayBlock {
    /// Rejects anything that is not a full day.
    pub fn new(date: NaiveDate, predictions: Vec<f64>) -> Result<Self> {
        if predictions.len() != HOURS_PER_DAY {
            return Err(ForecastError::InvalidBlockLength {
                date,
                len: predictions.len(),
            });
        }
        Ok(Self {
            date,
            predictions,
            provenance: Provenance::Predicted,
            inserted_at: Utc::now(),
        })
    }

    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    pub fn start(&self) -> DateTime<Utc> {
        day_start(self.date)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> {
        let start = self.start();
        (0..HOURS_PER_DAY as i64).map(move |h| start + Duration::hours(h))
    }
}
