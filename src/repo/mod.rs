//! Collaborators the forecasting core reads from
//!
//! Adapters report failures as `anyhow::Result`; the forecasting layer maps
//! them into [`crate::error::ForecastError::Store`] or
//! [`crate::error::ForecastError::Weather`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Observation, WeatherRecord};

pub mod csv_store;
pub mod memory;
pub mod weather;

pub use csv_store::CsvHistoricalStore;
pub use memory::InMemoryHistoricalStore;
pub use weather::ClimatologyWeatherProvider;

/// Read access to recorded actual demand.
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    /// Actuals in `[end_exclusive - length h, end_exclusive)`, oldest first.
    /// Missing hours are simply absent.
    async fn get_window(&self, end_exclusive: DateTime<Utc>, length: usize) -> Result<Vec<Observation>>;

    async fn get_actual(&self, timestamp: DateTime<Utc>) -> Result<Option<Observation>>;

    /// Timestamp of the newest recorded actual.
    async fn last_available(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Weather for arbitrary hours, one record per requested timestamp in order.
#[async_trait]
pub trait WeatherForecastProvider: Send + Sync {
    async fn get_forecast(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<WeatherRecord>>;
}
