//! Flat-file history: one row per hour.
//!
//! Expected header (weather columns optional):
//! `timestamp,load,temperature_2m,relativehumidity_2m,apparent_temperature,
//! shortwave_radiation,precipitation,wind_speed_10m,cloud_cover,solar_generation`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{HistoricalStore, InMemoryHistoricalStore};
use crate::domain::{Observation, WeatherRecord};

#[derive(Debug, Deserialize)]
struct HistoryRow {
    timestamp: String,
    load: f64,
    temperature_2m: Option<f64>,
    relativehumidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    shortwave_radiation: Option<f64>,
    precipitation: Option<f64>,
    wind_speed_10m: Option<f64>,
    cloud_cover: Option<f64>,
    solar_generation: Option<f64>,
}

impl HistoryRow {
    fn into_observation(self) -> Result<Observation> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        let weather = self.temperature_2m.map(|temperature_c| {
            let avg = WeatherRecord::average_at(timestamp);
            WeatherRecord {
                timestamp,
                temperature_c,
                humidity_percent: self.relativehumidity_2m.unwrap_or(avg.humidity_percent),
                apparent_temperature_c: self.apparent_temperature,
                solar_radiation_wm2: self.shortwave_radiation.unwrap_or(avg.solar_radiation_wm2),
                precipitation_mm: self.precipitation.unwrap_or(avg.precipitation_mm),
                wind_speed_ms: self.wind_speed_10m.unwrap_or(avg.wind_speed_ms),
                cloud_cover_percent: self.cloud_cover.unwrap_or(avg.cloud_cover_percent),
                solar_generation_mw: self.solar_generation.unwrap_or(avg.solar_generation_mw),
            }
        });
        Ok(Observation::actual(timestamp, self.load, weather))
    }
}

/// RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS` read as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .with_context(|| format!("unparseable timestamp '{raw}'"))?;
    Ok(naive.and_utc())
}

/// CSV history loaded once into memory.
#[derive(Debug, Clone)]
pub struct CsvHistoricalStore {
    path: PathBuf,
    inner: InMemoryHistoricalStore,
}

impl CsvHistoricalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .with_context(|| format!("opening history file {}", path.display()))?;

        let mut observations = Vec::new();
        let mut skipped = 0usize;
        for (line, row) in reader.deserialize::<HistoryRow>().enumerate() {
            let row = row.with_context(|| format!("{}: row {}", path.display(), line + 2))?;
            if !row.load.is_finite() || row.load < 0.0 {
                skipped += 1;
                continue;
            }
            observations.push(row.into_observation()?);
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "dropped rows with invalid load values");
        }
        info!(path = %path.display(), rows = observations.len(), "loaded demand history");

        Ok(Self {
            path,
            inner: InMemoryHistoricalStore::from_observations(observations)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoricalStore for CsvHistoricalStore {
    async fn get_window(&self, end_exclusive: DateTime<Utc>, length: usize) -> Result<Vec<Observation>> {
        self.inner.get_window(end_exclusive, length).await
    }

    async fn get_actual(&self, timestamp: DateTime<Utc>) -> Result<Option<Observation>> {
        self.inner.get_actual(timestamp).await
    }

    async fn last_available(&self) -> Result<Option<DateTime<Utc>>> {
        self.inner.last_available().await
    }
}
