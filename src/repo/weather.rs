use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::PI;

use super::WeatherForecastProvider;
use crate::domain::WeatherRecord;

/// Deterministic month/hour climatology used when no forecast feed is wired.
#[derive(Debug, Clone)]
pub struct ClimatologyWeatherProvider {
    base_temperature_c: f64,
    peak_solar_wm2: f64,
    solar_capacity_mw: f64,
}

impl Default for ClimatologyWeatherProvider {
    fn default() -> Self {
        Self {
            base_temperature_c: 25.0,
            peak_solar_wm2: 800.0,
            solar_capacity_mw: 500.0,
        }
    }
}

impl ClimatologyWeatherProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn seasonal_offset(month: u32) -> f64 {
        match month {
            1 => -5.0,
            2 => -3.0,
            3 => 0.0,
            4 => 5.0,
            5 => 10.0,
            6 => 12.0,
            7 => 8.0,
            8 => 6.0,
            9 => 4.0,
            10 => 2.0,
            11 => -2.0,
            _ => -5.0,
        }
    }

    /// Half-sine daylight curve between 06:00 and 18:00.
    fn daylight(hour: u32) -> f64 {
        if (6..=18).contains(&hour) {
            (PI * (hour as f64 - 6.0) / 12.0).sin()
        } else {
            0.0
        }
    }

    pub fn record_at(&self, timestamp: DateTime<Utc>) -> WeatherRecord {
        let hour = timestamp.hour();
        let daylight = Self::daylight(hour);
        // coolest around 05:00, warmest mid-afternoon
        let diurnal = -4.0 * (2.0 * PI * (hour as f64 - 5.0) / 24.0).cos();
        let temperature_c = self.base_temperature_c + Self::seasonal_offset(timestamp.month()) + diurnal;
        let humidity_percent = (65.0 - 10.0 * daylight).clamp(0.0, 100.0);
        WeatherRecord {
            timestamp,
            temperature_c,
            humidity_percent,
            apparent_temperature_c: None,
            solar_radiation_wm2: self.peak_solar_wm2 * daylight,
            precipitation_mm: 0.0,
            wind_speed_ms: 3.5,
            cloud_cover_percent: 40.0,
            solar_generation_mw: self.solar_capacity_mw * daylight,
        }
    }
}

#[async_trait]
impl WeatherForecastProvider for ClimatologyWeatherProvider {
    async fn get_forecast(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<WeatherRecord>> {
        Ok(timestamps.iter().map(|ts| self.record_at(*ts)).collect())
    }
}
