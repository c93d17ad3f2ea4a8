use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Where an hourly demand value came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provenance {
    /// Recorded by the grid operator; immutable once stored.
    Actual,
    /// Produced by a forecast run; provisional.
    Predicted,
}

/// Hourly weather attributes, as observed or forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_percent: f64,
    /// Provider-reported feels-like temperature; falls back to air temperature.
    pub apparent_temperature_c: Option<f64>,
    pub solar_radiation_wm2: f64,
    pub precipitation_mm: f64,
    pub wind_speed_ms: f64,
    pub cloud_cover_percent: f64,
    pub solar_generation_mw: f64,
}

impl WeatherRecord {
    /// Long-run averages used where no better record exists.
    pub fn average_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature_c: 25.0,
            humidity_percent: 60.0,
            apparent_temperature_c: None,
            solar_radiation_wm2: 50.0,
            precipitation_mm: 0.0,
            wind_speed_ms: 3.5,
            cloud_cover_percent: 40.0,
            solar_generation_mw: 50.0,
        }
    }

    pub fn apparent_temperature(&self) -> f64 {
        self.apparent_temperature_c.unwrap_or(self.temperature_c)
    }

    /// Same attributes re-stamped for another hour.
    pub fn at(&self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// One hourly demand value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub demand_mw: f64,
    pub weather: Option<WeatherRecord>,
    pub provenance: Provenance,
}

impl Observation {
    pub fn actual(timestamp: DateTime<Utc>, demand_mw: f64, weather: Option<WeatherRecord>) -> Self {
        Self {
            timestamp,
            demand_mw,
            weather,
            provenance: Provenance::Actual,
        }
    }

    pub fn predicted(timestamp: DateTime<Utc>, demand_mw: f64, weather: Option<WeatherRecord>) -> Self {
        Self {
            timestamp,
            demand_mw,
            weather,
            provenance: Provenance::Predicted,
        }
    }

    pub fn is_actual(&self) -> bool {
        self.provenance == Provenance::Actual
    }
}
