use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ForecastError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub forecast: ForecastConfig,
    pub confidence: ConfidenceConfig,
    pub cache: CacheConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub holidays: HolidayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    pub history_capacity: usize,
    pub history_floor: usize,
    pub max_horizon_hours: usize,
    pub max_gap_hours: usize,
    #[serde(default)]
    pub predicted_day_cap: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfidenceConfig { pub z_score: f64, pub growth_hours: f64 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig { pub ttl_seconds: u64 }

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig { pub history_csv: PathBuf, pub manifest_path: PathBuf }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HolidayConfig {
    /// `"MM-DD"` entries repeating every year.
    #[serde(default)]
    pub recurring: Vec<String>,
    /// `"YYYY-MM-DD"` one-off dates.
    #[serde(default)]
    pub dates: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("DFC__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.settings()?;
        Ok(cfg)
    }

    /// Validated runtime knobs for the forecasting core.
    pub fn settings(&self) -> std::result::Result<ForecastSettings, ForecastError> {
        ForecastSettings {
            history_capacity: self.forecast.history_capacity,
            history_floor: self.forecast.history_floor,
            max_horizon_hours: self.forecast.max_horizon_hours,
            max_gap_hours: self.forecast.max_gap_hours,
            predicted_day_cap: self.forecast.predicted_day_cap,
            z_score: self.confidence.z_score,
            growth_hours: self.confidence.growth_hours,
        }
        .validated()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSettings {
    /// Lookback window length in hours; also the residual buffer length.
    pub history_capacity: usize,
    /// Below this many hours feature reconstruction refuses to run.
    pub history_floor: usize,
    pub max_horizon_hours: usize,
    pub max_gap_hours: usize,
    /// Predicted-only days tolerated in a gap before the result is flagged.
    pub predicted_day_cap: Option<usize>,
    pub z_score: f64,
    pub growth_hours: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            history_capacity: 168,
            history_floor: 24,
            max_horizon_hours: 336,
            max_gap_hours: 2160,
            predicted_day_cap: None,
            z_score: 1.96,
            growth_hours: 24.0,
        }
    }
}

impl ForecastSettings {
    pub fn validated(self) -> std::result::Result<Self, ForecastError> {
        if self.history_floor == 0 || self.history_floor > self.history_capacity {
            return Err(ForecastError::Config(format!(
                "history_floor ({}) must be within 1..={}",
                self.history_floor, self.history_capacity
            )));
        }
        if self.max_horizon_hours == 0 || self.max_gap_hours == 0 {
            return Err(ForecastError::Config(
                "horizon and gap ceilings must be positive".to_string(),
            ));
        }
        if !(self.z_score.is_finite() && self.z_score >= 0.0) {
            return Err(ForecastError::Config(format!("invalid z_score {}", self.z_score)));
        }
        if !(self.growth_hours.is_finite() && self.growth_hours > 0.0) {
            return Err(ForecastError::Config(format!(
                "growth_hours must be positive, got {}",
                self.growth_hours
            )));
        }
        Ok(self)
    }
}
