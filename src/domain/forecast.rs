use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::forecast::metrics::BacktestMetrics;
use crate::ml::FeatureSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForecastRequest {
    pub start: DateTime<Utc>,
    pub horizon_hours: usize,
}

impl ForecastRequest {
    pub fn new(start: DateTime<Utc>, horizon_hours: usize) -> Self {
        Self {
            start,
            horizon_hours,
        }
    }

    /// Last hour covered by the request.
    pub fn end_inclusive(&self) -> DateTime<Utc> {
        self.start + Duration::hours(self.horizon_hours.saturating_sub(1) as i64)
    }
}

/// Serving strategy chosen for a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServingMode {
    /// Deterministic reconstruction from recorded actuals (backtesting).
    Replay,
    /// Fill the hours after the last actual, then forecast iteratively.
    GapFill,
    /// Start is the hour right after the last actual.
    Iterative,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
}

/// A lag or rolling feature that read a nearer offset than requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataQualityNote {
    pub timestamp: DateTime<Utc>,
    pub feature: String,
    pub requested_hours: usize,
    pub used_hours: usize,
}

/// Request start moved to a valid replay anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapNote {
    pub requested: DateTime<Utc>,
    pub anchor: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastMetadata {
    pub mode: ServingMode,
    pub feature_set: FeatureSet,
    pub model_id: String,
    pub requested_start: DateTime<Utc>,
    pub anchor_start: DateTime<Utc>,
    pub last_available: Option<DateTime<Utc>>,
    pub snapped: Option<SnapNote>,
    /// Corrector missing or failing; predictions are baseline-only where flagged.
    pub degraded: bool,
    pub degradation_reason: Option<String>,
    pub data_quality: Vec<DataQualityNote>,
    /// Fallback substitutions while seeding residuals from history.
    pub seed_fallbacks: usize,
    pub gap_hours: usize,
    pub cached_days: Vec<NaiveDate>,
    pub computed_days: Vec<NaiveDate>,
    /// Hours whose residual entry is a zero placeholder (resumed from cache).
    pub residual_placeholder_hours: Vec<DateTime<Utc>>,
    pub served_from_cache: bool,
    pub exceeds_predicted_day_cap: bool,
    pub actuals_available: usize,
    pub units: String,
}

impl ForecastMetadata {
    pub fn new(
        mode: ServingMode,
        feature_set: FeatureSet,
        model_id: impl Into<String>,
        requested_start: DateTime<Utc>,
    ) -> Self {
        Self {
            mode,
            feature_set,
            model_id: model_id.into(),
            requested_start,
            anchor_start: requested_start,
            last_available: None,
            snapped: None,
            degraded: false,
            degradation_reason: None,
            data_quality: Vec::new(),
            seed_fallbacks: 0,
            gap_hours: 0,
            cached_days: Vec::new(),
            computed_days: Vec::new(),
            residual_placeholder_hours: Vec::new(),
            served_from_cache: false,
            exceeds_predicted_day_cap: false,
            actuals_available: 0,
            units: "MW".to_string(),
        }
    }

    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        if !self.degraded {
            self.degraded = true;
            self.degradation_reason = Some(reason.into());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResult {
    pub timestamps: Vec<DateTime<Utc>>,
    pub predictions: Vec<f64>,
    pub baseline_components: Vec<f64>,
    pub residual_components: Vec<f64>,
    pub confidence_intervals: Vec<ConfidenceInterval>,
    pub confidence_scores: Vec<f64>,
    pub actuals: Vec<Option<f64>>,
    pub metrics: Option<BacktestMetrics>,
    pub metadata: ForecastMetadata,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

/// Daily aggregate of an hourly forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub mean_mw: f64,
    pub peak_mw: f64,
    pub min_mw: f64,
    pub total_energy_mwh: f64,
}
