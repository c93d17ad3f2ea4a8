//! Backtest accuracy metrics
//!
//! Replay runs score the hybrid prediction and the baseline-only component
//! against recorded actuals, so the contribution of the residual corrector is
//! visible per request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Accuracy of one prediction series against actuals (MW).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percent, over hours with a non-zero actual.
    pub mape: f64,
    pub r2: f64,
    pub sample_count: usize,
    pub max_error: f64,
    /// Mean signed error (actual − predicted).
    pub bias: f64,
}

impl ForecastMetrics {
    pub fn calculate(actual: &[f64], predicted: &[f64]) -> Result<Self, ForecastMetricsError> {
        if actual.len() != predicted.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actual.len(),
                predicted: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(ForecastMetricsError::EmptyData);
        }

        let n = actual.len() as f64;
        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let sse: f64 = errors.iter().map(|e| e * e).sum();
        let rmse = (sse / n).sqrt();

        let (pct_sum, pct_count) = actual
            .iter()
            .zip(&errors)
            .filter(|(a, _)| a.abs() > 1e-6)
            .fold((0.0, 0usize), |(sum, count), (a, e)| {
                (sum + e.abs() / a.abs() * 100.0, count + 1)
            });
        let mape = if pct_count == 0 {
            0.0
        } else {
            pct_sum / pct_count as f64
        };

        let mean_actual = actual.iter().sum::<f64>() / n;
        let sst: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if sst > 1e-10 { 1.0 - sse / sst } else { 0.0 };

        Ok(Self {
            mae,
            rmse,
            mape,
            r2,
            sample_count: actual.len(),
            max_error: errors.iter().fold(0.0f64, |m, e| m.max(e.abs())),
            bias: errors.iter().sum::<f64>() / n,
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE={:.2} MW, RMSE={:.2} MW, MAPE={:.2}%, R²={:.3} over {} hours",
            self.mae, self.rmse, self.mape, self.r2, self.sample_count
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastMetricsError {
    #[error("Dimension mismatch: actual={actual}, predicted={predicted}")]
    DimensionMismatch { actual: usize, predicted: usize },

    #[error("Empty data provided")]
    EmptyData,
}

/// Hybrid versus baseline-only accuracy for a replay window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub hybrid: ForecastMetrics,
    pub baseline: ForecastMetrics,
}

impl BacktestMetrics {
    /// Scores only the hours that have a recorded actual.
    pub fn from_series(
        actuals: &[Option<f64>],
        hybrid: &[f64],
        baseline: &[f64],
    ) -> Result<Self, ForecastMetricsError> {
        if actuals.len() != hybrid.len() || hybrid.len() != baseline.len() {
            return Err(ForecastMetricsError::DimensionMismatch {
                actual: actuals.len(),
                predicted: hybrid.len().min(baseline.len()),
            });
        }
        let mut a = Vec::with_capacity(actuals.len());
        let mut h = Vec::with_capacity(actuals.len());
        let mut b = Vec::with_capacity(actuals.len());
        for ((actual, hyb), base) in actuals.iter().zip(hybrid).zip(baseline) {
            if let Some(actual) = actual {
                a.push(*actual);
                h.push(*hyb);
                b.push(*base);
            }
        }
        Ok(Self {
            hybrid: ForecastMetrics::calculate(&a, &h)?,
            baseline: ForecastMetrics::calculate(&a, &b)?,
        })
    }

    /// Positive when the corrector reduced MAE.
    pub fn mae_improvement(&self) -> f64 {
        self.baseline.mae - self.hybrid.mae
    }
}
