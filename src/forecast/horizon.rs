//! Sequential multi-hour driver for [`HybridStepper`].

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::stepper::{HybridStepper, StepOutput};
use crate::domain::{ResidualBuffer, WeatherRecord, WorkingHistory};
use crate::error::{ForecastError, Result};

/// Outcome of a completed run together with the advanced buffers.
#[derive(Debug, Clone)]
pub struct HorizonRun {
    pub steps: Vec<StepOutput>,
    pub history: WorkingHistory,
    pub residuals: ResidualBuffer,
}

impl HorizonRun {
    pub fn predictions(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.prediction).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.steps.iter().map(|s| s.timestamp).collect()
    }
}

#[derive(Debug, Clone)]
pub struct HorizonOrchestrator {
    stepper: Arc<HybridStepper>,
    max_horizon: usize,
}

impl HorizonOrchestrator {
    pub fn new(stepper: Arc<HybridStepper>, max_horizon: usize) -> Self {
        Self {
            stepper,
            max_horizon,
        }
    }

    pub fn stepper(&self) -> &Arc<HybridStepper> {
        &self.stepper
    }

    pub fn max_horizon(&self) -> usize {
        self.max_horizon
    }

    pub fn check_horizon(&self, hours: usize) -> Result<()> {
        if hours == 0 || hours > self.max_horizon {
            return Err(ForecastError::HorizonOutOfBounds {
                requested: hours,
                max: self.max_horizon,
            });
        }
        Ok(())
    }

    /// Forecast `hours` consecutive hours from `start`.
    ///
    /// Works on copies of the buffers; the caller only sees them advanced
    /// when every step succeeded. `weather` must hold one record per hour.
    pub fn run(
        &self,
        start: DateTime<Utc>,
        hours: usize,
        history: &WorkingHistory,
        residuals: &ResidualBuffer,
        weather: &[WeatherRecord],
        cancel: &CancellationToken,
    ) -> Result<HorizonRun> {
        self.check_horizon(hours)?;
        if weather.len() != hours {
            return Err(ForecastError::WeatherMismatch(format!(
                "expected {hours} records, got {}",
                weather.len()
            )));
        }
        if let Some(last) = history.last_timestamp() {
            if last + Duration::hours(1) != start {
                return Err(ForecastError::HistoryMisaligned {
                    target: start,
                    last,
                });
            }
        }

        let mut history = history.clone();
        let mut residuals = residuals.clone();
        let mut steps = Vec::with_capacity(hours);
        for (offset, record) in weather.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(%start, completed = offset, "horizon run cancelled");
                return Err(ForecastError::Cancelled);
            }
            let ts = start + Duration::hours(offset as i64);
            if record.timestamp != ts {
                return Err(ForecastError::WeatherMismatch(format!(
                    "record for {} supplied at step {ts}",
                    record.timestamp
                )));
            }
            steps.push(self.stepper.step(ts, &mut history, &mut residuals, record)?);
        }

        Ok(HorizonRun {
            steps,
            history,
            residuals,
        })
    }
}
