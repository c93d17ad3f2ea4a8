use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::calendar::HolidayCalendar;
use super::features::FeatureReconstructor;
use super::horizon::HorizonOrchestrator;
use super::stepper::HybridStepper;
use crate::config::ForecastSettings;
use crate::domain::{Observation, ResidualBuffer, WeatherRecord, WorkingHistory};
use crate::error::{ForecastError, Result};
use crate::ml::ModelBundle;
use crate::repo::{HistoricalStore, WeatherForecastProvider};

/// Buffers reconstructed from recorded actuals up to some boundary.
#[derive(Debug, Clone)]
pub struct ActualContext {
    pub history: WorkingHistory,
    pub residuals: ResidualBuffer,
    /// Seed points whose features needed a shorter history than requested.
    pub seed_fallbacks: usize,
}

/// Shared, read-only forecasting core: models, collaborators and limits.
///
/// Built once at startup and handed to every request by `Arc`.
pub struct ForecastEngine {
    stepper: Arc<HybridStepper>,
    orchestrator: HorizonOrchestrator,
    history: Arc<dyn HistoricalStore>,
    weather: Arc<dyn WeatherForecastProvider>,
    settings: ForecastSettings,
}

impl ForecastEngine {
    pub fn new(
        models: ModelBundle,
        holidays: Arc<dyn HolidayCalendar>,
        history: Arc<dyn HistoricalStore>,
        weather: Arc<dyn WeatherForecastProvider>,
        settings: ForecastSettings,
    ) -> Self {
        let reconstructor =
            FeatureReconstructor::new(models.schema.clone(), holidays, settings.history_floor);
        let stepper = Arc::new(HybridStepper::new(reconstructor, models));
        let orchestrator = HorizonOrchestrator::new(stepper.clone(), settings.max_horizon_hours);
        Self {
            stepper,
            orchestrator,
            history,
            weather,
            settings,
        }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    pub fn stepper(&self) -> &Arc<HybridStepper> {
        &self.stepper
    }

    pub fn orchestrator(&self) -> &HorizonOrchestrator {
        &self.orchestrator
    }

    pub fn models(&self) -> &ModelBundle {
        self.stepper.models()
    }

    pub fn store(&self) -> &Arc<dyn HistoricalStore> {
        &self.history
    }

    pub async fn last_available(&self) -> Result<Option<DateTime<Utc>>> {
        self.history.last_available().await.map_err(store_error)
    }

    pub async fn actual_at(&self, timestamp: DateTime<Utc>) -> Result<Option<Observation>> {
        self.history.get_actual(timestamp).await.map_err(store_error)
    }

    /// Weather for `hours` consecutive hours from `start`, one record each.
    pub async fn weather_for(&self, start: DateTime<Utc>, hours: usize) -> Result<Vec<WeatherRecord>> {
        let timestamps: Vec<_> = (0..hours as i64).map(|h| start + Duration::hours(h)).collect();
        self.weather_at(&timestamps).await
    }

    async fn weather_at(&self, timestamps: &[DateTime<Utc>]) -> Result<Vec<WeatherRecord>> {
        if timestamps.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .weather
            .get_forecast(timestamps)
            .await
            .map_err(|e| ForecastError::Weather(e.to_string()))?;
        if records.len() != timestamps.len() {
            return Err(ForecastError::WeatherMismatch(format!(
                "provider returned {} records for {} hours",
                records.len(),
                timestamps.len()
            )));
        }
        if let Some((r, ts)) = records.iter().zip(timestamps).find(|(r, ts)| r.timestamp != **ts) {
            return Err(ForecastError::WeatherMismatch(format!(
                "provider returned {} for {ts}",
                r.timestamp
            )));
        }
        debug!(hours = records.len(), "fetched weather");
        Ok(records)
    }

    /// Recorded actuals in the `length` hours before `end_exclusive`, with
    /// missing weather filled from the provider.
    pub async fn actuals_before(
        &self,
        end_exclusive: DateTime<Utc>,
        length: usize,
    ) -> Result<Vec<Observation>> {
        let mut actuals = self
            .history
            .get_window(end_exclusive, length)
            .await
            .map_err(store_error)?;
        let missing: Vec<_> = actuals
            .iter()
            .filter(|o| o.weather.is_none())
            .map(|o| o.timestamp)
            .collect();
        if !missing.is_empty() {
            let mut filled = self.weather_at(&missing).await?.into_iter();
            for obs in actuals.iter_mut().filter(|o| o.weather.is_none()) {
                obs.weather = filled.next();
            }
            debug!(hours = missing.len(), "filled historical weather from provider");
        }
        Ok(actuals)
    }

    /// Working history and seeded residuals for a run starting at `end_exclusive`.
    pub async fn actual_context(&self, end_exclusive: DateTime<Utc>) -> Result<ActualContext> {
        let capacity = self.settings.history_capacity;
        let actuals = self.actuals_before(end_exclusive, 2 * capacity).await?;
        if actuals.len() < self.settings.history_floor {
            return Err(ForecastError::InsufficientHistory {
                required: self.settings.history_floor,
                available: actuals.len(),
            });
        }

        let (residuals, seed_fallbacks) = self.seed_residuals(&actuals)?;
        let keep = actuals.len().saturating_sub(capacity);
        let history = WorkingHistory::from_observations(capacity, actuals.into_iter().skip(keep))?;
        info!(
            end = %end_exclusive,
            history = history.len(),
            residuals = residuals.len(),
            seed_fallbacks,
            "actual context loaded"
        );
        Ok(ActualContext {
            history,
            residuals,
            seed_fallbacks,
        })
    }

    /// Scaled `actual − baseline` residuals for the newest `capacity` actuals
    /// that have at least `floor` preceding hours.
    pub fn seed_residuals(&self, actuals: &[Observation]) -> Result<(ResidualBuffer, usize)> {
        let capacity = self.settings.history_capacity;
        let floor = self.settings.history_floor;
        let scaler = self.models().scaler;
        let mut buffer = ResidualBuffer::new(capacity, scaler);
        let mut fallbacks = 0;

        let first = floor.max(actuals.len().saturating_sub(capacity));
        for i in first..actuals.len() {
            let target = &actuals[i];
            let window = &actuals[i.saturating_sub(capacity)..i];
            let history = WorkingHistory::from_observations(capacity, window.iter().cloned())?;
            let weather = target
                .weather
                .clone()
                .unwrap_or_else(|| WeatherRecord::average_at(target.timestamp));
            let (baseline, notes) = self.stepper.baseline(target.timestamp, &history, &weather)?;
            if !notes.is_empty() {
                fallbacks += 1;
            }
            buffer.push(scaler.transform(target.demand_mw - baseline));
        }
        Ok((buffer, fallbacks))
    }
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("stepper", &self.stepper)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Run CPU-bound forecasting work on the blocking pool.
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForecastError::Internal(format!("forecast task failed: {e}")))?
}

fn store_error(e: anyhow::Error) -> ForecastError {
    ForecastError::Store(e.to_string())
}
