//! One hybrid forecast step: features → baseline → residual correction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::warn;

use super::features::FeatureReconstructor;
use crate::domain::{DataQualityNote, Observation, ResidualBuffer, WeatherRecord, WorkingHistory};
use crate::error::{ForecastError, Result};
use crate::ml::ModelBundle;

/// What happened to the residual correction for one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CorrectionStatus {
    Applied,
    /// Residual buffer shorter than the corrector window.
    WarmingUp,
    /// No corrector loaded.
    Unavailable,
    /// Corrector returned an error or a non-finite value.
    Failed,
}

impl CorrectionStatus {
    /// Baseline-only because the corrector could not be used.
    pub fn is_degraded(self) -> bool {
        matches!(self, CorrectionStatus::Unavailable | CorrectionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub timestamp: DateTime<Utc>,
    /// `max(0, baseline + correction)`.
    pub prediction: f64,
    pub baseline: f64,
    /// Unscaled correction in MW, zero unless applied.
    pub correction: f64,
    /// Value appended to the residual buffer.
    pub scaled_correction: f64,
    pub status: CorrectionStatus,
    pub notes: Vec<DataQualityNote>,
}

#[derive(Debug, Clone)]
pub struct HybridStepper {
    reconstructor: FeatureReconstructor,
    models: ModelBundle,
}

impl HybridStepper {
    pub fn new(reconstructor: FeatureReconstructor, models: ModelBundle) -> Self {
        Self {
            reconstructor,
            models,
        }
    }

    pub fn reconstructor(&self) -> &FeatureReconstructor {
        &self.reconstructor
    }

    pub fn models(&self) -> &ModelBundle {
        &self.models
    }

    /// Baseline estimate alone, without touching any buffer.
    pub fn baseline(
        &self,
        timestamp: DateTime<Utc>,
        history: &WorkingHistory,
        weather: &WeatherRecord,
    ) -> Result<(f64, Vec<DataQualityNote>)> {
        let vector = self.reconstructor.reconstruct(timestamp, history, weather)?;
        let baseline = self
            .models
            .baseline
            .predict(&vector.values)
            .map_err(|e| ForecastError::FatalModelUnavailable(e.to_string()))?;
        Ok((baseline, vector.notes))
    }

    /// Pure evaluation of one step; buffers are left untouched.
    pub fn compute(
        &self,
        timestamp: DateTime<Utc>,
        history: &WorkingHistory,
        residuals: &ResidualBuffer,
        weather: &WeatherRecord,
    ) -> Result<StepOutput> {
        let (baseline, notes) = self.baseline(timestamp, history, weather)?;

        let (scaled, correction, status) = match &self.models.corrector {
            None => (0.0, 0.0, CorrectionStatus::Unavailable),
            Some(corrector) => {
                let scaler = corrector.scaler();
                if residuals.scaler() != scaler {
                    return Err(ForecastError::ScaleMismatch {
                        buffer: residuals.scaler().to_string(),
                        model: scaler.to_string(),
                    });
                }
                match residuals.tail(corrector.window_len()) {
                    None => (0.0, 0.0, CorrectionStatus::WarmingUp),
                    Some(window) => match corrector.predict(&window) {
                        Ok(s) if s.is_finite() => (s, scaler.inverse(s), CorrectionStatus::Applied),
                        Ok(s) => {
                            warn!(%timestamp, value = s, "residual corrector returned a non-finite value");
                            (0.0, 0.0, CorrectionStatus::Failed)
                        }
                        Err(e) => {
                            warn!(%timestamp, error = %e, "residual corrector failed, using baseline only");
                            (0.0, 0.0, CorrectionStatus::Failed)
                        }
                    },
                }
            }
        };

        Ok(StepOutput {
            timestamp,
            prediction: (baseline + correction).max(0.0),
            baseline,
            correction,
            scaled_correction: scaled,
            status,
            notes,
        })
    }

    /// Run one step and feed the prediction back into the buffers.
    pub fn step(
        &self,
        timestamp: DateTime<Utc>,
        history: &mut WorkingHistory,
        residuals: &mut ResidualBuffer,
        weather: &WeatherRecord,
    ) -> Result<StepOutput> {
        let out = self.compute(timestamp, history, residuals, weather)?;
        history.push(Observation::predicted(
            timestamp,
            out.prediction,
            Some(weather.clone()),
        ))?;
        residuals.push(out.scaled_correction);
        Ok(out)
    }

    /// Run one step but advance the history with the recorded actual.
    pub fn replay_step(
        &self,
        actual: Observation,
        history: &mut WorkingHistory,
        residuals: &mut ResidualBuffer,
        weather: &WeatherRecord,
    ) -> Result<StepOutput> {
        let out = self.compute(actual.timestamp, history, residuals, weather)?;
        let weather = actual.weather.clone().unwrap_or_else(|| weather.clone());
        history.push(Observation {
            weather: Some(weather),
            ..actual
        })?;
        residuals.push(out.scaled_correction);
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::forecast::calendar::FixedHolidayCalendar;
    use crate::ml::schema::compact_feature_order;
    use crate::ml::{
        BaselinePredictor, FeatureSchema, FeatureSet, LinearBaseline, LinearResidualCorrector,
        ResidualCorrector, ResidualScaler,
    };
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap()
    }

    /// Compact schema with a baseline that returns `lag_1 + offset`.
    pub(crate) fn persistence_bundle(offset: f64) -> ModelBundle {
        let names = compact_feature_order();
        let mut coefficients = vec![0.0; names.len()];
        let lag1 = names.iter().position(|n| n == "lag_1").unwrap();
        coefficients[lag1] = 1.0;
        let schema = FeatureSchema::new(FeatureSet::Compact, names).unwrap();
        ModelBundle::new(
            schema,
            Arc::new(LinearBaseline::new("persistence", coefficients, offset)),
        )
    }

    pub(crate) fn stepper(models: ModelBundle) -> HybridStepper {
        let reconstructor = FeatureReconstructor::new(
            models.schema.clone(),
            Arc::new(FixedHolidayCalendar::new()),
            24,
        );
        HybridStepper::new(reconstructor, models)
    }

    pub(crate) fn constant_history(len: usize, value: f64) -> WorkingHistory {
        let start = t0() - Duration::hours(len as i64);
        WorkingHistory::from_observations(
            168,
            (0..len).map(|i| {
                let ts = start + Duration::hours(i as i64);
                Observation::actual(ts, value, Some(WeatherRecord::average_at(ts)))
            }),
        )
        .unwrap()
    }

    struct FailingCorrector;

    impl ResidualCorrector for FailingCorrector {
        fn window_len(&self) -> usize {
            2
        }
        fn scaler(&self) -> ResidualScaler {
            ResidualScaler::identity()
        }
        fn predict(&self, _window: &[f64]) -> anyhow::Result<f64> {
            anyhow::bail!("corrector offline")
        }
    }

    struct BrokenBaseline;

    impl BaselinePredictor for BrokenBaseline {
        fn predict(&self, _features: &[f64]) -> anyhow::Result<f64> {
            anyhow::bail!("artifact missing")
        }
    }

    #[test]
    fn test_constant_history_empty_buffer() {
        let scaler = ResidualScaler::new(0.0, 10.0);
        let models = persistence_bundle(0.0)
            .with_corrector(Arc::new(LinearResidualCorrector::new(vec![1.0; 24], 0.0, scaler)));
        let s = stepper(models);
        let history = constant_history(168, 1000.0);
        let residuals = ResidualBuffer::new(168, scaler);

        let out = s
            .compute(t0(), &history, &residuals, &WeatherRecord::average_at(t0()))
            .unwrap();
        assert_eq!(out.correction, 0.0);
        assert_eq!(out.baseline, 1000.0);
        assert_eq!(out.prediction, 1000.0);
        assert_eq!(out.status, CorrectionStatus::WarmingUp);
        assert!(!out.status.is_degraded());
    }

    #[test]
    fn test_step_is_deterministic() {
        let scaler = ResidualScaler::new(1.0, 5.0);
        let models = persistence_bundle(3.0)
            .with_corrector(Arc::new(LinearResidualCorrector::new(vec![0.3, 0.2], 0.1, scaler)));
        let s = stepper(models);
        let history = constant_history(100, 900.0);
        let residuals = ResidualBuffer::from_scaled(168, scaler, [0.5, -0.2, 0.4]);
        let weather = WeatherRecord::average_at(t0());

        let a = s.compute(t0(), &history, &residuals, &weather).unwrap();
        let b = s.compute(t0(), &history, &residuals, &weather).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.status, CorrectionStatus::Applied);
        // scaled = 0.3 * -0.2 + 0.2 * 0.4 + 0.1 = 0.12, unscaled = 0.12 * 5 + 1
        assert!((a.scaled_correction - 0.12).abs() < 1e-12);
        assert!((a.correction - 1.6).abs() < 1e-9);
        assert!((a.prediction - 904.6).abs() < 1e-9);
    }

    #[test]
    fn test_correction_unscaled_with_corrector_scale() {
        let scaler = ResidualScaler::new(1.0, 5.0);
        let mut models = persistence_bundle(3.0)
            .with_corrector(Arc::new(LinearResidualCorrector::new(vec![0.3, 0.2], 0.1, scaler)));
        models.scaler = ResidualScaler::new(100.0, 50.0);
        let s = stepper(models);
        let history = constant_history(100, 900.0);
        let residuals = ResidualBuffer::from_scaled(168, scaler, [0.5, -0.2, 0.4]);

        let out = s
            .compute(t0(), &history, &residuals, &WeatherRecord::average_at(t0()))
            .unwrap();
        assert_eq!(out.status, CorrectionStatus::Applied);
        assert!((out.correction - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_step_feeds_prediction_back() {
        let s = stepper(persistence_bundle(10.0));
        let mut history = constant_history(48, 500.0);
        let mut residuals = ResidualBuffer::new(168, ResidualScaler::identity());
        let weather = WeatherRecord::average_at(t0());

        let out = s.step(t0(), &mut history, &mut residuals, &weather).unwrap();
        assert_eq!(out.prediction, 510.0);
        assert_eq!(out.status, CorrectionStatus::Unavailable);
        assert_eq!(history.len(), 49);
        let last = history.last().unwrap();
        assert_eq!(last.timestamp, t0());
        assert!(!last.is_actual());
        assert_eq!(residuals.values(), vec![0.0]);

        let next = t0() + Duration::hours(1);
        let out = s
            .step(next, &mut history, &mut residuals, &weather.at(next))
            .unwrap();
        assert_eq!(out.prediction, 520.0);
    }

    #[test]
    fn test_prediction_floored_at_zero() {
        let s = stepper(persistence_bundle(-5000.0));
        let out = s
            .compute(
                t0(),
                &constant_history(30, 100.0),
                &ResidualBuffer::new(168, ResidualScaler::identity()),
                &WeatherRecord::average_at(t0()),
            )
            .unwrap();
        assert_eq!(out.baseline, -4900.0);
        assert_eq!(out.prediction, 0.0);
    }

    #[test]
    fn test_scale_mismatch_rejected() {
        let scaler = ResidualScaler::new(9.11, 89.52);
        let models = persistence_bundle(0.0)
            .with_corrector(Arc::new(LinearResidualCorrector::new(vec![1.0], 0.0, scaler)));
        let s = stepper(models);
        let residuals = ResidualBuffer::from_scaled(168, ResidualScaler::identity(), [1.0]);
        let err = s
            .compute(
                t0(),
                &constant_history(30, 100.0),
                &residuals,
                &WeatherRecord::average_at(t0()),
            )
            .unwrap_err();
        assert!(matches!(err, ForecastError::ScaleMismatch { .. }));
    }

    #[test]
    fn test_corrector_failure_degrades() {
        let models = persistence_bundle(0.0).with_corrector(Arc::new(FailingCorrector));
        let s = stepper(models);
        let residuals = ResidualBuffer::from_scaled(168, ResidualScaler::identity(), [1.0, 2.0]);
        let out = s
            .compute(
                t0(),
                &constant_history(30, 100.0),
                &residuals,
                &WeatherRecord::average_at(t0()),
            )
            .unwrap();
        assert_eq!(out.status, CorrectionStatus::Failed);
        assert!(out.status.is_degraded());
        assert_eq!(out.prediction, 100.0);
    }

    #[test]
    fn test_baseline_failure_is_fatal() {
        let models = ModelBundle::new(
            persistence_bundle(0.0).schema,
            Arc::new(BrokenBaseline),
        );
        let s = stepper(models);
        let err = s
            .compute(
                t0(),
                &constant_history(30, 100.0),
                &ResidualBuffer::new(168, ResidualScaler::identity()),
                &WeatherRecord::average_at(t0()),
            )
            .unwrap_err();
        assert!(matches!(err, ForecastError::FatalModelUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_replay_step_pushes_actual() {
        let s = stepper(persistence_bundle(0.0));
        let mut history = constant_history(30, 100.0);
        let mut residuals = ResidualBuffer::new(168, ResidualScaler::identity());
        let actual = Observation::actual(t0(), 140.0, None);

        let out = s
            .replay_step(actual, &mut history, &mut residuals, &WeatherRecord::average_at(t0()))
            .unwrap();
        assert_eq!(out.prediction, 100.0);
        let last = history.last().unwrap();
        assert_eq!(last.demand_mw, 140.0);
        assert!(last.is_actual());
        assert!(last.weather.is_some());
    }
}
