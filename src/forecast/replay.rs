//! Deterministic replay over recorded actuals (backtesting)
//!
//! Each hour is predicted from a history made of recorded actuals only: the
//! prediction is scored, then the actual is pushed in its place. The residual
//! buffer is seeded from actuals and advanced with the predicted scaled
//! corrections.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::engine::{run_blocking, ForecastEngine};
use super::metrics::BacktestMetrics;
use super::stepper::StepOutput;
use crate::error::{ForecastError, Result};

#[derive(Debug, Clone)]
pub struct ReplayRun {
    pub steps: Vec<StepOutput>,
    pub actuals: Vec<Option<f64>>,
    pub metrics: Option<BacktestMetrics>,
    pub seed_fallbacks: usize,
}

pub async fn replay(
    engine: Arc<ForecastEngine>,
    anchor: DateTime<Utc>,
    hours: usize,
    cancel: &CancellationToken,
) -> Result<ReplayRun> {
    engine.orchestrator().check_horizon(hours)?;
    let ctx = engine.actual_context(anchor).await?;
    let end = anchor + Duration::hours(hours as i64);
    let mut recorded: HashMap<_, _> = engine
        .actuals_before(end, hours)
        .await?
        .into_iter()
        .map(|o| (o.timestamp, o))
        .collect();
    let weather = engine.weather_for(anchor, hours).await?;

    let seed_fallbacks = ctx.seed_fallbacks;
    let stepper = engine.stepper().clone();
    let cancel = cancel.clone();
    let (steps, actuals) = run_blocking(move || {
        let mut history = ctx.history;
        let mut residuals = ctx.residuals;
        let mut steps = Vec::with_capacity(hours);
        let mut actuals = Vec::with_capacity(hours);
        for (offset, w) in weather.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            let ts = anchor + Duration::hours(offset as i64);
            let step = match recorded.remove(&ts) {
                Some(actual) => {
                    actuals.push(Some(actual.demand_mw));
                    stepper.replay_step(actual, &mut history, &mut residuals, w)?
                }
                None => {
                    debug!(%ts, "no actual recorded, stepping on the prediction");
                    actuals.push(None);
                    stepper.step(ts, &mut history, &mut residuals, w)?
                }
            };
            steps.push(step);
        }
        Ok((steps, actuals))
    })
    .await?;

    let predictions: Vec<f64> = steps.iter().map(|s| s.prediction).collect();
    let baselines: Vec<f64> = steps.iter().map(|s| s.baseline.max(0.0)).collect();
    let metrics = BacktestMetrics::from_series(&actuals, &predictions, &baselines).ok();
    if let Some(m) = &metrics {
        info!(
            %anchor,
            hours,
            hybrid = %m.hybrid,
            baseline = %m.baseline,
            "replay scored against actuals"
        );
    }

    Ok(ReplayRun {
        steps,
        actuals,
        metrics,
        seed_fallbacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::forecast::engine::tests::engine;
    use crate::forecast::stepper::tests::persistence_bundle;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_replay_uses_actuals_for_lags() {
        // alternating series: persistence is always off by 100 MW
        let actuals: Vec<_> = (0..400)
            .map(|h| {
                let v = if h % 2 == 0 { 1000.0 } else { 1100.0 };
                Observation::actual(start() + Duration::hours(h), v, None)
            })
            .collect();
        let engine = Arc::new(engine(persistence_bundle(0.0), actuals));
        let anchor = start() + Duration::hours(300);

        let run = replay(engine, anchor, 24, &CancellationToken::new()).await.unwrap();
        assert_eq!(run.steps.len(), 24);
        assert!(run.actuals.iter().all(Option::is_some));
        // every prediction equals the previous recorded actual
        for (i, step) in run.steps.iter().enumerate() {
            let previous = if (300 + i - 1) % 2 == 0 { 1000.0 } else { 1100.0 };
            assert_eq!(step.prediction, previous);
        }
        let metrics = run.metrics.unwrap();
        assert!((metrics.hybrid.mae - 100.0).abs() < 1e-9);
        assert_eq!(metrics.hybrid.sample_count, 24);
    }

    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let actuals: Vec<_> = (0..400)
            .map(|h| Observation::actual(start() + Duration::hours(h), 900.0 + (h % 24) as f64, None))
            .collect();
        let engine = Arc::new(engine(persistence_bundle(5.0), actuals));
        let anchor = start() + Duration::hours(250);
        let a = replay(engine.clone(), anchor, 48, &CancellationToken::new()).await.unwrap();
        let b = replay(engine, anchor, 48, &CancellationToken::new()).await.unwrap();
        assert_eq!(a.steps, b.steps);
    }
}
