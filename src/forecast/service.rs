//! Request entry point: pick a serving plan, run it, attach confidence and
//! metadata.

use chrono::{DateTime, Duration, DurationRound, NaiveDate, Timelike, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::cache::{DayBlockCache, DayFetch, DayRun, InMemoryCacheStore};
use super::calendar::FixedHolidayCalendar;
use super::confidence::ConfidenceModel;
use super::engine::{run_blocking, ForecastEngine};
use super::gap::{gap_hours, weather_hours_needed, GapFiller};
use super::replay::replay;
use super::selector::{ServingPlan, SourceSelector};
use super::stepper::{CorrectionStatus, StepOutput};
use super::weekly::summarize_daily;
use crate::config::Config;
use crate::domain::{
    day_start, DailySummary, ForecastMetadata, ForecastRequest, ForecastResult, HOURS_PER_DAY,
};
use crate::error::Result;
use crate::forecast::metrics::BacktestMetrics;
use crate::ml::ModelBundle;
use crate::repo::{HistoricalStore, WeatherForecastProvider};

const WEEK_HOURS: usize = 7 * HOURS_PER_DAY;

/// Hourly series before confidence is attached.
struct Served {
    timestamps: Vec<DateTime<Utc>>,
    predictions: Vec<f64>,
    baselines: Vec<f64>,
    residuals: Vec<f64>,
    actuals: Vec<Option<f64>>,
    metrics: Option<BacktestMetrics>,
}

impl Served {
    fn from_steps(steps: &[StepOutput], meta: &mut ForecastMetadata) -> Self {
        for step in steps {
            meta.data_quality.extend(step.notes.iter().cloned());
            note_status(meta, step.status);
        }
        Self {
            timestamps: steps.iter().map(|s| s.timestamp).collect(),
            predictions: steps.iter().map(|s| s.prediction).collect(),
            baselines: steps.iter().map(|s| s.baseline).collect(),
            residuals: steps.iter().map(|s| s.correction).collect(),
            actuals: vec![None; steps.len()],
            metrics: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForecastService {
    engine: Arc<ForecastEngine>,
    cache: Arc<DayBlockCache>,
    selector: SourceSelector,
    gap_filler: GapFiller,
    confidence: ConfidenceModel,
}

impl ForecastService {
    pub fn new(engine: Arc<ForecastEngine>, cache: Arc<DayBlockCache>) -> Self {
        let settings = *engine.settings();
        let confidence = ConfidenceModel::new(
            settings.z_score,
            engine.models().residual_stats,
            settings.growth_hours,
        );
        Self {
            selector: SourceSelector::new(
                settings.max_horizon_hours,
                settings.max_gap_hours,
                settings.history_capacity,
            ),
            gap_filler: GapFiller::new(engine.clone(), cache.clone()),
            engine,
            cache,
            confidence,
        }
    }

    pub fn from_config(
        config: &Config,
        models: ModelBundle,
        history: Arc<dyn HistoricalStore>,
        weather: Arc<dyn WeatherForecastProvider>,
    ) -> Result<Self> {
        let settings = config.settings()?;
        let holidays =
            FixedHolidayCalendar::from_config(&config.holidays.recurring, &config.holidays.dates)?;
        let store =
            InMemoryCacheStore::with_ttl(std::time::Duration::from_secs(config.cache.ttl_seconds));
        let engine = Arc::new(ForecastEngine::new(
            models,
            Arc::new(holidays),
            history,
            weather,
            settings,
        ));
        Ok(Self::new(engine, Arc::new(DayBlockCache::new(Arc::new(store)))))
    }

    pub fn engine(&self) -> &Arc<ForecastEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<DayBlockCache> {
        &self.cache
    }

    /// Serve one forecast request. The start is truncated to the hour.
    #[instrument(skip(self, cancel), fields(start = %request.start, horizon = request.horizon_hours))]
    pub async fn forecast(
        &self,
        request: ForecastRequest,
        cancel: &CancellationToken,
    ) -> Result<ForecastResult> {
        let start = request
            .start
            .duration_trunc(Duration::hours(1))
            .unwrap_or(request.start);
        let request = ForecastRequest::new(start, request.horizon_hours);
        let plan = self.selector.plan(&self.engine, &request).await?;

        let models = self.engine.models();
        let mut meta = ForecastMetadata::new(
            plan.mode(),
            models.feature_set(),
            models.baseline.model_id(),
            request.start,
        );
        meta.anchor_start = plan.anchor(&request);
        meta.last_available = Some(plan.last_available());
        if !models.has_corrector() {
            meta.mark_degraded("residual corrector not loaded; baseline only");
        }

        let served = match plan {
            ServingPlan::Replay { anchor, snapped, .. } => {
                meta.snapped = snapped;
                self.serve_replay(anchor, request.horizon_hours, &mut meta, cancel)
                    .await?
            }
            ServingPlan::GapFill { last_available, .. }
            | ServingPlan::Iterative { last_available } => {
                self.serve_forward(&request, last_available, &mut meta, cancel)
                    .await?
            }
        };

        let result = self.assemble(served, meta);
        info!(
            mode = %result.metadata.mode,
            hours = result.len(),
            degraded = result.metadata.degraded,
            data_quality_notes = result.metadata.data_quality.len(),
            served_from_cache = result.metadata.served_from_cache,
            "forecast served"
        );
        Ok(result)
    }

    /// Seven daily summaries starting at midnight of `date`.
    pub async fn forecast_week(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailySummary>> {
        let result = self
            .forecast(ForecastRequest::new(day_start(date), WEEK_HOURS), cancel)
            .await?;
        Ok(summarize_daily(&result))
    }

    async fn serve_replay(
        &self,
        anchor: DateTime<Utc>,
        hours: usize,
        meta: &mut ForecastMetadata,
        cancel: &CancellationToken,
    ) -> Result<Served> {
        let run = replay(self.engine.clone(), anchor, hours, cancel).await?;
        meta.seed_fallbacks = run.seed_fallbacks;
        meta.actuals_available = run.actuals.iter().filter(|a| a.is_some()).count();
        let mut served = Served::from_steps(&run.steps, meta);
        served.actuals = run.actuals;
        served.metrics = run.metrics;
        Ok(served)
    }

    async fn serve_forward(
        &self,
        request: &ForecastRequest,
        last: DateTime<Utc>,
        meta: &mut ForecastMetadata,
        cancel: &CancellationToken,
    ) -> Result<Served> {
        let start = request.start;
        let hours = request.horizon_hours;
        let ctx = self.engine.actual_context(last + Duration::hours(1)).await?;
        meta.seed_fallbacks = ctx.seed_fallbacks;

        let gap = gap_hours(last, start);
        let total = (gap + hours).max(weather_hours_needed(last, start));
        let weather = self.engine.weather_for(last + Duration::hours(1), total).await?;

        let (history, residuals) = if gap > 0 {
            let fill = self
                .gap_filler
                .fill(ctx.history, ctx.residuals, start, &weather, cancel)
                .await?;
            let report = fill.report;
            meta.gap_hours = report.gap_hours;
            meta.cached_days = report.cached_days;
            meta.computed_days = report.computed_days;
            meta.residual_placeholder_hours = report.placeholder_hours;
            meta.data_quality.extend(report.notes);
            meta.exceeds_predicted_day_cap = report.exceeds_predicted_day_cap;
            if let Some(status) = report.degraded {
                note_status(meta, status);
            }
            (fill.history, fill.residuals)
        } else {
            (ctx.history, ctx.residuals)
        };
        let horizon_weather = weather[gap..gap + hours].to_vec();
        let orchestrator = self.engine.orchestrator().clone();
        let cancel = cancel.clone();

        if hours == HOURS_PER_DAY && start.hour() == 0 {
            let date = start.date_naive();
            let fetch = self
                .cache
                .get_or_compute(date, move || {
                    let run = orchestrator.run(
                        start,
                        HOURS_PER_DAY,
                        &history,
                        &residuals,
                        &horizon_weather,
                        &cancel,
                    )?;
                    Ok(DayRun {
                        date,
                        steps: run.steps,
                    })
                })
                .await?;
            return Ok(match fetch {
                DayFetch::Cached(block) => {
                    meta.served_from_cache = true;
                    let timestamps: Vec<_> = block.timestamps().collect();
                    meta.residual_placeholder_hours.extend(timestamps.iter().copied());
                    let predictions = block.predictions().to_vec();
                    Served {
                        actuals: vec![None; timestamps.len()],
                        baselines: predictions.clone(),
                        residuals: vec![0.0; timestamps.len()],
                        predictions,
                        timestamps,
                        metrics: None,
                    }
                }
                DayFetch::Computed(run) => Served::from_steps(&run.steps, meta),
            });
        }

        let run = run_blocking(move || {
            orchestrator.run(start, hours, &history, &residuals, &horizon_weather, &cancel)
        })
        .await?;
        Ok(Served::from_steps(&run.steps, meta))
    }

    fn assemble(&self, served: Served, metadata: ForecastMetadata) -> ForecastResult {
        let confidence_intervals = served
            .predictions
            .iter()
            .enumerate()
            .map(|(h, p)| self.confidence.interval(*p, h))
            .collect();
        let confidence_scores = served
            .actuals
            .iter()
            .enumerate()
            .map(|(h, a)| self.confidence.score(h, a.is_some()))
            .collect();
        ForecastResult {
            timestamps: served.timestamps,
            predictions: served.predictions,
            baseline_components: served.baselines,
            residual_components: served.residuals,
            confidence_intervals,
            confidence_scores,
            actuals: served.actuals,
            metrics: served.metrics,
            metadata,
        }
    }
}

fn note_status(meta: &mut ForecastMetadata, status: CorrectionStatus) {
    match status {
        CorrectionStatus::Failed => {
            if !meta.degraded {
                warn!("residual corrector failed; serving baseline for affected hours");
            }
            meta.mark_degraded("residual corrector failed; baseline only for affected hours");
        }
        CorrectionStatus::Unavailable => {
            meta.mark_degraded("residual corrector not loaded; baseline only");
        }
        CorrectionStatus::Applied | CorrectionStatus::WarmingUp => {}
    }
}
