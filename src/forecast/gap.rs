//! Gap filling between the last recorded actual and a future request start
//!
//! The working history is advanced hour by hour from `last_actual + 1h` up to
//! `start - 1h`. Whole calendar days go through the [`DayBlockCache`]; a day
//! served from cache only carries its predictions, so the residual buffer is
//! advanced with zero placeholders for those hours and each one is reported.
//! A leading partial day (the last actual falls mid-day) is forecast directly
//! and never cached; a trailing partial day is computed as a full block and
//! sliced.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::cache::{DayBlockCache, DayFetch, DayRun};
use super::engine::{run_blocking, ForecastEngine};
use super::stepper::{CorrectionStatus, StepOutput};
use crate::domain::{
    DataQualityNote, Observation, ResidualBuffer, WeatherRecord, WorkingHistory, HOURS_PER_DAY,
};
use crate::error::{ForecastError, Result};

/// What the gap fill did, for result metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapReport {
    pub gap_hours: usize,
    pub cached_days: Vec<NaiveDate>,
    pub computed_days: Vec<NaiveDate>,
    /// Hours whose residual entry is a zero placeholder.
    pub placeholder_hours: Vec<DateTime<Utc>>,
    pub notes: Vec<DataQualityNote>,
    pub degraded: Option<CorrectionStatus>,
    pub exceeds_predicted_day_cap: bool,
}

#[derive(Debug, Clone)]
pub struct GapFill {
    pub history: WorkingHistory,
    pub residuals: ResidualBuffer,
    pub report: GapReport,
}

/// Hours strictly between `last` and `start`.
pub fn gap_hours(last: DateTime<Utc>, start: DateTime<Utc>) -> usize {
    ((start - last).num_hours() - 1).max(0) as usize
}

/// Weather records the gap fill needs, counted from `last + 1h`: every gap
/// hour plus the rest of the day holding the final gap hour.
pub fn weather_hours_needed(last: DateTime<Utc>, start: DateTime<Utc>) -> usize {
    let gap = gap_hours(last, start);
    if gap == 0 {
        return 0;
    }
    let final_hour = start - Duration::hours(1);
    gap + (HOURS_PER_DAY - 1 - final_hour.hour() as usize)
}

#[derive(Debug, Clone)]
pub struct GapFiller {
    engine: Arc<ForecastEngine>,
    cache: Arc<DayBlockCache>,
}

impl GapFiller {
    pub fn new(engine: Arc<ForecastEngine>, cache: Arc<DayBlockCache>) -> Self {
        Self { engine, cache }
    }

    /// Advance `history` and `residuals` so they end at `start - 1h`.
    ///
    /// `weather` starts at the hour after the last history entry and holds at
    /// least [`weather_hours_needed`] records.
    pub async fn fill(
        &self,
        history: WorkingHistory,
        residuals: ResidualBuffer,
        start: DateTime<Utc>,
        weather: &[WeatherRecord],
        cancel: &CancellationToken,
    ) -> Result<GapFill> {
        let last = history
            .last_timestamp()
            .ok_or(ForecastError::InsufficientHistory {
                required: self.engine.settings().history_floor,
                available: 0,
            })?;
        let gap = gap_hours(last, start);
        let max_gap = self.engine.settings().max_gap_hours;
        if gap > max_gap {
            return Err(ForecastError::GapTooLong { hours: gap, max: max_gap });
        }
        let needed = weather_hours_needed(last, start);
        if weather.len() < needed {
            return Err(ForecastError::WeatherMismatch(format!(
                "gap fill needs {needed} weather records, got {}",
                weather.len()
            )));
        }

        let mut fill = GapFill {
            history,
            residuals,
            report: GapReport {
                gap_hours: gap,
                ..Default::default()
            },
        };
        if gap == 0 {
            return Ok(fill);
        }

        let predicted_days = gap.div_ceil(HOURS_PER_DAY);
        if let Some(cap) = self.engine.settings().predicted_day_cap {
            if predicted_days > cap {
                warn!(
                    predicted_days,
                    cap, "gap spans more predicted-only days than the configured cap"
                );
                fill.report.exceeds_predicted_day_cap = true;
            }
        }
        info!(%last, %start, gap_hours = gap, "filling gap");

        let mut cursor = last + Duration::hours(1);
        let mut offset = 0usize;
        while cursor < start {
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            let remaining = gap - offset;
            let hour = cursor.hour() as usize;

            if hour != 0 {
                let hours = (HOURS_PER_DAY - hour).min(remaining);
                let day_weather = weather[offset..offset + hours].to_vec();
                let orchestrator = self.engine.orchestrator().clone();
                let (h, r, c) = (fill.history.clone(), fill.residuals.clone(), cancel.clone());
                let run = run_blocking(move || {
                    orchestrator.run(cursor, hours, &h, &r, &day_weather, &c)
                })
                .await?;
                record_steps(&mut fill.report, &run.steps);
                fill.history = run.history;
                fill.residuals = run.residuals;
                offset += hours;
                cursor += Duration::hours(hours as i64);
                continue;
            }

            let date = cursor.date_naive();
            let day_weather = &weather[offset..offset + HOURS_PER_DAY];
            let fetch = self.fetch_day(date, cursor, &fill, day_weather, cancel).await?;
            let take = HOURS_PER_DAY.min(remaining);
            match &fetch {
                DayFetch::Cached(block) => {
                    fill.report.cached_days.push(date);
                    for (i, prediction) in block.predictions().iter().take(take).enumerate() {
                        let ts = cursor + Duration::hours(i as i64);
                        fill.history.push(Observation::predicted(
                            ts,
                            *prediction,
                            Some(day_weather[i].clone()),
                        ))?;
                        fill.residuals.push(0.0);
                        fill.report.placeholder_hours.push(ts);
                    }
                }
                DayFetch::Computed(run) => {
                    fill.report.computed_days.push(date);
                    let steps = &run.steps[..take];
                    for (step, w) in steps.iter().zip(day_weather) {
                        fill.history.push(Observation::predicted(
                            step.timestamp,
                            step.prediction,
                            Some(w.clone()),
                        ))?;
                        fill.residuals.push(step.scaled_correction);
                    }
                    record_steps(&mut fill.report, steps);
                }
            }
            offset += take;
            cursor += Duration::hours(take as i64);
        }

        info!(
            gap_hours = gap,
            cached_days = fill.report.cached_days.len(),
            computed_days = fill.report.computed_days.len(),
            placeholders = fill.report.placeholder_hours.len(),
            "gap filled"
        );
        Ok(fill)
    }

    async fn fetch_day(
        &self,
        date: NaiveDate,
        day_start: DateTime<Utc>,
        fill: &GapFill,
        day_weather: &[WeatherRecord],
        cancel: &CancellationToken,
    ) -> Result<DayFetch> {
        let orchestrator = self.engine.orchestrator().clone();
        let history = fill.history.clone();
        let residuals = fill.residuals.clone();
        let day_weather = day_weather.to_vec();
        let cancel = cancel.clone();
        self.cache
            .get_or_compute(date, move || {
                let run =
                    orchestrator.run(day_start, HOURS_PER_DAY, &history, &residuals, &day_weather, &cancel)?;
                Ok(DayRun {
                    date,
                    steps: run.steps,
                })
            })
            .await
    }
}

fn record_steps(report: &mut GapReport, steps: &[StepOutput]) {
    for step in steps {
        report.notes.extend(step.notes.iter().cloned());
        if report.degraded.is_none() && step.status.is_degraded() {
            report.degraded = Some(step.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::cache::InMemoryCacheStore;
    use crate::forecast::engine::tests::{engine, hours_from};
    use crate::forecast::stepper::tests::persistence_bundle;
    use crate::config::ForecastSettings;
    use chrono::TimeZone;

    fn ts(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap()
    }

    async fn setup(
        offset: f64,
        last: DateTime<Utc>,
    ) -> (GapFiller, Arc<DayBlockCache>, Arc<ForecastEngine>, WorkingHistory, ResidualBuffer) {
        let first = last - Duration::hours(199);
        let engine = Arc::new(engine(persistence_bundle(offset), hours_from(first, 200, 1000.0)));
        let cache = Arc::new(DayBlockCache::new(Arc::new(InMemoryCacheStore::new())));
        let ctx = engine.actual_context(last + Duration::hours(1)).await.unwrap();
        (
            GapFiller::new(engine.clone(), cache.clone()),
            cache,
            engine,
            ctx.history,
            ctx.residuals,
        )
    }

    #[test]
    fn test_gap_arithmetic() {
        assert_eq!(gap_hours(ts(1, 23), ts(2, 0)), 0);
        assert_eq!(gap_hours(ts(1, 23), ts(4, 0)), 48);
        assert_eq!(weather_hours_needed(ts(1, 23), ts(4, 0)), 48);
        // trailing partial day needs the rest of that day
        assert_eq!(weather_hours_needed(ts(1, 23), ts(3, 5)), 29 + 19);
        assert_eq!(weather_hours_needed(ts(1, 10), ts(1, 15)), 4 + 9);
    }

    #[tokio::test]
    async fn test_whole_days_are_cached() {
        let last = ts(1, 23);
        let start = ts(4, 0);
        let (filler, cache, engine, history, residuals) = setup(1.0, last).await;
        let weather = engine
            .weather_for(last + Duration::hours(1), weather_hours_needed(last, start))
            .await
            .unwrap();

        let fill = filler
            .fill(history, residuals, start, &weather, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fill.report.gap_hours, 48);
        assert_eq!(fill.report.computed_days, vec![ts(2, 0).date_naive(), ts(3, 0).date_naive()]);
        assert!(fill.report.cached_days.is_empty());
        assert_eq!(fill.history.last_timestamp(), Some(start - Duration::hours(1)));
        let tail: Vec<_> = fill.history.iter().rev().take(48).collect();
        assert!(tail.iter().all(|o| !o.is_actual()));
        assert!(fill.history.is_contiguous());
        assert!(cache.get(ts(2, 0).date_naive()).await.unwrap().is_some());
        assert!(cache.get(ts(3, 0).date_naive()).await.unwrap().is_some());
        // persistence + 1 MW per hour
        assert_eq!(fill.history.last().unwrap().demand_mw, 1048.0);
    }

    #[tokio::test]
    async fn test_cached_days_leave_placeholders() {
        let last = ts(1, 23);
        let start = ts(3, 0);
        let (filler, cache, engine, history, residuals) = setup(0.0, last).await;
        cache.put(ts(2, 0).date_naive(), vec![700.0; 24]).await.unwrap();
        let weather = engine
            .weather_for(last + Duration::hours(1), weather_hours_needed(last, start))
            .await
            .unwrap();

        let fill = filler
            .fill(history, residuals.clone(), start, &weather, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fill.report.cached_days, vec![ts(2, 0).date_naive()]);
        assert_eq!(fill.report.placeholder_hours.len(), 24);
        assert_eq!(fill.report.placeholder_hours[0], ts(2, 0));
        assert_eq!(fill.history.last().unwrap().demand_mw, 700.0);
        assert_eq!(fill.residuals.tail(24), Some(vec![0.0; 24]));
    }

    #[tokio::test]
    async fn test_partial_days_on_both_ends() {
        let last = ts(1, 20);
        let start = ts(3, 5);
        let (filler, cache, engine, history, residuals) = setup(1.0, last).await;
        let weather = engine
            .weather_for(last + Duration::hours(1), weather_hours_needed(last, start))
            .await
            .unwrap();

        let fill = filler
            .fill(history, residuals, start, &weather, &CancellationToken::new())
            .await
            .unwrap();
        // 3 leading hours, one full day, 5 trailing hours
        assert_eq!(fill.report.gap_hours, 32);
        assert_eq!(fill.history.last_timestamp(), Some(ts(3, 4)));
        assert!(fill.history.is_contiguous());
        assert_eq!(fill.history.last().unwrap().demand_mw, 1032.0);
        assert_eq!(
            fill.report.computed_days,
            vec![ts(2, 0).date_naive(), ts(3, 0).date_naive()]
        );
        // the leading partial day is never cached; the trailing one is, as a full block
        assert!(cache.get(ts(1, 0).date_naive()).await.unwrap().is_none());
        let trailing = cache.get(ts(3, 0).date_naive()).await.unwrap().unwrap();
        assert_eq!(trailing.predictions().len(), 24);
    }

    #[tokio::test]
    async fn test_gap_ceiling() {
        let last = ts(1, 23);
        let first = last - Duration::hours(199);
        let settings = ForecastSettings {
            max_gap_hours: 10,
            ..Default::default()
        };
        let engine = Arc::new(ForecastEngine::new(
            persistence_bundle(0.0),
            Arc::new(crate::forecast::calendar::FixedHolidayCalendar::new()),
            Arc::new(crate::repo::InMemoryHistoricalStore::from_observations(hours_from(first, 200, 1.0)).unwrap()),
            Arc::new(crate::repo::ClimatologyWeatherProvider::new()),
            settings,
        ));
        let ctx = engine.actual_context(last + Duration::hours(1)).await.unwrap();
        let filler = GapFiller::new(engine, Arc::new(DayBlockCache::new(Arc::new(InMemoryCacheStore::new()))));
        let err = filler
            .fill(ctx.history, ctx.residuals, ts(3, 0), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ForecastError::GapTooLong { hours: 24, max: 10 });
    }

    #[tokio::test]
    async fn test_predicted_day_cap_only_flags() {
        let last = ts(1, 23);
        let first = last - Duration::hours(199);
        let settings = ForecastSettings {
            predicted_day_cap: Some(1),
            ..Default::default()
        };
        let engine = Arc::new(ForecastEngine::new(
            persistence_bundle(0.0),
            Arc::new(crate::forecast::calendar::FixedHolidayCalendar::new()),
            Arc::new(crate::repo::InMemoryHistoricalStore::from_observations(hours_from(first, 200, 1.0)).unwrap()),
            Arc::new(crate::repo::ClimatologyWeatherProvider::new()),
            settings,
        ));
        let ctx = engine.actual_context(last + Duration::hours(1)).await.unwrap();
        let start = ts(4, 0);
        let weather = engine
            .weather_for(last + Duration::hours(1), weather_hours_needed(last, start))
            .await
            .unwrap();
        let filler = GapFiller::new(engine, Arc::new(DayBlockCache::new(Arc::new(InMemoryCacheStore::new()))));
        let fill = filler
            .fill(ctx.history, ctx.residuals, start, &weather, &CancellationToken::new())
            .await
            .unwrap();
        assert!(fill.report.exceeds_predicted_day_cap);
        assert_eq!(fill.history.last_timestamp(), Some(ts(3, 23)));
    }
}
