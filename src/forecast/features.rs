//! Feature reconstruction for one target hour
//!
//! Builds the baseline model's input vector from the working history, the
//! weather for the target hour and the holiday calendar, in exactly the order
//! of the model's [`FeatureSchema`]. Lags and trailing windows are resolved
//! by timestamp relative to the target. A lag whose hour is not held reads
//! the nearest held hour, and a window missing hours uses what it holds.
//! Every such substitution is returned as a [`DataQualityNote`].

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::debug;

use super::calendar::HolidayCalendar;
use super::stats;
use crate::domain::{DataQualityNote, Observation, WeatherRecord, WorkingHistory};
use crate::error::{ForecastError, Result};
use crate::ml::schema::{CalendarField, RollingStat, Trig, WeatherField};
use crate::ml::{FeatureKind, FeatureSchema};

/// Fahrenheit threshold between the simple and the polynomial heat index.
const HEAT_INDEX_SWITCH_F: f64 = 80.0;

/// NOAA heat index in °C from air temperature (°C) and relative humidity (%).
///
/// Below 80°F the simple linear form is used, above it the Rothfusz
/// regression. The jump at the boundary is kept as is.
pub fn heat_index(temp_c: f64, rh: f64) -> f64 {
    let t = temp_c * 9.0 / 5.0 + 32.0;
    let hi = if t < HEAT_INDEX_SWITCH_F {
        0.5 * (t + 61.0 + (t - 68.0) * 1.2 + rh * 0.094)
    } else {
        -42.379 + 2.04901523 * t + 10.14333127 * rh
            - 0.22475541 * t * rh
            - 0.00683783 * t * t
            - 0.05481717 * rh * rh
            + 0.00122874 * t * t * rh
            + 0.00085282 * t * rh * rh
            - 0.00000199 * t * t * rh * rh
    };
    (hi - 32.0) * 5.0 / 9.0
}

/// Ordered model input plus the substitutions made while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub notes: Vec<DataQualityNote>,
}

impl FeatureVector {
    pub fn is_degraded(&self) -> bool {
        !self.notes.is_empty()
    }
}

#[derive(Clone)]
pub struct FeatureReconstructor {
    schema: FeatureSchema,
    holidays: Arc<dyn HolidayCalendar>,
    floor: usize,
}

impl FeatureReconstructor {
    pub fn new(schema: FeatureSchema, holidays: Arc<dyn HolidayCalendar>, floor: usize) -> Self {
        Self {
            schema,
            holidays,
            floor: floor.max(1),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Minimum history length accepted by [`Self::reconstruct`].
    pub fn floor(&self) -> usize {
        self.floor
    }

    #[tracing::instrument(level = "trace", skip(self, history, weather), fields(len = history.len()))]
    pub fn reconstruct(
        &self,
        target: DateTime<Utc>,
        history: &WorkingHistory,
        weather: &WeatherRecord,
    ) -> Result<FeatureVector> {
        if history.len() < self.floor {
            return Err(ForecastError::InsufficientHistory {
                required: self.floor,
                available: history.len(),
            });
        }
        if let Some(last) = history.last_timestamp() {
            if last >= target {
                return Err(ForecastError::HistoryMisaligned { target, last });
            }
        }

        let mut ctx = Context {
            target,
            history,
            weather,
            holidays: self.holidays.as_ref(),
            feature: "",
            notes: Vec::new(),
        };
        let values = self
            .schema
            .names()
            .iter()
            .zip(self.schema.kinds())
            .map(|(name, kind)| {
                ctx.feature = name.as_str();
                ctx.value(kind)
            })
            .collect();

        Ok(FeatureVector {
            values,
            notes: ctx.notes,
        })
    }
}

impl std::fmt::Debug for FeatureReconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureReconstructor")
            .field("feature_set", &self.schema.variant())
            .field("features", &self.schema.len())
            .field("floor", &self.floor)
            .finish()
    }
}

struct Context<'a> {
    target: DateTime<Utc>,
    history: &'a WorkingHistory,
    weather: &'a WeatherRecord,
    holidays: &'a dyn HolidayCalendar,
    feature: &'a str,
    notes: Vec<DataQualityNote>,
}

impl<'a> Context<'a> {
    fn value(&mut self, kind: &FeatureKind) -> f64 {
        match *kind {
            FeatureKind::Calendar(field) => self.calendar(field),
            FeatureKind::Cyclic(field, trig) => {
                let angle = 2.0 * PI * self.calendar(field) / field.period();
                match trig {
                    Trig::Sin => angle.sin(),
                    Trig::Cos => angle.cos(),
                }
            }
            FeatureKind::HourOfWeek => {
                self.calendar(CalendarField::DayOfWeek) * 24.0 + self.calendar(CalendarField::Hour)
            }
            FeatureKind::IsWeekend => flag(self.target.weekday().num_days_from_monday() >= 5),
            FeatureKind::IsHoliday => flag(self.holidays.is_holiday(self.target.date_naive())),
            FeatureKind::DaysSinceHoliday => {
                self.holidays.days_since_last(self.target.date_naive()) as f64
            }
            FeatureKind::DaysToHoliday => self.holidays.days_to_next(self.target.date_naive()) as f64,
            FeatureKind::Weather(field) => self.weather_field(field),
            FeatureKind::HeatIndex => {
                heat_index(self.weather.temperature_c, self.weather.humidity_percent)
            }
            FeatureKind::TempSolarInteraction => {
                self.weather.temperature_c * self.weather.solar_generation_mw / 100.0
            }
            FeatureKind::TempHumidityInteraction => {
                self.weather.temperature_c * self.weather.humidity_percent / 100.0
            }
            FeatureKind::DemandLag(n) => self.lag(n),
            FeatureKind::TemperatureLag(n) => self.temperature_lag(n),
            FeatureKind::Rolling { stat, window } => {
                let slice = self.trailing(window);
                match stat {
                    RollingStat::Mean => stats::mean(&slice),
                    RollingStat::Std => stats::std_dev(&slice),
                    RollingStat::Q25 => stats::quantile(&slice, 0.25),
                    RollingStat::Q75 => stats::quantile(&slice, 0.75),
                }
            }
            FeatureKind::Diff1h => self.lag(1) - self.lag(2),
            FeatureKind::Diff24h => self.lag(1) - self.lag(24),
            FeatureKind::SecondDiff1h => {
                let (l1, l2, l3) = (self.lag(1), self.lag(2), self.lag(3));
                (l1 - l2) - (l2 - l3)
            }
            FeatureKind::SpectralAmplitude { rank, window } => {
                let slice = self.trailing(window);
                stats::top_spectral_magnitudes(&slice, rank)
                    .last()
                    .copied()
                    .unwrap_or(0.0)
            }
        }
    }

    fn calendar(&self, field: CalendarField) -> f64 {
        match field {
            CalendarField::Hour => self.target.hour() as f64,
            CalendarField::DayOfWeek => self.target.weekday().num_days_from_monday() as f64,
            CalendarField::DayOfYear => self.target.ordinal() as f64,
            CalendarField::Month => self.target.month() as f64,
        }
    }

    fn weather_field(&self, field: WeatherField) -> f64 {
        let w = self.weather;
        match field {
            WeatherField::Temperature => w.temperature_c,
            WeatherField::Humidity => w.humidity_percent,
            WeatherField::ApparentTemperature => w.apparent_temperature(),
            WeatherField::SolarRadiation => w.solar_radiation_wm2,
            WeatherField::Precipitation => w.precipitation_mm,
            WeatherField::WindSpeed => w.wind_speed_ms,
            WeatherField::CloudCover => w.cloud_cover_percent,
            WeatherField::SolarGeneration => w.solar_generation_mw,
        }
    }

    /// The observation at `target - n h`, or the nearest held one.
    fn lagged(&mut self, n: usize) -> Option<&'a Observation> {
        let history = self.history;
        let wanted = self.target - Duration::hours(n as i64);
        let found = history.nearest(wanted)?;
        if found.timestamp != wanted {
            let used = (self.target - found.timestamp).num_hours().max(0) as usize;
            self.note(n, used);
        }
        Some(found)
    }

    fn lag(&mut self, n: usize) -> f64 {
        self.lagged(n).map(|o| o.demand_mw).unwrap_or(0.0)
    }

    fn temperature_lag(&mut self, n: usize) -> f64 {
        match self.lagged(n).and_then(|o| o.weather.as_ref()) {
            Some(w) => w.temperature_c,
            None => {
                self.note(n, 0);
                self.weather.temperature_c
            }
        }
    }

    /// Demand held in `[target - window h, target)`, oldest first.
    fn trailing(&mut self, window: usize) -> Vec<f64> {
        let from = self.target - Duration::hours(window as i64);
        let values: Vec<f64> = self
            .history
            .between(from, self.target)
            .map(|o| o.demand_mw)
            .collect();
        if values.len() < window {
            self.note(window, values.len());
        }
        values
    }

    fn note(&mut self, requested: usize, used: usize) {
        debug!(
            feature = self.feature,
            target = %self.target,
            requested,
            used,
            "feature read a shorter history than requested"
        );
        self.notes.push(DataQualityNote {
            timestamp: self.target,
            feature: self.feature.to_string(),
            requested_hours: requested,
            used_hours: used,
        });
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;
    use crate::forecast::calendar::FixedHolidayCalendar;
    use crate::ml::schema::{compact_feature_order, extended_feature_order};
    use crate::ml::FeatureSet;
    use chrono::{Duration, TimeZone};

    fn target() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap()
    }

    fn history(len: usize, value: impl Fn(usize) -> f64) -> WorkingHistory {
        let start = target() - Duration::hours(len as i64);
        WorkingHistory::from_observations(
            168,
            (0..len).map(|i| {
                let ts = start + Duration::hours(i as i64);
                Observation::actual(ts, value(i), Some(WeatherRecord::average_at(ts)))
            }),
        )
        .unwrap()
    }

    fn reconstructor(set: FeatureSet) -> FeatureReconstructor {
        let names = match set {
            FeatureSet::Compact => compact_feature_order(),
            FeatureSet::Extended => extended_feature_order(),
        };
        let holidays = FixedHolidayCalendar::new().with_recurring(1, 26);
        FeatureReconstructor::new(FeatureSchema::new(set, names).unwrap(), Arc::new(holidays), 24)
    }

    #[test]
    fn test_constant_history_lags_and_rolls() {
        let r = reconstructor(FeatureSet::Compact);
        let fv = r
            .reconstruct(target(), &history(168, |_| 1000.0), &WeatherRecord::average_at(target()))
            .unwrap();
        let schema = r.schema();
        for name in ["lag_1", "lag_24", "lag_168", "roll24", "roll168"] {
            assert_eq!(fv.values[schema.position(name).unwrap()], 1000.0, "{name}");
        }
        assert!(fv.notes.is_empty());
        // 2025-01-08 is a Wednesday
        assert_eq!(fv.values[schema.position("dow").unwrap()], 2.0);
        assert_eq!(fv.values[schema.position("hour_of_week").unwrap()], 48.0);
    }

    #[test]
    fn test_lags_index_from_newest() {
        let r = reconstructor(FeatureSet::Compact);
        let fv = r
            .reconstruct(target(), &history(168, |i| i as f64), &WeatherRecord::average_at(target()))
            .unwrap();
        let schema = r.schema();
        assert_eq!(fv.values[schema.position("lag_1").unwrap()], 167.0);
        assert_eq!(fv.values[schema.position("lag_24").unwrap()], 144.0);
        assert_eq!(fv.values[schema.position("lag_168").unwrap()], 0.0);
        assert_eq!(fv.values[schema.position("roll24").unwrap()], 155.5);
    }

    /// 168 contiguous hours ending before the target, minus `missing`
    /// (hours before target); each value is its distance from the target.
    fn history_with_holes(missing: &[i64]) -> WorkingHistory {
        WorkingHistory::from_observations(
            168,
            (1..=168i64).rev().filter(|h| !missing.contains(h)).map(|h| {
                let ts = target() - Duration::hours(h);
                Observation::actual(ts, h as f64, Some(WeatherRecord::average_at(ts)))
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_hole_does_not_shift_lags() {
        let r = reconstructor(FeatureSet::Compact);
        let fv = r
            .reconstruct(target(), &history_with_holes(&[10]), &WeatherRecord::average_at(target()))
            .unwrap();
        let schema = r.schema();
        assert_eq!(fv.values[schema.position("lag_1").unwrap()], 1.0);
        assert_eq!(fv.values[schema.position("lag_24").unwrap()], 24.0);
        assert_eq!(fv.values[schema.position("lag_168").unwrap()], 168.0);
        let roll24 = (1..=24).filter(|h| *h != 10).sum::<i64>() as f64 / 23.0;
        assert!((fv.values[schema.position("roll24").unwrap()] - roll24).abs() < 1e-9);

        assert!(fv.notes.iter().all(|n| !n.feature.starts_with("lag_")));
        let roll = fv.notes.iter().find(|n| n.feature == "roll24").unwrap();
        assert_eq!((roll.requested_hours, roll.used_hours), (24, 23));
    }

    #[test]
    fn test_missing_lag_hour_reads_nearest() {
        let r = reconstructor(FeatureSet::Compact);
        let fv = r
            .reconstruct(target(), &history_with_holes(&[24]), &WeatherRecord::average_at(target()))
            .unwrap();
        // 23h and 25h back are equally near; the newer one wins
        assert_eq!(fv.values[r.schema().position("lag_24").unwrap()], 23.0);
        let note = fv.notes.iter().find(|n| n.feature == "lag_24").unwrap();
        assert_eq!(note.timestamp, target());
        assert_eq!((note.requested_hours, note.used_hours), (24, 23));
    }

    #[test]
    fn test_below_floor_fails() {
        let r = reconstructor(FeatureSet::Compact);
        let err = r
            .reconstruct(target(), &history(23, |_| 1.0), &WeatherRecord::average_at(target()))
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::InsufficientHistory {
                required: 24,
                available: 23
            }
        );
    }

    #[test]
    fn test_short_history_degrades_with_notes() {
        let r = reconstructor(FeatureSet::Compact);
        let fv = r
            .reconstruct(target(), &history(48, |i| i as f64), &WeatherRecord::average_at(target()))
            .unwrap();
        let schema = r.schema();
        assert_eq!(fv.values[schema.position("lag_168").unwrap()], 0.0);
        assert_eq!(fv.values[schema.position("roll168").unwrap()], 23.5);
        let features: Vec<_> = fv.notes.iter().map(|n| n.feature.as_str()).collect();
        assert_eq!(features, vec!["lag_168", "roll168"]);
        assert_eq!(fv.notes[0].used_hours, 48);
    }

    #[test]
    fn test_history_must_end_before_target() {
        let r = reconstructor(FeatureSet::Compact);
        let h = history(30, |_| 1.0);
        let err = r
            .reconstruct(target() - Duration::hours(1), &h, &WeatherRecord::average_at(target()))
            .unwrap_err();
        assert!(matches!(err, ForecastError::HistoryMisaligned { .. }));
    }

    #[test]
    fn test_extended_vector_shape() {
        let r = reconstructor(FeatureSet::Extended);
        let fv = r
            .reconstruct(
                target(),
                &history(168, |i| 1000.0 + (i % 24) as f64),
                &WeatherRecord::average_at(target()),
            )
            .unwrap();
        assert_eq!(fv.values.len(), r.schema().len());
        assert!(fv.values.iter().all(|v| v.is_finite()));
        let schema = r.schema();
        assert_eq!(fv.values[schema.position("demand_diff_1h").unwrap()], 1.0);
        assert_eq!(fv.values[schema.position("demand_diff_24h").unwrap()], 23.0);
        assert_eq!(fv.values[schema.position("demand_diff2_1h").unwrap()], 0.0);
        assert_eq!(fv.values[schema.position("days_to_next_holiday").unwrap()], 18.0);
        assert!((fv.values[schema.position("hour_cos").unwrap()] - 1.0).abs() < 1e-12);
        assert!(fv.values[schema.position("fft_amp_1_168").unwrap()] > 0.0);
    }

    #[test]
    fn test_heat_index_branches() {
        // 25°C = 77°F: simple branch
        let simple = heat_index(25.0, 60.0);
        let t = 77.0;
        let expected = (0.5 * (t + 61.0 + (t - 68.0) * 1.2 + 60.0 * 0.094) - 32.0) * 5.0 / 9.0;
        assert!((simple - expected).abs() < 1e-12);

        // 35°C at 60% RH is well above 40°C feels-like
        assert!(heat_index(35.0, 60.0) > 40.0);

        // discontinuity at the switch is preserved
        let below = heat_index((79.999 - 32.0) * 5.0 / 9.0, 90.0);
        let above = heat_index((80.0 - 32.0) * 5.0 / 9.0, 90.0);
        assert!((above - below).abs() > 0.5);
    }
}
