//! Ordered feature schemas.
//!
//! A trained baseline model ships with its feature names in training order.
//! Every name is resolved into a [`FeatureKind`] when the schema is built, so
//! a name the reconstructor cannot compute is rejected at load time instead
//! of being zero-filled at inference time.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ForecastError, Result};

/// Feature-set generation a baseline model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeatureSet {
    /// Raw calendar ordinals, three demand lags and two rolling means.
    Compact,
    /// Sine/cosine calendar encoding, weather interactions, full lag,
    /// rolling, difference and spectral groups.
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Hour,
    DayOfWeek,
    DayOfYear,
    Month,
}

impl CalendarField {
    /// Period used for cyclical encoding.
    pub fn period(self) -> f64 {
        match self {
            CalendarField::Hour => 24.0,
            CalendarField::DayOfWeek => 7.0,
            CalendarField::DayOfYear => 365.0,
            CalendarField::Month => 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trig {
    Sin,
    Cos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherField {
    Temperature,
    Humidity,
    ApparentTemperature,
    SolarRadiation,
    Precipitation,
    WindSpeed,
    CloudCover,
    SolarGeneration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingStat {
    Mean,
    Std,
    Q25,
    Q75,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Calendar(CalendarField),
    Cyclic(CalendarField, Trig),
    HourOfWeek,
    IsWeekend,
    IsHoliday,
    DaysSinceHoliday,
    DaysToHoliday,
    Weather(WeatherField),
    HeatIndex,
    TempSolarInteraction,
    TempHumidityInteraction,
    DemandLag(usize),
    TemperatureLag(usize),
    Rolling { stat: RollingStat, window: usize },
    Diff1h,
    Diff24h,
    SecondDiff1h,
    /// `rank`-th largest non-DC DFT magnitude over a trailing window.
    SpectralAmplitude { rank: usize, window: usize },
}

impl FeatureKind {
    /// Number of trailing hours the feature wants to read.
    pub fn lookback(&self) -> usize {
        match self {
            FeatureKind::DemandLag(n) | FeatureKind::TemperatureLag(n) => *n,
            FeatureKind::Rolling { window, .. } | FeatureKind::SpectralAmplitude { window, .. } => {
                *window
            }
            FeatureKind::Diff1h => 2,
            FeatureKind::SecondDiff1h => 3,
            FeatureKind::Diff24h => 24,
            _ => 0,
        }
    }
}

impl FeatureSet {
    /// Resolve one training-time feature name for this variant.
    pub fn resolve(self, name: &str) -> Option<FeatureKind> {
        match self {
            FeatureSet::Compact => resolve_compact(name),
            FeatureSet::Extended => resolve_extended(name),
        }
    }
}

fn resolve_compact(name: &str) -> Option<FeatureKind> {
    use FeatureKind::*;
    let kind = match name {
        "hour" => Calendar(CalendarField::Hour),
        "dow" => Calendar(CalendarField::DayOfWeek),
        "doy" => Calendar(CalendarField::DayOfYear),
        "month" => Calendar(CalendarField::Month),
        "hour_of_week" => HourOfWeek,
        "is_weekend" => IsWeekend,
        "is_holiday" => IsHoliday,
        "temperature_2m" => Weather(WeatherField::Temperature),
        "relativehumidity_2m" => Weather(WeatherField::Humidity),
        "apparent_temperature" => Weather(WeatherField::ApparentTemperature),
        "shortwave_radiation" => Weather(WeatherField::SolarRadiation),
        "precipitation" => Weather(WeatherField::Precipitation),
        "wind_speed_10m" => Weather(WeatherField::WindSpeed),
        "cloud_cover" => Weather(WeatherField::CloudCover),
        "heat_index" => HeatIndex,
        _ => {
            if let Some(n) = parse_suffix(name, "lag_") {
                DemandLag(n)
            } else if let Some(n) = parse_suffix(name, "roll") {
                Rolling {
                    stat: RollingStat::Mean,
                    window: n,
                }
            } else {
                return None;
            }
        }
    };
    Some(kind)
}

fn resolve_extended(name: &str) -> Option<FeatureKind> {
    use FeatureKind::*;
    let kind = match name {
        "hour_sin" => Cyclic(CalendarField::Hour, Trig::Sin),
        "hour_cos" => Cyclic(CalendarField::Hour, Trig::Cos),
        "dow_sin" => Cyclic(CalendarField::DayOfWeek, Trig::Sin),
        "dow_cos" => Cyclic(CalendarField::DayOfWeek, Trig::Cos),
        "doy_sin" => Cyclic(CalendarField::DayOfYear, Trig::Sin),
        "doy_cos" => Cyclic(CalendarField::DayOfYear, Trig::Cos),
        "month_sin" => Cyclic(CalendarField::Month, Trig::Sin),
        "month_cos" => Cyclic(CalendarField::Month, Trig::Cos),
        "temperature" => Weather(WeatherField::Temperature),
        "humidity" => Weather(WeatherField::Humidity),
        "cloud_cover" => Weather(WeatherField::CloudCover),
        "solar_generation" => Weather(WeatherField::SolarGeneration),
        "wind_speed" => Weather(WeatherField::WindSpeed),
        "precipitation" => Weather(WeatherField::Precipitation),
        "temp_solar_interaction" => TempSolarInteraction,
        "temp_humidity_interaction" => TempHumidityInteraction,
        "heat_index" => HeatIndex,
        "is_weekend" => IsWeekend,
        "is_holiday" => IsHoliday,
        "demand_diff_1h" => Diff1h,
        "demand_diff_24h" => Diff24h,
        "demand_diff2_1h" => SecondDiff1h,
        "days_since_last_holiday" => DaysSinceHoliday,
        "days_to_next_holiday" => DaysToHoliday,
        _ => return resolve_extended_parametric(name),
    };
    Some(kind)
}

fn resolve_extended_parametric(name: &str) -> Option<FeatureKind> {
    if let Some(n) = parse_suffix(name, "demand_lag_") {
        return Some(FeatureKind::DemandLag(n));
    }
    if let Some(n) = parse_suffix(name, "temp_lag_") {
        return Some(FeatureKind::TemperatureLag(n));
    }
    if let Some(rest) = name.strip_prefix("demand_roll_") {
        let (stat, window) = rest.split_once('_')?;
        let stat = match stat {
            "mean" => RollingStat::Mean,
            "std" => RollingStat::Std,
            "q25" => RollingStat::Q25,
            "q75" => RollingStat::Q75,
            _ => return None,
        };
        let window = parse_positive(window)?;
        return Some(FeatureKind::Rolling { stat, window });
    }
    if let Some(rest) = name.strip_prefix("fft_amp_") {
        let (rank, window) = rest.split_once('_')?;
        let rank = parse_positive(rank)?;
        let window = parse_positive(window)?;
        if rank > 3 || window < 24 {
            return None;
        }
        return Some(FeatureKind::SpectralAmplitude { rank, window });
    }
    None
}

fn parse_suffix(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix).and_then(parse_positive)
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok().filter(|n| *n > 0)
}

/// Feature names in training order together with their resolved kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    variant: FeatureSet,
    names: Vec<String>,
    kinds: Vec<FeatureKind>,
}

impl FeatureSchema {
    pub fn new(variant: FeatureSet, names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(ForecastError::Config("feature order is empty".to_string()));
        }
        let kinds = names
            .iter()
            .map(|name| {
                variant
                    .resolve(name)
                    .ok_or_else(|| ForecastError::UnknownFeature {
                        name: name.clone(),
                        variant: variant.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            variant,
            names,
            kinds,
        })
    }

    pub fn variant(&self) -> FeatureSet {
        self.variant
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn max_lookback(&self) -> usize {
        self.kinds.iter().map(FeatureKind::lookback).max().unwrap_or(0)
    }
}

/// Feature order used by the compact baseline generation.
pub fn compact_feature_order() -> Vec<String> {
    [
        "is_holiday",
        "dow",
        "hour",
        "is_weekend",
        "month",
        "hour_of_week",
        "temperature_2m",
        "relativehumidity_2m",
        "apparent_temperature",
        "shortwave_radiation",
        "precipitation",
        "wind_speed_10m",
        "heat_index",
        "lag_1",
        "lag_24",
        "lag_168",
        "roll24",
        "roll168",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Feature order used by the extended baseline generation.
pub fn extended_feature_order() -> Vec<String> {
    let mut names: Vec<String> = [
        "hour_cos",
        "hour_sin",
        "dow_cos",
        "dow_sin",
        "doy_cos",
        "doy_sin",
        "month_cos",
        "month_sin",
        "temperature",
        "solar_generation",
        "humidity",
        "cloud_cover",
        "temp_solar_interaction",
        "temp_humidity_interaction",
        "heat_index",
        "is_weekend",
        "is_holiday",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let lags = [1, 2, 3, 6, 12, 24, 48, 72, 168];
    names.extend(lags.iter().map(|l| format!("demand_lag_{l}")));
    names.extend(lags.iter().map(|l| format!("temp_lag_{l}")));
    for window in [6, 12, 24, 168] {
        for stat in ["mean", "std", "q25", "q75"] {
            names.push(format!("demand_roll_{stat}_{window}"));
        }
    }
    names.extend(
        ["demand_diff_1h", "demand_diff_24h", "demand_diff2_1h"]
            .iter()
            .map(|s| s.to_string()),
    );
    names.extend((1..=3).map(|k| format!("fft_amp_{k}_168")));
    names.push("days_since_last_holiday".to_string());
    names.push("days_to_next_holiday".to_string());
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set_parse() {
        assert_eq!("compact".parse::<FeatureSet>().unwrap(), FeatureSet::Compact);
        assert_eq!("extended".parse::<FeatureSet>().unwrap(), FeatureSet::Extended);
        assert_eq!(FeatureSet::Extended.to_string(), "extended");
    }

    #[test]
    fn test_compact_resolution() {
        let schema = FeatureSchema::new(FeatureSet::Compact, compact_feature_order()).unwrap();
        assert_eq!(schema.len(), 18);
        assert_eq!(schema.kinds()[13], FeatureKind::DemandLag(1));
        assert_eq!(
            schema.kinds()[17],
            FeatureKind::Rolling {
                stat: RollingStat::Mean,
                window: 168
            }
        );
        assert_eq!(schema.max_lookback(), 168);
    }

    #[test]
    fn test_extended_resolution() {
        let schema = FeatureSchema::new(FeatureSet::Extended, extended_feature_order()).unwrap();
        assert_eq!(schema.len(), 17 + 18 + 16 + 3 + 3 + 2);
        let idx = schema.position("fft_amp_2_168").unwrap();
        assert_eq!(
            schema.kinds()[idx],
            FeatureKind::SpectralAmplitude {
                rank: 2,
                window: 168
            }
        );
    }

    #[test]
    fn test_order_is_preserved() {
        let names = vec!["lag_24".to_string(), "hour".to_string(), "lag_1".to_string()];
        let schema = FeatureSchema::new(FeatureSet::Compact, names.clone()).unwrap();
        assert_eq!(schema.names(), names.as_slice());
        assert_eq!(schema.kinds()[0], FeatureKind::DemandLag(24));
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let err = FeatureSchema::new(FeatureSet::Compact, vec!["hour_sin".to_string()]).unwrap_err();
        assert!(matches!(err, ForecastError::UnknownFeature { .. }));

        let err = FeatureSchema::new(FeatureSet::Extended, vec!["lag_0".to_string()]).unwrap_err();
        assert!(matches!(err, ForecastError::UnknownFeature { .. }));
    }

    #[test]
    fn test_spectral_rank_limit() {
        assert!(FeatureSet::Extended.resolve("fft_amp_4_168").is_none());
        assert!(FeatureSet::Extended.resolve("fft_amp_1_12").is_none());
    }
}
