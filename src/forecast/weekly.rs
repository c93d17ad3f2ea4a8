use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{DailySummary, ForecastResult};

/// Aggregate hourly predictions into per-date summaries, in date order.
pub fn summarize_daily(result: &ForecastResult) -> Vec<DailySummary> {
    summarize(&result.timestamps, &result.predictions)
}

fn summarize(timestamps: &[DateTime<Utc>], predictions: &[f64]) -> Vec<DailySummary> {
    let mut days: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
    for (ts, p) in timestamps.iter().zip(predictions) {
        let date = ts.date_naive();
        match days.last_mut() {
            Some((d, values)) if *d == date => values.push(*p),
            _ => days.push((date, vec![*p])),
        }
    }
    days.into_iter()
        .map(|(date, values)| {
            let total: f64 = values.iter().sum();
            DailySummary {
                date,
                mean_mw: total / values.len() as f64,
                peak_mw: values.iter().copied().fold(f64::MIN, f64::max),
                min_mw: values.iter().copied().fold(f64::MAX, f64::min),
                // hourly MW values: one MWh per MW-hour
                total_energy_mwh: total,
            }
        })
        .collect()
}
