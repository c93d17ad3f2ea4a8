//! Numeric helpers for rolling and spectral features

use std::f64::consts::PI;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Quantile with linear interpolation between closest ranks, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// The `k` largest DFT magnitudes over bins `1..n`, descending, zero padded.
pub fn top_spectral_magnitudes(values: &[f64], k: usize) -> Vec<f64> {
    let n = values.len();
    let mut magnitudes: Vec<f64> = (1..n)
        .map(|bin| {
            let (re, im) = values.iter().enumerate().fold((0.0, 0.0), |(re, im), (t, x)| {
                let angle = -2.0 * PI * (bin * t) as f64 / n as f64;
                (re + x * angle.cos(), im + x * angle.sin())
            });
            (re * re + im * im).sqrt()
        })
        .collect();
    magnitudes.sort_by(|a, b| b.total_cmp(a));
    magnitudes.resize(k.max(magnitudes.len()), 0.0);
    magnitudes.truncate(k);
    magnitudes
}
