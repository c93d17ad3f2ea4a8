use crate::domain::ConfidenceInterval;
use crate::ml::ResidualStats;

/// Prediction intervals widening with the square root of the horizon offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceModel {
    pub z_score: f64,
    pub residual_std: f64,
    pub growth_hours: f64,
}

impl ConfidenceModel {
    pub fn new(z_score: f64, stats: ResidualStats, growth_hours: f64) -> Self {
        Self {
            z_score,
            residual_std: stats.std.abs(),
            growth_hours: growth_hours.max(f64::EPSILON),
        }
    }

    /// Half-width at horizon offset `h` (0 = first forecast hour).
    pub fn margin(&self, h: usize) -> f64 {
        self.z_score * self.residual_std * (1.0 + h as f64 / self.growth_hours).sqrt()
    }

    pub fn interval(&self, prediction: f64, h: usize) -> ConfidenceInterval {
        let margin = self.margin(h);
        ConfidenceInterval {
            lower: (prediction - margin).max(0.0),
            upper: prediction + margin,
            margin,
        }
    }

    /// Heuristic 0-100 score; replayed hours with a recorded actual score highest.
    pub fn score(&self, h: usize, has_actual: bool) -> f64 {
        if has_actual {
            95.0
        } else {
            (90.0 - h as f64 / 6.0).max(75.0)
        }
    }
}
