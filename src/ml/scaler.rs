//! Affine scaling for residual values.
//!
//! Residual windows fed to the corrector are always in the scale the
//! corrector was trained with; values are only unscaled at the output
//! boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualScaler {
    pub center: f64,
    pub scale: f64,
}

impl ResidualScaler {
    pub fn new(center: f64, scale: f64) -> Self {
        Self { center, scale }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Map a raw residual (MW) into model scale.
    pub fn transform(&self, value: f64) -> f64 {
        if self.scale.abs() < 1e-12 {
            return 0.0;
        }
        (value - self.center) / self.scale
    }

    /// Map a scaled correction back into MW.
    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.scale + self.center
    }
}

impl Default for ResidualScaler {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for ResidualScaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "center={:.4}, scale={:.4}", self.center, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_and_inverse() {
        let scaler = ResidualScaler::new(9.11, 89.52);
        let scaled = scaler.transform(98.63);
        assert!((scaled - 1.0).abs() < 1e-9);
        assert!((scaler.inverse(scaled) - 98.63).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_scale() {
        let scaler = ResidualScaler::new(5.0, 0.0);
        assert_eq!(scaler.transform(100.0), 0.0);
        assert_eq!(scaler.inverse(3.0), 5.0);
    }
}
