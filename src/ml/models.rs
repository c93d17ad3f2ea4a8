//! Reference model adapters
//!
//! Linear stand-ins for the trained artifacts. Production deployments plug
//! their own implementations in behind the same traits.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{BaselinePredictor, ResidualCorrector, ResidualScaler};

/// Linear baseline: `intercept + Σ coefficient_i * feature_i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearBaseline {
    pub model_id: String,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearBaseline {
    pub fn new(model_id: impl Into<String>, coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            model_id: model_id.into(),
            coefficients,
            intercept,
        }
    }
}

impl BaselinePredictor for LinearBaseline {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            anyhow::bail!(
                "Feature count mismatch: expected {}, got {}",
                self.coefficients.len(),
                features.len()
            );
        }

        let prediction = features
            .iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum::<f64>()
            + self.intercept;

        if !prediction.is_finite() {
            anyhow::bail!("baseline produced a non-finite estimate");
        }
        Ok(prediction)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Linear autoregressive corrector over the trailing scaled residuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearResidualCorrector {
    /// Weights aligned oldest first with the input window.
    pub weights: Vec<f64>,
    pub bias: f64,
    pub scaler: ResidualScaler,
}

impl LinearResidualCorrector {
    pub fn new(weights: Vec<f64>, bias: f64, scaler: ResidualScaler) -> Self {
        Self {
            weights,
            bias,
            scaler,
        }
    }
}

impl ResidualCorrector for LinearResidualCorrector {
    fn window_len(&self) -> usize {
        self.weights.len()
    }

    fn scaler(&self) -> ResidualScaler {
        self.scaler
    }

    fn predict(&self, window: &[f64]) -> Result<f64> {
        if window.len() != self.weights.len() {
            anyhow::bail!(
                "Residual window mismatch: expected {}, got {}",
                self.weights.len(),
                window.len()
            );
        }
        Ok(self.bias
            + window
                .iter()
                .zip(self.weights.iter())
                .map(|(r, w)| r * w)
                .sum::<f64>())
    }
}
