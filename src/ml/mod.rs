//! Model contracts and artifacts
//!
//! The forecasting core treats trained models as opaque collaborators:
//! - a stateless [`BaselinePredictor`] mapping a feature vector to MW
//! - a [`ResidualCorrector`] mapping a window of scaled residuals to the next
//!   scaled correction
//!
//! Both are bundled with their feature schema and scaling parameters in a
//! [`ModelBundle`], built once at startup and handed to the service.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod artifacts;
pub mod models;
pub mod scaler;
pub mod schema;

pub use artifacts::ModelManifest;
pub use models::{LinearBaseline, LinearResidualCorrector};
pub use scaler::ResidualScaler;
pub use schema::{FeatureKind, FeatureSchema, FeatureSet};

/// Stateless point estimator over an ordered feature vector.
pub trait BaselinePredictor: Send + Sync {
    fn predict(&self, features: &[f64]) -> anyhow::Result<f64>;

    fn model_id(&self) -> &str {
        "baseline"
    }
}

/// Autoregressive corrector over scaled residuals (oldest first).
pub trait ResidualCorrector: Send + Sync {
    /// Number of trailing residuals the corrector consumes.
    fn window_len(&self) -> usize;

    /// Scale the corrector was trained in.
    fn scaler(&self) -> ResidualScaler;

    /// Predict the next scaled correction.
    fn predict(&self, window: &[f64]) -> anyhow::Result<f64>;
}

/// Residual distribution observed on the validation set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualStats {
    pub mean: f64,
    pub std: f64,
}

impl Default for ResidualStats {
    fn default() -> Self {
        Self {
            mean: 9.11,
            std: 89.52,
        }
    }
}

/// Everything the orchestration needs from the model layer.
#[derive(Clone)]
pub struct ModelBundle {
    pub schema: FeatureSchema,
    pub baseline: Arc<dyn BaselinePredictor>,
    pub corrector: Option<Arc<dyn ResidualCorrector>>,
    pub scaler: ResidualScaler,
    pub residual_stats: ResidualStats,
}

impl ModelBundle {
    pub fn new(schema: FeatureSchema, baseline: Arc<dyn BaselinePredictor>) -> Self {
        Self {
            schema,
            baseline,
            corrector: None,
            scaler: ResidualScaler::identity(),
            residual_stats: ResidualStats::default(),
        }
    }

    /// Attach a corrector; the bundle adopts the corrector's scaler.
    pub fn with_corrector(mut self, corrector: Arc<dyn ResidualCorrector>) -> Self {
        self.scaler = corrector.scaler();
        self.corrector = Some(corrector);
        self
    }

    pub fn with_residual_stats(mut self, stats: ResidualStats) -> Self {
        self.residual_stats = stats;
        self
    }

    pub fn feature_set(&self) -> FeatureSet {
        self.schema.variant()
    }

    pub fn has_corrector(&self) -> bool {
        self.corrector.is_some()
    }
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("feature_set", &self.schema.variant())
            .field("features", &self.schema.len())
            .field("baseline", &self.baseline.model_id())
            .field("corrector", &self.corrector.as_ref().map(|c| c.window_len()))
            .field("scaler", &self.scaler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_adopts_corrector_scaler() {
        let schema = FeatureSchema::new(FeatureSet::Compact, vec!["lag_1".to_string()]).unwrap();
        let baseline = Arc::new(LinearBaseline::new("b", vec![1.0], 0.0));
        let scaler = ResidualScaler::new(2.0, 4.0);
        let corrector = Arc::new(LinearResidualCorrector::new(vec![0.5; 3], 0.0, scaler));

        let bundle = ModelBundle::new(schema, baseline);
        assert!(!bundle.has_corrector());
        assert_eq!(bundle.scaler, ResidualScaler::identity());

        let bundle = bundle.with_corrector(corrector);
        assert!(bundle.has_corrector());
        assert_eq!(bundle.scaler, scaler);
        assert_eq!(bundle.feature_set(), FeatureSet::Compact);
    }
}
