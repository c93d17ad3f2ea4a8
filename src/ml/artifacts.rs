//! Model manifest loading
//!
//! A manifest names the feature-set generation, the training feature order
//! and the parameters of the reference adapters. The feature set is read
//! from the manifest rather than hardcoded so a newer baseline generation can
//! be deployed without code changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{
    FeatureSchema, FeatureSet, LinearBaseline, LinearResidualCorrector, ModelBundle,
    ResidualScaler, ResidualStats,
};
use crate::error::ForecastError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub model_id: String,
    #[serde(default)]
    pub version: Option<String>,
    pub feature_set: FeatureSet,
    pub feature_order: Vec<String>,
    pub baseline: Option<BaselineSpec>,
    #[serde(default)]
    pub corrector: Option<CorrectorSpec>,
    #[serde(default)]
    pub residual_scaler: Option<ResidualScaler>,
    #[serde(default)]
    pub residual_stats: Option<ResidualStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineSpec {
    pub intercept: f64,
    /// Coefficients keyed by feature name; absent names weigh zero.
    pub coefficients: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectorSpec {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl ModelManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: ModelManifest =
            serde_json::from_str(&raw).context("manifest JSON parse failed")?;
        Ok(manifest)
    }

    /// Resolve the schema and build the reference adapters.
    pub fn into_bundle(self) -> Result<ModelBundle, ForecastError> {
        let schema = FeatureSchema::new(self.feature_set, self.feature_order)?;

        let baseline = self.baseline.ok_or_else(|| {
            ForecastError::FatalModelUnavailable(format!(
                "manifest {} has no baseline model",
                self.model_id
            ))
        })?;
        if let Some(unknown) = baseline
            .coefficients
            .keys()
            .find(|name| schema.position(name).is_none())
        {
            return Err(ForecastError::UnknownFeature {
                name: unknown.clone(),
                variant: schema.variant().to_string(),
            });
        }
        let coefficients = schema
            .names()
            .iter()
            .map(|name| baseline.coefficients.get(name).copied().unwrap_or(0.0))
            .collect();
        let baseline = Arc::new(LinearBaseline::new(
            self.model_id.clone(),
            coefficients,
            baseline.intercept,
        ));

        let mut bundle = ModelBundle::new(schema, baseline);
        if let Some(stats) = self.residual_stats {
            bundle = bundle.with_residual_stats(stats);
        }
        if let Some(spec) = self.corrector {
            if spec.weights.is_empty() {
                return Err(ForecastError::Config(
                    "corrector has an empty weight window".to_string(),
                ));
            }
            let scaler = self.residual_scaler.unwrap_or_default();
            bundle = bundle.with_corrector(Arc::new(LinearResidualCorrector::new(
                spec.weights,
                spec.bias,
                scaler,
            )));
        }

        info!(
            model_id = %self.model_id,
            version = self.version.as_deref().unwrap_or("unversioned"),
            feature_set = %bundle.feature_set(),
            features = bundle.schema.len(),
            corrector = bundle.has_corrector(),
            "loaded model bundle"
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manifest_json() -> &'static str {
        r#"{
            "model_id": "hybrid-v2",
            "version": "2.1.0",
            "feature_set": "compact",
            "feature_order": ["hour", "lag_1", "roll24"],
            "baseline": { "intercept": 5.0, "coefficients": { "lag_1": 0.9 } },
            "corrector": { "weights": [0.1, 0.2], "bias": 0.0 },
            "residual_scaler": { "center": 9.11, "scale": 89.52 },
            "residual_stats": { "mean": 9.11, "std": 89.52 }
        }"#
    }

    #[test]
    fn test_load_manifest_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(manifest_json().as_bytes()).unwrap();

        let manifest = ModelManifest::load(file.path()).unwrap();
        assert_eq!(manifest.feature_set, FeatureSet::Compact);
        assert_eq!(manifest.feature_order.len(), 3);

        let bundle = manifest.into_bundle().unwrap();
        assert!(bundle.has_corrector());
        assert_eq!(bundle.scaler, ResidualScaler::new(9.11, 89.52));
        // hour * 0 + lag_1 * 0.9 + roll24 * 0 + 5
        let value = bundle.baseline.predict(&[3.0, 100.0, 7.0]).unwrap();
        assert!((value - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_baseline_is_fatal() {
        let mut manifest: ModelManifest = serde_json::from_str(manifest_json()).unwrap();
        manifest.baseline = None;
        let err = manifest.into_bundle().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_coefficient_rejected() {
        let mut manifest: ModelManifest = serde_json::from_str(manifest_json()).unwrap();
        if let Some(b) = manifest.baseline.as_mut() {
            b.coefficients.insert("lag_48".to_string(), 1.0);
        }
        assert!(matches!(
            manifest.into_bundle(),
            Err(ForecastError::UnknownFeature { .. })
        ));
    }
}
