//! Model bundle persistence
//!
//! A bundle is one JSON document holding the fitted scaler, every ensemble
//! member and every property regressor, plus provenance metadata.
//!
//! ## Format
//!
//! - `version`: bumped whenever the layout changes; older files are rejected
//! - `metadata.feature_names`: must equal the running feature list exactly
//! - `classifiers` / `regressors`: tagged by model family (`"kind"`)
//!
//! Saving writes to `<path>.json.tmp` and renames, so a crash never leaves a
//! half-written bundle behind. Loading logs the MD5 digest of the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::defaults::BUNDLE_FORMAT_VERSION;
use crate::config::SemiMajorAxisSource;
use crate::ensemble::{ClassificationEnsemble, Property, PropertyRegressors};
use crate::features::FEATURE_NAMES;
use crate::models::{Classifier, ClassifierModel, Regressor, RegressorModel};
use crate::preprocessing::{FeatureScaler, ScalerError};
use crate::training::EvaluationReport;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("model bundle not found at {0} (run `exo-classifier train` first)")]
    NotFound(PathBuf),

    #[error("failed to access model bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model bundle {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize model bundle: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unsupported bundle version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("bundle feature list does not match this build: {0}")]
    FeatureMismatch(String),

    #[error(transparent)]
    Scaler(#[from] ScalerError),

    #[error("no usable classification members in bundle")]
    NoClassifiers,
}

/// Provenance recorded at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub trained_at: DateTime<Utc>,
    pub crate_version: String,
    pub seed: u64,
    /// Rows surviving cleaning
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub evaluation: Option<EvaluationReport>,
}

/// Regressor members per property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyModels {
    pub planet_radius: Vec<RegressorModel>,
    pub planet_temp: Vec<RegressorModel>,
    pub semi_major_axis: Vec<RegressorModel>,
    pub impact_parameter: Vec<RegressorModel>,
}

impl PropertyModels {
    pub fn get(&self, property: Property) -> &[RegressorModel] {
        match property {
            Property::PlanetRadius => &self.planet_radius,
            Property::PlanetTemp => &self.planet_temp,
            Property::SemiMajorAxis => &self.semi_major_axis,
            Property::ImpactParameter => &self.impact_parameter,
        }
    }

    pub fn get_mut(&mut self, property: Property) -> &mut Vec<RegressorModel> {
        match property {
            Property::PlanetRadius => &mut self.planet_radius,
            Property::PlanetTemp => &mut self.planet_temp,
            Property::SemiMajorAxis => &mut self.semi_major_axis,
            Property::ImpactParameter => &mut self.impact_parameter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub version: u32,
    pub metadata: BundleMetadata,
    pub scaler: FeatureScaler,
    pub classifiers: Vec<ClassifierModel>,
    pub regressors: PropertyModels,
}

impl ModelBundle {
    /// Write atomically (temp file + rename); returns the MD5 digest.
    pub fn save(&self, path: &Path) -> Result<String, ArtifactError> {
        let json = serde_json::to_vec(self)?;
        let io_err = |source| ArtifactError::Io { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json).map_err(io_err)?;
        std::fs::rename(&tmp_path, path).map_err(io_err)?;

        let digest = format!("{:x}", md5::compute(&json));
        info!(path = %path.display(), bytes = json.len(), md5 = %digest, "Model bundle saved");
        Ok(digest)
    }

    /// Read, parse and validate a bundle.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let data = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(path.to_path_buf())
            } else {
                ArtifactError::Io { path: path.to_path_buf(), source }
            }
        })?;
        let bundle: Self = serde_json::from_slice(&data).map_err(|source| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        bundle.validate()?;

        info!(
            path = %path.display(),
            md5 = %format!("{:x}", md5::compute(&data)),
            trained_at = %bundle.metadata.trained_at,
            classifiers = bundle.classifiers.len(),
            "Model bundle loaded"
        );
        Ok(bundle)
    }

    /// Checks that make the whole bundle unusable. Individual broken
    /// members are only dropped later, when the ensembles are built.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.version != BUNDLE_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: self.version,
                expected: BUNDLE_FORMAT_VERSION,
            });
        }
        if self.metadata.feature_names.len() != FEATURE_NAMES.len()
            || self.metadata.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            let first_diff = self
                .metadata
                .feature_names
                .iter()
                .zip(FEATURE_NAMES)
                .position(|(a, b)| a != b)
                .map_or_else(
                    || format!("{} features, expected {}", self.metadata.feature_names.len(), FEATURE_NAMES.len()),
                    |i| format!("feature {i} is '{}', expected '{}'", self.metadata.feature_names[i], FEATURE_NAMES[i]),
                );
            return Err(ArtifactError::FeatureMismatch(first_diff));
        }
        self.scaler.check_width()?;
        Ok(())
    }

    /// Classification members, minus disabled and malformed ones.
    pub fn classification_ensemble(&self, disabled: &[String]) -> ClassificationEnsemble {
        let members: Vec<Box<dyn Classifier>> = self
            .classifiers
            .iter()
            .filter(|m| {
                let name = m.name();
                if disabled.iter().any(|d| d == name) {
                    info!(member = name, "Ensemble member disabled by configuration");
                    return false;
                }
                match m.validate(FEATURE_NAMES.len()) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(member = name, error = %e, "Dropping unusable ensemble member");
                        false
                    }
                }
            })
            .map(|m| Box::new(m.clone()) as Box<dyn Classifier>)
            .collect();
        ClassificationEnsemble::new(members)
    }

    /// Property regressors, minus malformed members.
    pub fn property_regressors(&self, sma_source: SemiMajorAxisSource) -> PropertyRegressors {
        let members = Property::ALL.map(|property| {
            self.regressors
                .get(property)
                .iter()
                .filter(|m| match m.validate(FEATURE_NAMES.len()) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(%property, member = m.name(), error = %e, "Dropping unusable regressor");
                        false
                    }
                })
                .map(|m| Box::new(m.clone()) as Box<dyn Regressor>)
                .collect::<Vec<_>>()
        });
        PropertyRegressors::new(members, sma_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogisticParams;
    use crate::models::LogisticRegression;

    fn tiny_bundle() -> ModelBundle {
        let x = vec![vec![0.0; FEATURE_NAMES.len()], vec![1.0; FEATURE_NAMES.len()]];
        let lr = LogisticRegression::fit(
            &x,
            &[0, 2],
            &[0, 1],
            &LogisticParams { iterations: 20, learning_rate: 0.1, c: 1.0 },
        );
        ModelBundle {
            version: BUNDLE_FORMAT_VERSION,
            metadata: BundleMetadata {
                trained_at: Utc::now(),
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
                seed: 1,
                n_samples: 2,
                n_train: 2,
                n_test: 0,
                feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
                evaluation: None,
            },
            scaler: FeatureScaler::identity(),
            classifiers: vec![ClassifierModel::LogisticRegression(lr)],
            regressors: PropertyModels::default(),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("models").join("bundle.json");
        let bundle = tiny_bundle();
        let digest = bundle.save(&path).expect("save");
        assert_eq!(digest.len(), 32);
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = ModelBundle::load(&path).expect("load");
        let x = vec![0.5; FEATURE_NAMES.len()];
        assert_eq!(
            loaded.classifiers[0].predict_proba(&x),
            bundle.classifiers[0].predict_proba(&x)
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = ModelBundle::load(Path::new("/nonexistent/bundle.json")).expect_err("must fail");
        assert!(matches!(err, ArtifactError::NotFound(_)));
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bundle.json");
        std::fs::write(&path, b"{not json").expect("write");
        assert!(matches!(ModelBundle::load(&path), Err(ArtifactError::Corrupt { .. })));
    }

    #[test]
    fn test_feature_mismatch_rejected() {
        let mut bundle = tiny_bundle();
        bundle.metadata.feature_names.swap(0, 1);
        let err = bundle.validate().expect_err("must fail");
        assert!(matches!(err, ArtifactError::FeatureMismatch(_)));
        assert!(err.to_string().contains("feature 0"));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut bundle = tiny_bundle();
        bundle.version = BUNDLE_FORMAT_VERSION + 1;
        assert!(matches!(bundle.validate(), Err(ArtifactError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_disabled_and_malformed_members_dropped() {
        let mut bundle = tiny_bundle();
        let narrow = LogisticRegression::fit(
            &[vec![0.0; 3]],
            &[0],
            &[0],
            &LogisticParams { iterations: 1, learning_rate: 0.1, c: 1.0 },
        );
        bundle.classifiers.push(ClassifierModel::LogisticRegression(narrow));
        assert_eq!(bundle.classification_ensemble(&[]).len(), 1);
        assert!(bundle.classification_ensemble(&["logistic_regression".to_string()]).is_empty());
    }
}
