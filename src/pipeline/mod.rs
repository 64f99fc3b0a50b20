//! Scoring pipeline
//!
//! [`ScoringContext`] owns everything fitted offline (scaler, ensemble,
//! regressors) plus the correction settings, and turns one validated
//! observation into a [`PredictionResult`]:
//!
//! ```text
//! Observation → features → scale → ensemble → correction → properties
//! ```
//!
//! The context is immutable after construction. Callers share it behind an
//! `Arc` (axum state) or hold it as a local (CLI, tests); there is no global.

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::artifacts::{ArtifactError, BundleMetadata, ModelBundle};
use crate::config::{CorrectionConfig, ScoreRules, ServiceConfig};
use crate::correction;
use crate::ensemble::{ClassificationEnsemble, Property, PropertyRegressors};
use crate::features::{FeatureEngineer, FeatureVector};
use crate::preprocessing::{coerce_observation, FeatureScaler, ValidationError};
use crate::types::{Observation, PredictionResult};

#[derive(Debug)]
pub struct ScoringContext {
    engineer: FeatureEngineer,
    scaler: FeatureScaler,
    ensemble: ClassificationEnsemble,
    regressors: PropertyRegressors,
    correction: CorrectionConfig,
    metadata: Option<BundleMetadata>,
}

impl ScoringContext {
    /// Assemble a context from already-built parts (tests inject stubs here).
    pub fn new(
        engineer: FeatureEngineer,
        scaler: FeatureScaler,
        ensemble: ClassificationEnsemble,
        regressors: PropertyRegressors,
        correction: CorrectionConfig,
    ) -> Self {
        Self {
            engineer,
            scaler,
            ensemble,
            regressors,
            correction,
            metadata: None,
        }
    }

    /// Build from a loaded bundle, honouring `models.disabled_members`.
    ///
    /// Fails when no classification member survives.
    pub fn from_bundle(bundle: ModelBundle, config: &ServiceConfig) -> Result<Self, ArtifactError> {
        let ensemble = bundle.classification_ensemble(&config.models.disabled_members);
        if ensemble.is_empty() {
            return Err(ArtifactError::NoClassifiers);
        }
        let regressors = bundle.property_regressors(config.properties.semi_major_axis_source);
        info!(
            members = ?ensemble.member_names(),
            regressors = ?regressors.member_counts(),
            "Scoring context ready"
        );

        Ok(Self {
            engineer: FeatureEngineer::new(&config.features),
            scaler: bundle.scaler,
            ensemble,
            regressors,
            correction: config.correction.clone(),
            metadata: Some(bundle.metadata),
        })
    }

    /// Load the configured bundle and build the context.
    pub fn load(config: &ServiceConfig) -> Result<Self, ArtifactError> {
        let bundle = ModelBundle::load(&config.models.bundle_path)?;
        Self::from_bundle(bundle, config)
    }

    pub fn metadata(&self) -> Option<&BundleMetadata> {
        self.metadata.as_ref()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.ensemble.member_names()
    }

    pub fn regressor_counts(&self) -> Vec<(Property, usize)> {
        self.regressors.member_counts()
    }

    /// Rules behind the confirmation score, shared with diagnostics.
    pub const fn score_rules(&self) -> &ScoreRules {
        &self.correction.rules
    }

    pub fn features(&self, obs: &Observation) -> FeatureVector {
        self.engineer.transform(obs)
    }

    /// Score one validated observation.
    pub fn score(&self, obs: &Observation) -> PredictionResult {
        let x = self.scaler.transform(&self.engineer.transform(obs));
        let ensemble = self.ensemble.predict(&x);
        let outcome = correction::apply(obs, &ensemble.probabilities, &self.correction);

        let probabilities = outcome.probabilities;
        let classification = probabilities.argmax();
        let properties = classification
            .is_planet_like()
            .then(|| self.regressors.estimate(obs, &x));

        debug!(
            %classification,
            confidence = probabilities.confidence(),
            corrected = outcome.applied,
            "Observation scored"
        );

        PredictionResult {
            classification,
            confidence: probabilities.confidence(),
            class_probabilities: probabilities,
            uncertainty: probabilities.normalized_entropy(),
            model_agreement: ensemble.agreement_with(classification),
            properties,
            correction_applied: outcome.applied,
            confirmation_score: outcome.score,
            correction: outcome.original,
        }
    }

    /// Score many observations in parallel; output order matches input.
    pub fn score_many(&self, observations: &[Observation]) -> Vec<PredictionResult> {
        observations.par_iter().map(|obs| self.score(obs)).collect()
    }

    /// Coerce and score raw records in parallel; bad rows become per-row errors.
    pub fn score_records(&self, records: &[Value]) -> Vec<Result<PredictionResult, ValidationError>> {
        records
            .par_iter()
            .map(|record| coerce_observation(record).map(|obs| self.score(&obs)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SemiMajorAxisSource;
    use crate::models::Classifier;
    use crate::types::Classification;
    use serde_json::json;

    struct Fixed([f64; 3]);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn predict_proba(&self, _x: &[f64]) -> [f64; 3] {
            self.0
        }
    }

    fn context(p: [f64; 3]) -> ScoringContext {
        ScoringContext::new(
            FeatureEngineer::default(),
            FeatureScaler::identity(),
            ClassificationEnsemble::new(vec![Box::new(Fixed(p)), Box::new(Fixed(p))]),
            PropertyRegressors::physics_only(SemiMajorAxisSource::Kepler),
            CorrectionConfig::default(),
        )
    }

    fn kepler_long_period() -> Observation {
        Observation::new(289.9, 7.4, 0.00492, 12.0, 0.97, 5627.0, 11.7)
    }

    #[test]
    fn test_correction_lifts_high_score_observation() {
        let r = context([0.42, 0.38, 0.20]).score(&kepler_long_period());
        assert!(r.correction_applied);
        assert_eq!(r.classification, Classification::ConfirmedExoplanet);
        assert!((0.85..=0.95).contains(&r.confidence));
        assert_eq!(r.confirmation_score, Some(100));
        let original = r.correction.expect("correction record");
        assert!((original.original_probabilities.confirmed_exoplanet - 0.42).abs() < 1e-12);
        assert!(r.properties.is_some());
    }

    #[test]
    fn test_false_positive_has_no_properties() {
        let obs = Observation::new(3.0, 5.0, 0.2, 9.0, 1.0, 5800.0, 12.0);
        let r = context([0.05, 0.05, 0.9]).score(&obs);
        assert_eq!(r.classification, Classification::FalsePositive);
        assert!(r.properties.is_none());
        assert!(!r.correction_applied);
        assert_eq!(r.model_agreement, 1.0);
    }

    #[test]
    fn test_confidence_is_max_probability() {
        let r = context([0.2, 0.5, 0.3]).score(&Observation::new(10.0, 3.0, 0.01, 8.0, 1.5, 7000.0, 16.0));
        let max = r.class_probabilities.as_array().into_iter().fold(0.0, f64::max);
        assert_eq!(r.confidence, max);
        assert_eq!(r.classification, Classification::PlanetaryCandidate);
    }

    #[test]
    fn test_records_keep_order_and_report_bad_rows() {
        let ctx = context([0.2, 0.6, 0.2]);
        let good = json!({
            "orbital_period": 10.0, "transit_duration": 3.0, "transit_depth": 0.01, "snr": 12.0,
            "stellar_mass": 1.0, "stellar_temp": 5800.0, "stellar_magnitude": 12.0
        });
        let results = ctx.score_records(&[good.clone(), json!({"snr": 3}), good]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ValidationError::MissingFields(_))));
        assert_eq!(results[0].as_ref().ok(), results[2].as_ref().ok());
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let ctx = context([0.3, 0.3, 0.4]);
        let obs = kepler_long_period();
        assert_eq!(ctx.score(&obs), ctx.score(&obs));
    }
}
