//! Scoring outputs: class distributions, property estimates, results.

use serde::{Deserialize, Serialize};

use super::observation::Classification;

/// Probability over the three classes; always non-negative and summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub confirmed_exoplanet: f64,
    pub planetary_candidate: f64,
    pub false_positive: f64,
}

impl ClassProbabilities {
    /// Build from raw scores, renormalising to a valid distribution.
    ///
    /// Negative and non-finite entries count as zero. An all-zero vector
    /// becomes the uniform distribution.
    pub fn from_array(raw: [f64; 3]) -> Self {
        let cleaned = raw.map(|p| if p.is_finite() && p > 0.0 { p } else { 0.0 });
        let sum: f64 = cleaned.iter().sum();
        let p = if sum > 0.0 {
            cleaned.map(|x| x / sum)
        } else {
            [1.0 / 3.0; 3]
        };
        Self {
            confirmed_exoplanet: p[0],
            planetary_candidate: p[1],
            false_positive: p[2],
        }
    }

    pub const fn as_array(&self) -> [f64; 3] {
        [self.confirmed_exoplanet, self.planetary_candidate, self.false_positive]
    }

    pub const fn get(&self, class: Classification) -> f64 {
        self.as_array()[class.index()]
    }

    /// Most probable class; ties resolve to the earlier class.
    pub fn argmax(&self) -> Classification {
        let p = self.as_array();
        let mut best = 0;
        for i in 1..3 {
            if p[i] > p[best] {
                best = i;
            }
        }
        Classification::from_index(best)
    }

    /// Probability of the most probable class.
    pub fn confidence(&self) -> f64 {
        self.get(self.argmax())
    }

    /// Shannon entropy normalised by `ln 3`, in [0, 1].
    pub fn normalized_entropy(&self) -> f64 {
        let h: f64 = self
            .as_array()
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        (h / 3f64.ln()).clamp(0.0, 1.0)
    }
}

/// Where a property value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    /// Mean over regressor members
    Learned,
    /// Closed-form physics
    Physics,
}

/// One physical property with its spread across regressor members.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyEstimate {
    pub value: f64,
    /// Sample standard deviation across members (0 with fewer than two).
    /// For a Kepler-sourced semi-major axis this is |kepler − learned mean|
    /// instead, and 0 when the learned side fell back to physics.
    pub uncertainty: f64,
    /// Members that produced a finite prediction
    pub members: usize,
    pub source: EstimateSource,
}

/// Regressed physical properties for a planet-like classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanetProperties {
    /// Earth radii
    pub planet_radius: PropertyEstimate,
    /// Kelvin
    pub planet_temp: PropertyEstimate,
    /// AU, from the configured source
    pub semi_major_axis: PropertyEstimate,
    pub impact_parameter: PropertyEstimate,
    /// Kepler's third law value (AU), always reported as a cross-check
    pub semi_major_axis_kepler: f64,
    /// Learned ensemble value, always reported as a cross-check
    pub semi_major_axis_learned: PropertyEstimate,
}

/// Pre-correction state kept for audit when the override is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub original_classification: Classification,
    pub original_confidence: f64,
    pub original_probabilities: ClassProbabilities,
    pub original_uncertainty: f64,
}

/// Everything the pipeline reports for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub classification: Classification,
    /// Max of `class_probabilities`
    pub confidence: f64,
    pub class_probabilities: ClassProbabilities,
    /// Normalised entropy of `class_probabilities`
    pub uncertainty: f64,
    /// Fraction of members whose own vote matches `classification`
    pub model_agreement: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PlanetProperties>,
    pub correction_applied: bool,
    /// Absent when the correction stage is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_score: Option<u8>,
    /// Present only when `correction_applied`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(p: &ClassProbabilities) -> f64 {
        p.as_array().iter().sum()
    }

    #[test]
    fn test_renormalises_to_one() {
        let p = ClassProbabilities::from_array([2.0, 1.0, 1.0]);
        assert!((sum(&p) - 1.0).abs() < 1e-12);
        assert!((p.confirmed_exoplanet - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_garbage_becomes_uniform() {
        let p = ClassProbabilities::from_array([f64::NAN, -1.0, 0.0]);
        assert!((p.false_positive - 1.0 / 3.0).abs() < 1e-12);
        assert!((p.normalized_entropy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_extremes() {
        let certain = ClassProbabilities::from_array([0.0, 0.0, 1.0]);
        assert_eq!(certain.normalized_entropy(), 0.0);
        assert_eq!(certain.argmax(), Classification::FalsePositive);
        assert_eq!(certain.confidence(), 1.0);
    }

    #[test]
    fn test_argmax_tie_prefers_confirmed() {
        let p = ClassProbabilities::from_array([0.4, 0.4, 0.2]);
        assert_eq!(p.argmax(), Classification::ConfirmedExoplanet);
    }
}
