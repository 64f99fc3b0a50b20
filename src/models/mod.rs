//! Model families behind the ensemble.
//!
//! Every classifier answers the same question, a probability vector over
//! the three classes, through [`Classifier`]; every property regressor
//! answers with one real value through [`Regressor`]. The serialisable
//! forms ([`ClassifierModel`], [`RegressorModel`]) are tagged enums so a
//! bundle can mix families freely. Tests and tools can plug anything else
//! in through the traits.
//!
//! - `tree` / `binning`: shared histogram CART builder
//! - `forest`: bagged trees (classifier and regressor)
//! - `boosting`: gradient-boosted trees (classifier and regressor)
//! - `mlp`: ReLU network with softmax output
//! - `linear`: multinomial logistic regression
//! - `optim`: Adam optimizer used by the last two

pub mod binning;
pub mod boosting;
pub mod forest;
pub mod linear;
pub mod mlp;
pub mod optim;
pub mod tree;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
pub use forest::{RandomForestClassifier, RandomForestRegressor};
pub use linear::LogisticRegression;
pub use mlp::MlpClassifier;

/// Number of output classes.
pub const NUM_CLASSES: usize = 3;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model expects {expected} input features, got {got}")]
    WidthMismatch { expected: usize, got: usize },

    #[error("malformed model: {reason}")]
    Malformed { reason: String },
}

/// Probability vector over the classes for one scaled feature row.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;
    fn predict_proba(&self, x: &[f64]) -> [f64; NUM_CLASSES];
}

/// One property estimate for one scaled feature row.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, x: &[f64]) -> f64;
}

/// Serialisable classifier member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierModel {
    RandomForest(RandomForestClassifier),
    GradientBoosting(GradientBoostingClassifier),
    Mlp(MlpClassifier),
    LogisticRegression(LogisticRegression),
}

impl ClassifierModel {
    pub fn n_features(&self) -> usize {
        match self {
            Self::RandomForest(m) => m.n_features(),
            Self::GradientBoosting(m) => m.n_features(),
            Self::Mlp(m) => m.n_features(),
            Self::LogisticRegression(m) => m.n_features(),
        }
    }

    /// Structural check plus input width against the running feature list.
    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        if self.n_features() != n_features {
            return Err(ModelError::WidthMismatch {
                expected: n_features,
                got: self.n_features(),
            });
        }
        match self {
            Self::RandomForest(m) => m.validate(),
            Self::GradientBoosting(m) => m.validate(),
            Self::Mlp(m) => m.validate(),
            Self::LogisticRegression(m) => m.validate(),
        }
    }
}

impl Classifier for ClassifierModel {
    fn name(&self) -> &str {
        match self {
            Self::RandomForest(_) => "random_forest",
            Self::GradientBoosting(_) => "gradient_boosting",
            Self::Mlp(_) => "mlp",
            Self::LogisticRegression(_) => "logistic_regression",
        }
    }

    fn predict_proba(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        match self {
            Self::RandomForest(m) => m.predict_proba(x),
            Self::GradientBoosting(m) => m.predict_proba(x),
            Self::Mlp(m) => m.predict_proba(x),
            Self::LogisticRegression(m) => m.predict_proba(x),
        }
    }
}

/// Serialisable regressor member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorModel {
    RandomForest(RandomForestRegressor),
    GradientBoosting(GradientBoostingRegressor),
}

impl RegressorModel {
    pub fn n_features(&self) -> usize {
        match self {
            Self::RandomForest(m) => m.n_features(),
            Self::GradientBoosting(m) => m.n_features(),
        }
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        if self.n_features() != n_features {
            return Err(ModelError::WidthMismatch {
                expected: n_features,
                got: self.n_features(),
            });
        }
        match self {
            Self::RandomForest(m) => m.validate(),
            Self::GradientBoosting(m) => m.validate(),
        }
    }
}

impl Regressor for RegressorModel {
    fn name(&self) -> &str {
        match self {
            Self::RandomForest(_) => "random_forest",
            Self::GradientBoosting(_) => "gradient_boosting",
        }
    }

    fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Self::RandomForest(m) => m.predict(x),
            Self::GradientBoosting(m) => m.predict(x),
        }
    }
}

/// Numerically stable softmax.
pub fn softmax(z: &[f64; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let e = z.map(|v| (v - max).exp());
    let sum: f64 = e.iter().sum();
    if sum.is_finite() && sum > 0.0 {
        e.map(|v| v / sum)
    } else {
        [1.0 / NUM_CLASSES as f64; NUM_CLASSES]
    }
}

/// Independent, reproducible child seed (splitmix64 step).
pub fn derive_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_stable_for_large_logits() {
        let p = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!(p[2] < 1e-12);
    }

    #[test]
    fn test_derive_seed_distinct_streams() {
        assert_ne!(derive_seed(42, 0), derive_seed(42, 1));
        assert_eq!(derive_seed(42, 7), derive_seed(42, 7));
    }

    #[test]
    fn test_tagged_serialisation_names_family() {
        let m = ClassifierModel::LogisticRegression(LogisticRegression::fit(
            &[vec![0.0]],
            &[0],
            &[],
            &crate::config::LogisticParams { iterations: 1, learning_rate: 0.1, c: 1.0 },
        ));
        let v = serde_json::to_value(&m).expect("serialize");
        assert_eq!(v["kind"], "logistic_regression");
        let back: ClassifierModel = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back.name(), "logistic_regression");
        assert!(back.validate(1).is_ok());
        assert!(matches!(back.validate(2), Err(ModelError::WidthMismatch { .. })));
    }
}
