//! Offline training hyperparameters.
//!
//! These only matter to `exo-classifier train`; the serving path reads the
//! fitted bundle and never looks at them.

use serde::{Deserialize, Serialize};

use super::ServiceConfig;

/// Number of candidate features drawn at every tree split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `floor(sqrt(d))`, the usual classification forest choice
    Sqrt,
    /// Every feature, the usual regression forest choice
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All => n_features.max(1),
        }
    }
}

/// Bagged tree ensemble settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

/// Gradient boosting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) per round
    pub subsample: f64,
}

/// Feed-forward network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// L2 penalty on weights
    pub alpha: f64,
}

/// Multinomial logistic regression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticParams {
    pub iterations: usize,
    pub learning_rate: f64,
    /// Inverse regularisation strength
    pub c: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Master seed; every member derives its own seed from it
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Rows generated for the synthetic catalogue
    #[serde(default = "default_catalogue_size")]
    pub catalogue_size: usize,

    #[serde(default = "default_confirmed_fraction")]
    pub confirmed_fraction: f64,

    #[serde(default = "default_candidate_fraction")]
    pub candidate_fraction: f64,

    /// Held-out fraction for evaluation (stratified)
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Stratified k-fold cross-validation of the classifiers; 0 disables it
    #[serde(default)]
    pub cv_folds: usize,

    /// Histogram bins per feature for tree fitting
    #[serde(default = "default_max_bins")]
    pub max_bins: usize,

    #[serde(default = "default_forest")]
    pub forest: ForestParams,

    #[serde(default = "default_boosting")]
    pub boosting: BoostingParams,

    #[serde(default = "default_mlp")]
    pub mlp: MlpParams,

    #[serde(default = "default_logistic")]
    pub logistic: LogisticParams,

    #[serde(default = "default_regressor_forest")]
    pub regressor_forest: ForestParams,

    #[serde(default = "default_regressor_boosting")]
    pub regressor_boosting: BoostingParams,
}

fn default_seed() -> u64 { 42 }
fn default_catalogue_size() -> usize { 5000 }
fn default_confirmed_fraction() -> f64 { 0.30 }
fn default_candidate_fraction() -> f64 { 0.35 }
fn default_test_fraction() -> f64 { 0.2 }
fn default_max_bins() -> usize { 128 }

fn default_forest() -> ForestParams {
    ForestParams {
        n_trees: 100,
        max_depth: 12,
        min_samples_split: 10,
        min_samples_leaf: 4,
        max_features: MaxFeatures::Sqrt,
    }
}

fn default_boosting() -> BoostingParams {
    BoostingParams {
        n_rounds: 60,
        learning_rate: 0.1,
        max_depth: 4,
        min_samples_leaf: 10,
        subsample: 0.8,
    }
}

fn default_mlp() -> MlpParams {
    MlpParams {
        hidden_layers: vec![32, 16],
        epochs: 40,
        batch_size: 64,
        learning_rate: 0.003,
        alpha: 1e-4,
    }
}

fn default_logistic() -> LogisticParams {
    LogisticParams {
        iterations: 300,
        learning_rate: 0.1,
        c: 1.0,
    }
}

fn default_regressor_forest() -> ForestParams {
    ForestParams {
        n_trees: 40,
        max_depth: 12,
        min_samples_split: 4,
        min_samples_leaf: 2,
        max_features: MaxFeatures::All,
    }
}

fn default_regressor_boosting() -> BoostingParams {
    BoostingParams {
        n_rounds: 80,
        learning_rate: 0.1,
        max_depth: 4,
        min_samples_leaf: 5,
        subsample: 0.8,
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            catalogue_size: default_catalogue_size(),
            confirmed_fraction: default_confirmed_fraction(),
            candidate_fraction: default_candidate_fraction(),
            test_fraction: default_test_fraction(),
            cv_folds: 0,
            max_bins: default_max_bins(),
            forest: default_forest(),
            boosting: default_boosting(),
            mlp: default_mlp(),
            logistic: default_logistic(),
            regressor_forest: default_regressor_forest(),
            regressor_boosting: default_regressor_boosting(),
        }
    }
}

impl TrainingConfig {
    pub(crate) fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.catalogue_size < 100 {
            errors.push(format!(
                "training.catalogue_size: need at least 100 rows (got {})",
                self.catalogue_size
            ));
        }
        ServiceConfig::check_unit(self.confirmed_fraction, "training.confirmed_fraction", errors);
        ServiceConfig::check_unit(self.candidate_fraction, "training.candidate_fraction", errors);
        if self.confirmed_fraction + self.candidate_fraction >= 1.0 {
            errors.push("training: confirmed + candidate fractions must leave room for false positives".to_string());
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 0.5) {
            errors.push(format!(
                "training.test_fraction: must be within (0, 0.5) (got {})",
                self.test_fraction
            ));
        }
        if self.cv_folds == 1 || self.cv_folds > 20 {
            errors.push(format!(
                "training.cv_folds: must be 0 (off) or within 2..=20 (got {})",
                self.cv_folds
            ));
        }
        if !(2..=256).contains(&self.max_bins) {
            errors.push(format!("training.max_bins: must be within 2..=256 (got {})", self.max_bins));
        }
        for (name, f) in [("forest", &self.forest), ("regressor_forest", &self.regressor_forest)] {
            if f.n_trees == 0 || f.max_depth == 0 || f.min_samples_leaf == 0 {
                errors.push(format!("training.{name}: n_trees, max_depth and min_samples_leaf must be > 0"));
            }
        }
        for (name, b) in [("boosting", &self.boosting), ("regressor_boosting", &self.regressor_boosting)] {
            if b.n_rounds == 0 || b.max_depth == 0 {
                errors.push(format!("training.{name}: n_rounds and max_depth must be > 0"));
            }
            if !(b.learning_rate > 0.0 && b.learning_rate <= 1.0) {
                errors.push(format!("training.{name}.learning_rate: must be within (0, 1]"));
            }
            if !(b.subsample > 0.0 && b.subsample <= 1.0) {
                errors.push(format!("training.{name}.subsample: must be within (0, 1]"));
            }
        }
        if self.mlp.hidden_layers.is_empty() || self.mlp.hidden_layers.contains(&0) {
            errors.push("training.mlp.hidden_layers: need at least one non-empty layer".to_string());
        }
        if self.mlp.batch_size == 0 || self.mlp.epochs == 0 {
            errors.push("training.mlp: batch_size and epochs must be > 0".to_string());
        }
        if !(self.logistic.c > 0.0) {
            errors.push(format!("training.logistic.c: must be positive (got {})", self.logistic.c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(30), 5);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(30), 30);
    }

    #[test]
    fn test_bad_fractions_rejected() {
        let mut t = TrainingConfig::default();
        t.confirmed_fraction = 0.6;
        t.candidate_fraction = 0.5;
        let mut errors = Vec::new();
        t.collect_errors(&mut errors);
        assert!(errors.iter().any(|e| e.contains("false positives")));
    }

    #[test]
    fn test_cv_folds_range() {
        for (k, ok) in [(0, true), (1, false), (5, true), (21, false)] {
            let t = TrainingConfig { cv_folds: k, ..TrainingConfig::default() };
            let mut errors = Vec::new();
            t.collect_errors(&mut errors);
            assert_eq!(!errors.iter().any(|e| e.contains("cv_folds")), ok, "k = {k}");
        }
    }
}
