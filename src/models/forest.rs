//! Random forests (bagged CART trees).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::binning::BinnedMatrix;
use super::tree::{DecisionTree, Target, TreeBuilder, TreeParams};
use super::{derive_seed, ModelError, NUM_CLASSES};
use crate::config::ForestParams;

fn tree_params(params: &ForestParams, n_features: usize) -> TreeParams {
    TreeParams {
        max_depth: params.max_depth,
        min_samples_split: params.min_samples_split,
        min_samples_leaf: params.min_samples_leaf,
        max_features: params.max_features.resolve(n_features),
    }
}

fn bootstrap(rng: &mut StdRng, rows: &[usize]) -> Vec<usize> {
    (0..rows.len()).map(|_| rows[rng.gen_range(0..rows.len())]).collect()
}

/// `n / (k · n_c)` per row, so every class carries equal total weight.
pub fn balanced_weights(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &l in labels {
        counts[l] += 1;
    }
    let n = labels.len() as f64;
    labels
        .iter()
        .map(|&l| n / (n_classes as f64 * counts[l].max(1) as f64))
        .collect()
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    /// Fit on the rows listed in `rows`, with balanced class weights.
    pub fn fit(data: &BinnedMatrix, labels: &[usize], rows: &[usize], params: &ForestParams, seed: u64) -> Self {
        let weights = balanced_weights(labels, NUM_CLASSES);
        let tp = tree_params(params, data.n_features());
        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, t as u64));
                let sample = bootstrap(&mut rng, rows);
                let target = Target::Classes {
                    labels,
                    weights: &weights,
                    n_classes: NUM_CLASSES,
                };
                TreeBuilder::new(data, target, tp, rng).fit(sample)
            })
            .collect();
        Self {
            n_features: data.n_features(),
            trees,
        }
    }

    pub fn predict_proba(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        let mut acc = [0.0; NUM_CLASSES];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.leaf(x)) {
                *a += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        acc.map(|a| a / n)
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Malformed { reason: "forest has no trees".to_string() });
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
            if tree.value_width() != NUM_CLASSES {
                return Err(ModelError::Malformed {
                    reason: format!("classifier leaf width {} != {NUM_CLASSES}", tree.value_width()),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Regressor
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestRegressor {
    /// Fit on the rows listed in `rows`; `targets` is indexed like the matrix.
    pub fn fit(data: &BinnedMatrix, targets: &[f64], rows: &[usize], params: &ForestParams, seed: u64) -> Self {
        let tp = tree_params(params, data.n_features());
        let trees = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(derive_seed(seed, t as u64));
                let sample = bootstrap(&mut rng, rows);
                TreeBuilder::new(data, Target::Values { values: targets }, tp, rng).fit(sample)
            })
            .collect();
        Self {
            n_features: data.n_features(),
            trees,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_value(x)).sum();
        sum / self.trees.len().max(1) as f64
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Malformed { reason: "forest has no trees".to_string() });
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }
}
