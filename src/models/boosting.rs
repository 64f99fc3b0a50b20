//! Gradient-boosted trees.
//!
//! The classifier follows the multinomial-deviance scheme: one regression
//! tree per class per round, fitted to `y − p` with Newton leaf values
//! `(K−1)/K · Σ(y−p) / Σ p(1−p)`. The regressor fits residuals with mean
//! leaves. Both draw a row subsample (without replacement) every round.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::binning::BinnedMatrix;
use super::tree::{DecisionTree, Target, TreeBuilder, TreeParams};
use super::{derive_seed, softmax, ModelError, NUM_CLASSES};
use crate::config::BoostingParams;

fn tree_params(params: &BoostingParams, n_features: usize) -> TreeParams {
    TreeParams {
        max_depth: params.max_depth,
        min_samples_split: 2 * params.min_samples_leaf.max(1),
        min_samples_leaf: params.min_samples_leaf,
        max_features: n_features,
    }
}

fn subsample(rng: &mut StdRng, rows: &[usize], fraction: f64) -> Vec<usize> {
    let k = ((rows.len() as f64 * fraction).round() as usize).clamp(1, rows.len());
    if k == rows.len() {
        return rows.to_vec();
    }
    index::sample(rng, rows.len(), k).into_iter().map(|i| rows[i]).collect()
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    n_features: usize,
    learning_rate: f64,
    /// Smoothed log class priors (initial raw scores)
    init: [f64; NUM_CLASSES],
    /// One tree per class per round
    rounds: Vec<Vec<DecisionTree>>,
}

impl GradientBoostingClassifier {
    /// Fit on `rows` of the matrix; `x` holds the same rows unbinned.
    pub fn fit(
        x: &[Vec<f64>],
        data: &BinnedMatrix,
        labels: &[usize],
        rows: &[usize],
        params: &BoostingParams,
        seed: u64,
    ) -> Self {
        let n_total = x.len();
        let mut counts = [0usize; NUM_CLASSES];
        for &r in rows {
            counts[labels[r]] += 1;
        }
        // Laplace-smoothed so an absent class keeps a finite prior
        let n = rows.len() as f64 + NUM_CLASSES as f64;
        let init = counts.map(|c| ((c as f64 + 1.0) / n).ln());

        let tp = tree_params(params, data.n_features());
        let scale = (NUM_CLASSES as f64 - 1.0) / NUM_CLASSES as f64;
        let mut raw: Vec<[f64; NUM_CLASSES]> = vec![init; n_total];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rounds = Vec::with_capacity(params.n_rounds);

        for round in 0..params.n_rounds {
            let probs: Vec<[f64; NUM_CLASSES]> = raw.iter().map(|r| softmax(r)).collect();
            let sample = subsample(&mut rng, rows, params.subsample);

            let trees: Vec<DecisionTree> = (0..NUM_CLASSES)
                .into_par_iter()
                .map(|k| {
                    let gradients: Vec<f64> = (0..n_total)
                        .map(|i| f64::from(u8::from(labels[i] == k)) - probs[i][k])
                        .collect();
                    let hessians: Vec<f64> = (0..n_total).map(|i| probs[i][k] * (1.0 - probs[i][k])).collect();
                    let target = Target::Newton {
                        gradients: &gradients,
                        hessians: &hessians,
                        scale,
                    };
                    let tree_rng = StdRng::seed_from_u64(derive_seed(seed, (round * NUM_CLASSES + k) as u64));
                    TreeBuilder::new(data, target, tp, tree_rng).fit(sample.clone())
                })
                .collect();

            for &r in rows {
                for (k, tree) in trees.iter().enumerate() {
                    raw[r][k] += params.learning_rate * tree.predict_value(&x[r]);
                }
            }
            rounds.push(trees);
        }

        Self {
            n_features: data.n_features(),
            learning_rate: params.learning_rate,
            init,
            rounds,
        }
    }

    pub fn predict_proba(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        let mut raw = self.init;
        for trees in &self.rounds {
            for (k, tree) in trees.iter().enumerate() {
                raw[k] += self.learning_rate * tree.predict_value(x);
            }
        }
        softmax(&raw)
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for trees in &self.rounds {
            if trees.len() != NUM_CLASSES {
                return Err(ModelError::Malformed {
                    reason: format!("boosting round has {} trees, expected {NUM_CLASSES}", trees.len()),
                });
            }
            trees.iter().try_for_each(|t| t.validate(self.n_features))?;
        }
        Ok(())
    }
}

// ============================================================================
// Regressor
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    n_features: usize,
    learning_rate: f64,
    init: f64,
    trees: Vec<DecisionTree>,
}

impl GradientBoostingRegressor {
    pub fn fit(
        x: &[Vec<f64>],
        data: &BinnedMatrix,
        targets: &[f64],
        rows: &[usize],
        params: &BoostingParams,
        seed: u64,
    ) -> Self {
        let init = rows.iter().map(|&r| targets[r]).sum::<f64>() / rows.len().max(1) as f64;
        let tp = tree_params(params, data.n_features());
        let mut pred = vec![init; x.len()];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(params.n_rounds);

        for round in 0..params.n_rounds {
            let residuals: Vec<f64> = targets.iter().zip(&pred).map(|(y, p)| y - p).collect();
            let sample = subsample(&mut rng, rows, params.subsample);
            let tree_rng = StdRng::seed_from_u64(derive_seed(seed, round as u64));
            let tree = TreeBuilder::new(data, Target::Values { values: &residuals }, tp, tree_rng).fit(sample);
            for &r in rows {
                pred[r] += params.learning_rate * tree.predict_value(&x[r]);
            }
            trees.push(tree);
        }

        Self {
            n_features: data.n_features(),
            learning_rate: params.learning_rate,
            init,
            trees,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict_value(x)).sum::<f64>()
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_rounds: usize) -> BoostingParams {
        BoostingParams {
            n_rounds,
            learning_rate: 0.2,
            max_depth: 3,
            min_samples_leaf: 3,
            subsample: 0.8,
        }
    }

    #[test]
    fn test_classifier_separates_three_bands() {
        let x: Vec<Vec<f64>> = (0..240).map(|i| vec![f64::from(i % 120), f64::from(i % 5)]).collect();
        let labels: Vec<usize> = x.iter().map(|r| (r[0] / 40.0) as usize).collect();
        let data = BinnedMatrix::from_rows(&x, 64);
        let rows: Vec<usize> = (0..x.len()).collect();
        let gb = GradientBoostingClassifier::fit(&x, &data, &labels, &rows, &params(30), 5);
        assert!(gb.validate().is_ok());

        let p = gb.predict_proba(&[60.0, 2.0]);
        assert!(p[1] > 0.8, "{p:?}");
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_regressor_converges_on_linear_target() {
        let x: Vec<Vec<f64>> = (0..300).map(|i| vec![f64::from(i) / 30.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| 3.0 * r[0]).collect();
        let data = BinnedMatrix::from_rows(&x, 128);
        let rows: Vec<usize> = (0..x.len()).collect();
        let gb = GradientBoostingRegressor::fit(&x, &data, &y, &rows, &params(80), 9);
        assert!((gb.predict(&[5.0]) - 15.0).abs() < 0.5, "got {}", gb.predict(&[5.0]));
    }

    #[test]
    fn test_zero_rounds_predicts_prior() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![0, 0, 0, 2];
        let data = BinnedMatrix::from_rows(&x, 8);
        let gb = GradientBoostingClassifier::fit(&x, &data, &labels, &[0, 1, 2, 3], &params(0), 1);
        let p = gb.predict_proba(&[1.0]);
        assert!(p[0] > p[2] && p[2] > p[1]);
    }
}
