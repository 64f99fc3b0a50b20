//! Multinomial logistic regression with L2 regularisation.

use serde::{Deserialize, Serialize};

use super::forest::balanced_weights;
use super::optim::AdamOptimizer;
use super::{softmax, ModelError, NUM_CLASSES};
use crate::config::LogisticParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    n_features: usize,
    /// `NUM_CLASSES × n_features`, row-major
    weights: Vec<f64>,
    bias: [f64; NUM_CLASSES],
}

impl LogisticRegression {
    fn logits(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        let mut z = self.bias;
        for (k, zk) in z.iter_mut().enumerate() {
            let row = &self.weights[k * self.n_features..(k + 1) * self.n_features];
            *zk += row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
        }
        z
    }

    /// Full-batch Adam on balanced cross-entropy plus `‖W‖² / (2·C·n)`.
    pub fn fit(x: &[Vec<f64>], labels: &[usize], rows: &[usize], params: &LogisticParams) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut model = Self {
            n_features,
            weights: vec![0.0; NUM_CLASSES * n_features],
            bias: [0.0; NUM_CLASSES],
        };
        if rows.is_empty() {
            return model;
        }

        let row_labels: Vec<usize> = rows.iter().map(|&r| labels[r]).collect();
        let sample_weights = balanced_weights(&row_labels, NUM_CLASSES);
        let n = rows.len() as f64;
        let l2 = 1.0 / (params.c * n);

        // Weights then biases, flattened for the optimizer
        let n_w = model.weights.len();
        let mut flat = vec![0.0; n_w + NUM_CLASSES];
        let mut grads = vec![0.0; flat.len()];
        let mut opt = AdamOptimizer::new(flat.len(), params.learning_rate);

        for _ in 0..params.iterations {
            grads.iter_mut().for_each(|g| *g = 0.0);
            for (i, &r) in rows.iter().enumerate() {
                let p = softmax(&model.logits(&x[r]));
                for k in 0..NUM_CLASSES {
                    let d = sample_weights[i] * (p[k] - f64::from(u8::from(row_labels[i] == k))) / n;
                    grads[n_w + k] += d;
                    for (g, v) in grads[k * n_features..(k + 1) * n_features].iter_mut().zip(&x[r]) {
                        *g += d * v;
                    }
                }
            }
            for (g, w) in grads[..n_w].iter_mut().zip(&flat[..n_w]) {
                *g += l2 * w;
            }
            opt.apply(&mut flat, &grads);
            model.weights.copy_from_slice(&flat[..n_w]);
            model.bias.copy_from_slice(&flat[n_w..]);
        }
        model
    }

    pub fn predict_proba(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        softmax(&self.logits(x))
    }

    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.weights.len() != NUM_CLASSES * self.n_features {
            return Err(ModelError::Malformed {
                reason: format!(
                    "logistic weights have {} entries, expected {}",
                    self.weights.len(),
                    NUM_CLASSES * self.n_features
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_linearly_separable_data() {
        let x: Vec<Vec<f64>> = (0..150).map(|i| vec![f64::from(i % 50) / 10.0 - 2.5 + f64::from(i / 50) * 4.0]).collect();
        let labels: Vec<usize> = (0..150).map(|i| i / 50).collect();
        let rows: Vec<usize> = (0..150).collect();
        let params = LogisticParams { iterations: 400, learning_rate: 0.1, c: 10.0 };
        let lr = LogisticRegression::fit(&x, &labels, &rows, &params);
        assert!(lr.validate().is_ok());
        assert!(lr.predict_proba(&[-3.0])[0] > 0.7);
        assert!(lr.predict_proba(&[10.0])[2] > 0.7);
    }

    #[test]
    fn test_empty_rows_give_uniform_model() {
        let lr = LogisticRegression::fit(&[vec![1.0, 2.0]], &[0], &[], &LogisticParams { iterations: 5, learning_rate: 0.1, c: 1.0 });
        let p = lr.predict_proba(&[1.0, 2.0]);
        assert!((p[0] - 1.0 / 3.0).abs() < 1e-12);
    }
}
