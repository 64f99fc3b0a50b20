//! Feed-forward network classifier (ReLU hidden layers, softmax output).
//!
//! Parameters live in one flat vector so a single [`AdamOptimizer`] covers
//! the whole network. Layer `l` stores its `out × in` weight matrix
//! (row-major) followed by its `out` biases.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::forest::balanced_weights;
use super::optim::AdamOptimizer;
use super::{softmax, ModelError, NUM_CLASSES};
use crate::config::MlpParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    /// Layer widths including input and output
    sizes: Vec<usize>,
    params: Vec<f64>,
}

impl MlpClassifier {
    fn layer_offsets(sizes: &[usize]) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut off = 0;
        for w in sizes.windows(2) {
            offsets.push(off);
            off += w[0] * w[1] + w[1];
        }
        offsets.push(off);
        offsets
    }

    fn n_params(sizes: &[usize]) -> usize {
        Self::layer_offsets(sizes).last().copied().unwrap_or(0)
    }

    /// He-initialised network for `n_inputs` features.
    fn init(n_inputs: usize, hidden: &[usize], rng: &mut StdRng) -> Self {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(n_inputs);
        sizes.extend_from_slice(hidden);
        sizes.push(NUM_CLASSES);

        let offsets = Self::layer_offsets(&sizes);
        let mut params = vec![0.0; Self::n_params(&sizes)];
        for (l, w) in sizes.windows(2).enumerate() {
            let std = (2.0 / w[0] as f64).sqrt();
            if let Ok(normal) = Normal::new(0.0, std) {
                for p in &mut params[offsets[l]..offsets[l] + w[0] * w[1]] {
                    *p = normal.sample(rng);
                }
            }
        }
        Self { sizes, params }
    }

    /// Activations of every layer; the last entry is the softmax output.
    fn forward(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let offsets = Self::layer_offsets(&self.sizes);
        let n_layers = self.sizes.len() - 1;
        let mut acts: Vec<Vec<f64>> = Vec::with_capacity(n_layers + 1);
        acts.push(x.to_vec());
        for l in 0..n_layers {
            let (n_in, n_out) = (self.sizes[l], self.sizes[l + 1]);
            let w = &self.params[offsets[l]..offsets[l] + n_in * n_out];
            let b = &self.params[offsets[l] + n_in * n_out..offsets[l + 1]];
            let input = &acts[l];
            let mut z: Vec<f64> = (0..n_out)
                .map(|j| b[j] + w[j * n_in..(j + 1) * n_in].iter().zip(input).map(|(w, a)| w * a).sum::<f64>())
                .collect();
            if l + 1 < n_layers {
                z.iter_mut().for_each(|v| *v = v.max(0.0));
            } else {
                let mut out = [0.0; NUM_CLASSES];
                out.copy_from_slice(&z);
                z = softmax(&out).to_vec();
            }
            acts.push(z);
        }
        acts
    }

    /// Accumulate the weighted cross-entropy gradient of one sample.
    fn backward(&self, acts: &[Vec<f64>], label: usize, weight: f64, grads: &mut [f64]) {
        let offsets = Self::layer_offsets(&self.sizes);
        let n_layers = self.sizes.len() - 1;
        let mut delta: Vec<f64> = acts[n_layers]
            .iter()
            .enumerate()
            .map(|(k, p)| weight * (p - f64::from(u8::from(k == label))))
            .collect();

        for l in (0..n_layers).rev() {
            let (n_in, n_out) = (self.sizes[l], self.sizes[l + 1]);
            let input = &acts[l];
            let w_off = offsets[l];
            let b_off = w_off + n_in * n_out;
            for j in 0..n_out {
                grads[b_off + j] += delta[j];
                let row = &mut grads[w_off + j * n_in..w_off + (j + 1) * n_in];
                for (g, a) in row.iter_mut().zip(input) {
                    *g += delta[j] * a;
                }
            }
            if l == 0 {
                break;
            }
            let w = &self.params[w_off..b_off];
            delta = (0..n_in)
                .map(|i| {
                    if input[i] <= 0.0 {
                        return 0.0;
                    }
                    (0..n_out).map(|j| w[j * n_in + i] * delta[j]).sum()
                })
                .collect();
        }
    }

    /// Mini-batch Adam on balanced, weighted cross-entropy with L2 on weights.
    pub fn fit(x: &[Vec<f64>], labels: &[usize], rows: &[usize], params: &MlpParams, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_inputs = x.first().map_or(0, Vec::len);
        let mut net = Self::init(n_inputs, &params.hidden_layers, &mut rng);

        let row_labels: Vec<usize> = rows.iter().map(|&r| labels[r]).collect();
        let weights = balanced_weights(&row_labels, NUM_CLASSES);
        let offsets = Self::layer_offsets(&net.sizes);
        let mut opt = AdamOptimizer::new(net.params.len(), params.learning_rate);
        let mut order: Vec<usize> = (0..rows.len()).collect();
        let mut grads = vec![0.0; net.params.len()];

        for _ in 0..params.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(params.batch_size.max(1)) {
                grads.iter_mut().for_each(|g| *g = 0.0);
                for &i in batch {
                    let acts = net.forward(&x[rows[i]]);
                    net.backward(&acts, row_labels[i], weights[i], &mut grads);
                }
                let scale = 1.0 / batch.len() as f64;
                grads.iter_mut().for_each(|g| *g *= scale);
                // L2 on weights only
                for (l, w) in net.sizes.windows(2).enumerate() {
                    let span = offsets[l]..offsets[l] + w[0] * w[1];
                    for (g, p) in grads[span.clone()].iter_mut().zip(&net.params[span]) {
                        *g += params.alpha * p;
                    }
                }
                opt.apply(&mut net.params, &grads);
            }
        }
        net
    }

    pub fn predict_proba(&self, x: &[f64]) -> [f64; NUM_CLASSES] {
        let acts = self.forward(x);
        let mut out = [0.0; NUM_CLASSES];
        if let Some(last) = acts.last() {
            out.copy_from_slice(&last[..NUM_CLASSES]);
        }
        out
    }

    pub fn n_features(&self) -> usize {
        self.sizes.first().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.sizes.len() < 2 || self.sizes.last() != Some(&NUM_CLASSES) || self.sizes.contains(&0) {
            return Err(ModelError::Malformed {
                reason: format!("bad layer sizes {:?}", self.sizes),
            });
        }
        let expected = Self::n_params(&self.sizes);
        if self.params.len() != expected {
            return Err(ModelError::Malformed {
                reason: format!("network has {} parameters, layout needs {expected}", self.params.len()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_layout() {
        assert_eq!(MlpClassifier::n_params(&[4, 8, 3]), 4 * 8 + 8 + 8 * 3 + 3);
        let mut rng = StdRng::seed_from_u64(0);
        let net = MlpClassifier::init(4, &[8], &mut rng);
        assert!(net.validate().is_ok());
        let p = net.predict_proba(&[0.1, -0.2, 0.3, 0.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_learns_separable_clusters() {
        let centres = [[-2.0, 0.0], [0.0, 2.0], [2.0, 0.0]];
        let mut x = Vec::new();
        let mut labels = Vec::new();
        for i in 0..300 {
            let c = i % 3;
            let jitter = (i % 7) as f64 * 0.05 - 0.15;
            x.push(vec![centres[c][0] + jitter, centres[c][1] - jitter]);
            labels.push(c);
        }
        let rows: Vec<usize> = (0..x.len()).collect();
        let params = MlpParams {
            hidden_layers: vec![8],
            epochs: 60,
            batch_size: 16,
            learning_rate: 0.01,
            alpha: 1e-4,
        };
        let net = MlpClassifier::fit(&x, &labels, &rows, &params, 3);
        for (c, centre) in centres.iter().enumerate() {
            let p = net.predict_proba(centre);
            assert!(p[c] > 0.8, "class {c}: {p:?}");
        }
    }

    #[test]
    fn test_rejects_bad_layout() {
        let net = MlpClassifier { sizes: vec![4, 3], params: vec![0.0; 3] };
        assert!(net.validate().is_err());
    }
}
