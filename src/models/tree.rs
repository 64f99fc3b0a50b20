//! CART decision trees over histogram-binned features.
//!
//! One builder serves every tree-based member:
//! - weighted Gini on class labels (forest classifier)
//! - squared error on real targets (forest regressor, boosting regressor)
//! - squared error on gradients with Newton leaf values (boosting classifier)

use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use super::binning::BinnedMatrix;
use super::ModelError;

/// Marker in `feature` for leaf nodes.
const LEAF: u32 = u32::MAX;

/// Split gains below this are treated as no improvement.
const MIN_GAIN: f64 = 1e-12;

/// A fitted tree in struct-of-arrays form.
///
/// Children always have a larger index than their parent, so traversal
/// terminates on any tree that passes [`DecisionTree::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    feature: Vec<u32>,
    threshold: Vec<f64>,
    /// Left child; for leaves, the leaf's slot in `values`
    left: Vec<u32>,
    right: Vec<u32>,
    value_width: usize,
    values: Vec<f64>,
}

impl DecisionTree {
    /// Leaf payload reached by `x`.
    pub fn leaf(&self, x: &[f64]) -> &[f64] {
        let mut node = 0usize;
        loop {
            let f = self.feature[node];
            if f == LEAF {
                let off = self.left[node] as usize * self.value_width;
                return &self.values[off..off + self.value_width];
            }
            let v = x.get(f as usize).copied().unwrap_or(0.0);
            node = if v <= self.threshold[node] {
                self.left[node]
            } else {
                self.right[node]
            } as usize;
        }
    }

    /// Scalar leaf value (regression and boosting trees).
    pub fn predict_value(&self, x: &[f64]) -> f64 {
        self.leaf(x)[0]
    }

    pub fn n_nodes(&self) -> usize {
        self.feature.len()
    }

    pub const fn value_width(&self) -> usize {
        self.value_width
    }

    /// Structural check for trees read from disk.
    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        let n = self.feature.len();
        let malformed = |reason: String| ModelError::Malformed { reason };
        if n == 0 || self.threshold.len() != n || self.left.len() != n || self.right.len() != n {
            return Err(malformed("tree arrays have inconsistent lengths".to_string()));
        }
        if self.value_width == 0 || self.values.len() % self.value_width != 0 {
            return Err(malformed("leaf value table has a bad width".to_string()));
        }
        let n_leaves = self.values.len() / self.value_width;
        for node in 0..n {
            if self.feature[node] == LEAF {
                if self.left[node] as usize >= n_leaves {
                    return Err(malformed(format!("leaf {node} points past the value table")));
                }
                continue;
            }
            if self.feature[node] as usize >= n_features {
                return Err(ModelError::WidthMismatch {
                    expected: n_features,
                    got: self.feature[node] as usize + 1,
                });
            }
            for child in [self.left[node] as usize, self.right[node] as usize] {
                if child <= node || child >= n {
                    return Err(malformed(format!("node {node} has invalid child {child}")));
                }
            }
        }
        Ok(())
    }
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Candidate features drawn per split
    pub max_features: usize,
}

/// What the tree is fitted to; slices are indexed by training row.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Weighted Gini; leaves hold the class distribution
    Classes {
        labels: &'a [usize],
        weights: &'a [f64],
        n_classes: usize,
    },
    /// Squared error; leaves hold the mean
    Values { values: &'a [f64] },
    /// Squared error on `gradients`; leaves hold `scale · Σg / Σh`
    Newton {
        gradients: &'a [f64],
        hessians: &'a [f64],
        scale: f64,
    },
}

impl Target<'_> {
    const fn width(&self) -> usize {
        match self {
            Target::Classes { n_classes, .. } => *n_classes,
            Target::Values { .. } | Target::Newton { .. } => 1,
        }
    }
}

struct Split {
    feature: usize,
    bin: usize,
    gain: f64,
}

/// Grows one tree from a set of (possibly repeated) row indices.
pub struct TreeBuilder<'a> {
    data: &'a BinnedMatrix,
    target: Target<'a>,
    params: TreeParams,
    rng: StdRng,
    tree: DecisionTree,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(data: &'a BinnedMatrix, target: Target<'a>, params: TreeParams, rng: StdRng) -> Self {
        let tree = DecisionTree {
            feature: Vec::new(),
            threshold: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            value_width: target.width(),
            values: Vec::new(),
        };
        Self { data, target, params, rng, tree }
    }

    pub fn fit(mut self, rows: Vec<usize>) -> DecisionTree {
        self.grow(rows, 0);
        self.tree
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> u32 {
        let node = self.tree.feature.len();
        self.tree.feature.push(LEAF);
        self.tree.threshold.push(0.0);
        self.tree.left.push(0);
        self.tree.right.push(0);

        let p = self.params;
        let splittable = depth < p.max_depth
            && rows.len() >= p.min_samples_split.max(2)
            && rows.len() >= 2 * p.min_samples_leaf.max(1)
            && !self.is_pure(&rows);

        let split = if splittable { self.best_split(&rows) } else { None };
        match split {
            Some(split) => {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .iter()
                    .partition(|&&r| self.data.bin(split.feature, r) <= split.bin);
                drop(rows);
                let left = self.grow(left_rows, depth + 1);
                let right = self.grow(right_rows, depth + 1);
                self.tree.feature[node] = split.feature as u32;
                self.tree.threshold[node] = self.data.threshold(split.feature, split.bin);
                self.tree.left[node] = left;
                self.tree.right[node] = right;
            }
            None => {
                let slot = self.tree.values.len() / self.tree.value_width;
                let value = self.leaf_value(&rows);
                self.tree.values.extend(value);
                self.tree.left[node] = slot as u32;
            }
        }
        node as u32
    }

    fn is_pure(&self, rows: &[usize]) -> bool {
        match self.target {
            Target::Classes { labels, .. } => rows.iter().all(|&r| labels[r] == labels[rows[0]]),
            Target::Values { values } => {
                let first = values[rows[0]];
                rows.iter().all(|&r| (values[r] - first).abs() < 1e-12)
            }
            Target::Newton { gradients, .. } => {
                let first = gradients[rows[0]];
                rows.iter().all(|&r| (gradients[r] - first).abs() < 1e-12)
            }
        }
    }

    fn leaf_value(&self, rows: &[usize]) -> Vec<f64> {
        match self.target {
            Target::Classes { labels, weights, n_classes } => {
                let mut dist = vec![0.0; n_classes];
                for &r in rows {
                    dist[labels[r]] += weights[r];
                }
                let total: f64 = dist.iter().sum();
                if total > 0.0 {
                    dist.iter_mut().for_each(|d| *d /= total);
                } else {
                    dist.iter_mut().for_each(|d| *d = 1.0 / n_classes as f64);
                }
                dist
            }
            Target::Values { values } => {
                let sum: f64 = rows.iter().map(|&r| values[r]).sum();
                vec![sum / rows.len().max(1) as f64]
            }
            Target::Newton { gradients, hessians, scale } => {
                let g: f64 = rows.iter().map(|&r| gradients[r]).sum();
                let h: f64 = rows.iter().map(|&r| hessians[r]).sum();
                vec![if h > 1e-12 { scale * g / h } else { 0.0 }]
            }
        }
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Split> {
        let n_features = self.data.n_features();
        let k = self.params.max_features.clamp(1, n_features);
        let candidates = index::sample(&mut self.rng, n_features, k);

        let mut best: Option<Split> = None;
        for feature in candidates.into_iter() {
            let found = match self.target {
                Target::Classes { labels, weights, n_classes } => {
                    self.best_gini_split(rows, feature, labels, weights, n_classes)
                }
                Target::Values { values } => self.best_sse_split(rows, feature, values),
                Target::Newton { gradients, .. } => self.best_sse_split(rows, feature, gradients),
            };
            if let Some(s) = found {
                if best.as_ref().map_or(true, |b| s.gain > b.gain) {
                    best = Some(s);
                }
            }
        }
        best.filter(|s| s.gain > MIN_GAIN)
    }

    fn best_gini_split(
        &self,
        rows: &[usize],
        feature: usize,
        labels: &[usize],
        weights: &[f64],
        n_classes: usize,
    ) -> Option<Split> {
        let n_bins = self.data.n_bins(feature);
        if n_bins < 2 {
            return None;
        }
        let mut hist = vec![0.0; n_bins * n_classes];
        let mut counts = vec![0usize; n_bins];
        for &r in rows {
            let b = self.data.bin(feature, r);
            hist[b * n_classes + labels[r]] += weights[r];
            counts[b] += 1;
        }

        let mut total = vec![0.0; n_classes];
        for b in 0..n_bins {
            for c in 0..n_classes {
                total[c] += hist[b * n_classes + c];
            }
        }
        let total_w: f64 = total.iter().sum();
        let parent = sq_sum(&total) / total_w.max(1e-12);

        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = rows.len();
        let mut left = vec![0.0; n_classes];
        let mut left_n = 0usize;
        let mut best: Option<Split> = None;
        for b in 0..n_bins - 1 {
            for c in 0..n_classes {
                left[c] += hist[b * n_classes + c];
            }
            left_n += counts[b];
            if left_n < min_leaf {
                continue;
            }
            if n - left_n < min_leaf {
                break;
            }
            let left_w: f64 = left.iter().sum();
            let right_w = total_w - left_w;
            if left_w <= 0.0 || right_w <= 0.0 {
                continue;
            }
            let right: Vec<f64> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
            let score = sq_sum(&left) / left_w + sq_sum(&right) / right_w;
            let gain = (score - parent) / total_w;
            if best.as_ref().map_or(true, |s| gain > s.gain) {
                best = Some(Split { feature, bin: b, gain });
            }
        }
        best
    }

    fn best_sse_split(&self, rows: &[usize], feature: usize, targets: &[f64]) -> Option<Split> {
        let n_bins = self.data.n_bins(feature);
        if n_bins < 2 {
            return None;
        }
        let mut sums = vec![0.0; n_bins];
        let mut counts = vec![0usize; n_bins];
        for &r in rows {
            let b = self.data.bin(feature, r);
            sums[b] += targets[r];
            counts[b] += 1;
        }
        let total: f64 = sums.iter().sum();
        let n = rows.len();
        let parent = total * total / n as f64;

        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut left_sum = 0.0;
        let mut left_n = 0usize;
        let mut best: Option<Split> = None;
        for b in 0..n_bins - 1 {
            left_sum += sums[b];
            left_n += counts[b];
            if left_n < min_leaf {
                continue;
            }
            let right_n = n - left_n;
            if right_n < min_leaf {
                break;
            }
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            let gain = (score - parent) / n as f64;
            if best.as_ref().map_or(true, |s| gain > s.gain) {
                best = Some(Split { feature, bin: b, gain });
            }
        }
        best
    }
}

fn sq_sum(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}
