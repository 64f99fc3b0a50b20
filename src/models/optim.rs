//! Adam optimizer shared by the gradient-trained members.

/// Adam optimizer with decaying base learning rate.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    /// Base learning rate (decays over time).
    pub lr: f64,
    /// LR decay factor per step.
    pub decay: f64,
    /// Minimum learning rate floor.
    pub lr_floor: f64,
    /// Adam beta1 (first moment decay).
    pub beta1: f64,
    /// Adam beta2 (second moment decay).
    pub beta2: f64,
    /// Adam epsilon (numerical stability).
    pub eps: f64,
    /// Total steps taken.
    pub steps: u64,
    /// First moment estimates (same layout as the parameters, flattened).
    m: Vec<f64>,
    /// Second moment estimates (same layout as the parameters, flattened).
    v: Vec<f64>,
}

impl AdamOptimizer {
    pub fn new(num_params: usize, lr: f64) -> Self {
        Self {
            lr,
            decay: 0.9999,
            lr_floor: lr * 0.1,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            steps: 0,
            m: vec![0.0; num_params],
            v: vec![0.0; num_params],
        }
    }

    /// Apply one Adam update; `grads` matches the `params` layout.
    pub fn apply(&mut self, params: &mut [f64], grads: &[f64]) {
        self.steps += 1;
        let t = self.steps as f64;

        // Bias-corrected LR
        let lr_t = self.lr * (1.0 - self.beta2.powf(t)).sqrt() / (1.0 - self.beta1.powf(t));

        for (i, (w, &g)) in params.iter_mut().zip(grads).enumerate() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;
            *w -= lr_t * self.m[i] / (self.v[i].sqrt() + self.eps);
        }

        self.lr = (self.lr * self.decay).max(self.lr_floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimises_quadratic() {
        // f(w) = (w - 3)^2
        let mut w = vec![0.0];
        let mut opt = AdamOptimizer::new(1, 0.05);
        for _ in 0..2000 {
            let g = vec![2.0 * (w[0] - 3.0)];
            opt.apply(&mut w, &g);
        }
        assert!((w[0] - 3.0).abs() < 0.1, "w = {}", w[0]);
        assert_eq!(opt.steps, 2000);
    }
}
