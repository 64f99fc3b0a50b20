//! Log transform plus robust (median / IQR) scaling of feature vectors.
//!
//! Fitted once on the training matrix and stored in the model bundle so the
//! serving path applies exactly the transform the models were trained on.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};
use thiserror::Error;

use crate::config::defaults::{FEATURE_FLOOR, SCALED_FEATURE_CLIP};
use crate::features::{FeatureVector, FEATURE_NAMES, LOG_SCALED, N_FEATURES};

#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("cannot fit scaler on an empty feature matrix")]
    Empty,

    #[error("scaler has {got} columns, feature vector has {expected}")]
    Width { expected: usize, got: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    /// Per-column natural-log flag
    log_columns: Vec<bool>,
    medians: Vec<f64>,
    /// Interquartile ranges; degenerate columns store 1.0
    iqrs: Vec<f64>,
}

impl FeatureScaler {
    /// Fit medians and IQRs on (log-transformed) training features.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self, ScalerError> {
        if rows.is_empty() {
            return Err(ScalerError::Empty);
        }
        let log_columns: Vec<bool> = FEATURE_NAMES.iter().map(|n| LOG_SCALED.contains(n)).collect();

        let mut medians = Vec::with_capacity(N_FEATURES);
        let mut iqrs = Vec::with_capacity(N_FEATURES);
        for (col, &log) in log_columns.iter().enumerate() {
            let column: Vec<f64> = rows.iter().map(|r| pre_transform(r.as_slice()[col], log)).collect();
            let mut data = Data::new(column);
            medians.push(data.median());
            let iqr = data.upper_quartile() - data.lower_quartile();
            iqrs.push(if iqr.is_finite() && iqr > 0.0 { iqr } else { 1.0 });
        }

        Ok(Self { log_columns, medians, iqrs })
    }

    /// Identity scaler (no log, median 0, IQR 1); used by tests and stubs.
    pub fn identity() -> Self {
        Self {
            log_columns: vec![false; N_FEATURES],
            medians: vec![0.0; N_FEATURES],
            iqrs: vec![1.0; N_FEATURES],
        }
    }

    pub fn width(&self) -> usize {
        self.medians.len()
    }

    /// Check the stored parameters line up with the running feature list.
    pub fn check_width(&self) -> Result<(), ScalerError> {
        let got = self.width();
        if got != N_FEATURES || self.iqrs.len() != got || self.log_columns.len() != got {
            return Err(ScalerError::Width { expected: N_FEATURES, got });
        }
        Ok(())
    }

    /// Scaled, clipped model input.
    pub fn transform(&self, features: &FeatureVector) -> Vec<f64> {
        features
            .as_slice()
            .iter()
            .zip(self.log_columns.iter().zip(self.medians.iter().zip(&self.iqrs)))
            .map(|(&x, (&log, (&median, &iqr)))| {
                let z = (pre_transform(x, log) - median) / iqr;
                if z.is_finite() {
                    z.clamp(-SCALED_FEATURE_CLIP, SCALED_FEATURE_CLIP)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

fn pre_transform(x: f64, log: bool) -> f64 {
    if log {
        x.max(FEATURE_FLOOR).ln()
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(seed: f64) -> FeatureVector {
        let mut v = [0.0; N_FEATURES];
        for (i, x) in v.iter_mut().enumerate() {
            *x = seed * (i as f64 + 1.0);
        }
        FeatureVector::from_values(v)
    }

    #[test]
    fn test_fit_rejects_empty() {
        assert!(matches!(FeatureScaler::fit(&[]), Err(ScalerError::Empty)));
    }

    #[test]
    fn test_median_maps_to_zero() {
        let rows: Vec<FeatureVector> = (1..=5).map(|s| vector(f64::from(s))).collect();
        let scaler = FeatureScaler::fit(&rows).expect("fit");
        let scaled = scaler.transform(&rows[2]);
        assert_eq!(scaled.len(), N_FEATURES);
        for z in scaled {
            assert!(z.abs() < 1e-9, "median row should scale to 0, got {z}");
        }
    }

    #[test]
    fn test_clipping_and_constant_columns() {
        let rows = vec![vector(1.0); 4];
        let scaler = FeatureScaler::fit(&rows).expect("fit");
        let scaled = scaler.transform(&vector(1e9));
        assert!(scaled.iter().all(|z| z.abs() <= SCALED_FEATURE_CLIP));
        assert!(scaler.check_width().is_ok());
    }

    #[test]
    fn test_identity_passthrough() {
        let v = vector(0.5);
        let scaled = FeatureScaler::identity().transform(&v);
        assert_eq!(scaled[3], 2.0);
    }
}
