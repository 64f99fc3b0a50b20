//! Held-out evaluation of a fitted ensemble.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use super::LabeledObservation;
use crate::ensemble::{ClassificationEnsemble, Property, PropertyRegressors};
use crate::types::Classification;

/// Equal-width confidence bins for calibration error.
pub const CALIBRATION_BINS: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
}

/// How well the ensemble's own uncertainty tracks its mistakes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyQuality {
    pub mean_uncertainty_correct: f64,
    pub mean_uncertainty_incorrect: f64,
    pub mean_confidence_correct: f64,
    pub mean_confidence_incorrect: f64,
    /// Pearson correlation between uncertainty and the 0/1 error indicator;
    /// 0 when either side has no spread
    pub uncertainty_error_correlation: f64,
}

/// Stratified k-fold accuracy of the classifier ensemble.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: usize,
    pub fold_accuracy: Vec<f64>,
    pub mean_accuracy: f64,
    /// Sample standard deviation across folds
    pub std_accuracy: f64,
}

impl CrossValidationReport {
    pub fn from_folds(fold_accuracy: Vec<f64>) -> Self {
        let mean_accuracy = if fold_accuracy.is_empty() {
            0.0
        } else {
            (&fold_accuracy).mean()
        };
        let std_accuracy = if fold_accuracy.len() < 2 {
            0.0
        } else {
            (&fold_accuracy).std_dev()
        };
        Self {
            folds: fold_accuracy.len(),
            fold_accuracy,
            mean_accuracy,
            std_accuracy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub n_test: usize,
    pub accuracy: f64,
    /// Accuracy of each member on its own
    pub member_accuracy: BTreeMap<String, f64>,
    /// Rows are true classes, columns predicted, in probability-vector order
    pub confusion_matrix: [[usize; 3]; 3],
    pub expected_calibration_error: f64,
    /// Learned estimates on planet-like test rows with known targets
    pub properties: BTreeMap<String, RegressionMetrics>,
    #[serde(default)]
    pub uncertainty_quality: UncertaintyQuality,
    /// Present when `training.cv_folds` is set
    #[serde(default)]
    pub cross_validation: Option<CrossValidationReport>,
}

pub fn accuracy(predicted: &[Classification], truth: &[Classification]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    hits as f64 / truth.len() as f64
}

pub fn confusion_matrix(predicted: &[Classification], truth: &[Classification]) -> [[usize; 3]; 3] {
    let mut m = [[0; 3]; 3];
    for (p, t) in predicted.iter().zip(truth) {
        m[t.index()][p.index()] += 1;
    }
    m
}

/// Weighted mean |accuracy − confidence| over equal-width confidence bins.
pub fn expected_calibration_error(confidences: &[f64], correct: &[bool], n_bins: usize) -> f64 {
    if confidences.is_empty() || n_bins == 0 {
        return 0.0;
    }
    let mut count = vec![0usize; n_bins];
    let mut conf_sum = vec![0.0; n_bins];
    let mut hit_sum = vec![0.0; n_bins];
    for (&c, &ok) in confidences.iter().zip(correct) {
        let bin = ((c * n_bins as f64) as usize).min(n_bins - 1);
        count[bin] += 1;
        conf_sum[bin] += c;
        hit_sum[bin] += f64::from(u8::from(ok));
    }
    let n = confidences.len() as f64;
    (0..n_bins)
        .filter(|&b| count[b] > 0)
        .map(|b| {
            let k = count[b] as f64;
            (k / n) * (hit_sum[b] / k - conf_sum[b] / k).abs()
        })
        .sum()
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.mean()
    }
}

/// Split uncertainty and confidence by correctness and correlate
/// uncertainty with error.
pub fn uncertainty_quality(uncertainties: &[f64], confidences: &[f64], correct: &[bool]) -> UncertaintyQuality {
    let mut unc = (Vec::new(), Vec::new());
    let mut conf = (Vec::new(), Vec::new());
    for ((&u, &c), &ok) in uncertainties.iter().zip(confidences).zip(correct) {
        if ok {
            unc.0.push(u);
            conf.0.push(c);
        } else {
            unc.1.push(u);
            conf.1.push(c);
        }
    }

    let n = uncertainties.len().min(correct.len());
    let errors: Vec<f64> = correct[..n].iter().map(|&ok| if ok { 0.0 } else { 1.0 }).collect();
    let uncertainties = &uncertainties[..n];
    let correlation = if n < 2 {
        0.0
    } else {
        let spread = uncertainties.std_dev() * errors.as_slice().std_dev();
        let r = uncertainties.covariance(errors.as_slice()) / spread;
        if r.is_finite() {
            r
        } else {
            0.0
        }
    };

    UncertaintyQuality {
        mean_uncertainty_correct: mean_or_zero(&unc.0),
        mean_uncertainty_incorrect: mean_or_zero(&unc.1),
        mean_confidence_correct: mean_or_zero(&conf.0),
        mean_confidence_incorrect: mean_or_zero(&conf.1),
        uncertainty_error_correlation: correlation,
    }
}

pub fn regression_metrics(predicted: &[f64], truth: &[f64]) -> RegressionMetrics {
    let n = predicted.len().min(truth.len());
    if n == 0 {
        return RegressionMetrics::default();
    }
    let (abs, sq) = predicted
        .iter()
        .zip(truth)
        .fold((0.0, 0.0), |(a, s), (p, t)| (a + (p - t).abs(), s + (p - t).powi(2)));
    RegressionMetrics {
        n,
        mae: abs / n as f64,
        rmse: (sq / n as f64).sqrt(),
    }
}

/// Score `test` rows; `inputs[i]` is the scaled feature row of `test[i]`.
pub fn evaluate(
    ensemble: &ClassificationEnsemble,
    regressors: &PropertyRegressors,
    test: &[LabeledObservation],
    inputs: &[Vec<f64>],
) -> EvaluationReport {
    let truth: Vec<Classification> = test.iter().map(|r| r.class).collect();
    let mut predicted = Vec::with_capacity(test.len());
    let mut confidences = Vec::with_capacity(test.len());
    let mut uncertainties = Vec::with_capacity(test.len());
    let mut member_hits: BTreeMap<String, usize> = BTreeMap::new();
    let mut property_pairs: BTreeMap<Property, (Vec<f64>, Vec<f64>)> = BTreeMap::new();

    for (row, x) in test.iter().zip(inputs) {
        let out = ensemble.predict(x);
        let label = out.classification();
        predicted.push(label);
        confidences.push(out.probabilities.confidence());
        uncertainties.push(out.uncertainty());
        for vote in &out.votes {
            *member_hits.entry(vote.member.clone()).or_default() += usize::from(vote.classification == row.class);
        }

        if let Some(targets) = row.targets.filter(|_| row.class.is_planet_like()) {
            let props = regressors.estimate(&row.observation, x);
            let learned = [
                (Property::PlanetRadius, props.planet_radius.value),
                (Property::PlanetTemp, props.planet_temp.value),
                (Property::SemiMajorAxis, props.semi_major_axis_learned.value),
                (Property::ImpactParameter, props.impact_parameter.value),
            ];
            for (property, value) in learned {
                let entry = property_pairs.entry(property).or_default();
                entry.0.push(value);
                entry.1.push(targets.get(property));
            }
        }
    }

    let correct: Vec<bool> = predicted.iter().zip(&truth).map(|(p, t)| p == t).collect();
    let n = test.len().max(1) as f64;
    EvaluationReport {
        n_test: test.len(),
        accuracy: accuracy(&predicted, &truth),
        member_accuracy: member_hits.into_iter().map(|(m, hits)| (m, hits as f64 / n)).collect(),
        confusion_matrix: confusion_matrix(&predicted, &truth),
        expected_calibration_error: expected_calibration_error(&confidences, &correct, CALIBRATION_BINS),
        properties: property_pairs
            .into_iter()
            .map(|(p, (pred, truth))| (p.as_str().to_string(), regression_metrics(&pred, &truth)))
            .collect(),
        uncertainty_quality: uncertainty_quality(&uncertainties, &confidences, &correct),
        cross_validation: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Classification::{ConfirmedExoplanet as C, FalsePositive as F, PlanetaryCandidate as P};

    #[test]
    fn test_accuracy_and_confusion() {
        let truth = [C, C, P, F];
        let pred = [C, P, P, F];
        assert_eq!(accuracy(&pred, &truth), 0.75);
        let m = confusion_matrix(&pred, &truth);
        assert_eq!(m[0], [1, 1, 0]);
        assert_eq!(m[1], [0, 1, 0]);
        assert_eq!(m[2], [0, 0, 1]);
    }

    #[test]
    fn test_perfect_calibration_is_zero() {
        // 80% confident, right 4 times out of 5
        let conf = [0.8; 5];
        let ok = [true, true, true, true, false];
        assert!(expected_calibration_error(&conf, &ok, 10) < 1e-12);
    }

    #[test]
    fn test_overconfidence_is_penalised() {
        let conf = [0.95; 4];
        let ok = [true, false, true, false];
        assert!((expected_calibration_error(&conf, &ok, 10) - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_quality_separates_mistakes() {
        let unc = [0.1, 0.2, 0.8, 0.9];
        let conf = [0.9, 0.8, 0.4, 0.35];
        let ok = [true, true, false, false];
        let q = uncertainty_quality(&unc, &conf, &ok);
        assert!((q.mean_uncertainty_correct - 0.15).abs() < 1e-12);
        assert!((q.mean_uncertainty_incorrect - 0.85).abs() < 1e-12);
        assert!((q.mean_confidence_correct - 0.85).abs() < 1e-12);
        assert!((q.mean_confidence_incorrect - 0.375).abs() < 1e-12);
        assert!(q.uncertainty_error_correlation > 0.9, "r = {}", q.uncertainty_error_correlation);
    }

    #[test]
    fn test_uncertainty_quality_without_errors() {
        let q = uncertainty_quality(&[0.2, 0.4], &[0.8, 0.7], &[true, true]);
        assert_eq!(q.mean_uncertainty_incorrect, 0.0);
        assert_eq!(q.uncertainty_error_correlation, 0.0);
    }

    #[test]
    fn test_cross_validation_summary() {
        let cv = CrossValidationReport::from_folds(vec![0.8, 0.9, 0.85]);
        assert_eq!(cv.folds, 3);
        assert!((cv.mean_accuracy - 0.85).abs() < 1e-9);
        assert!((cv.std_accuracy - 0.05).abs() < 1e-9);
        assert_eq!(CrossValidationReport::from_folds(Vec::new()).mean_accuracy, 0.0);
    }

    #[test]
    fn test_regression_metrics() {
        let m = regression_metrics(&[1.0, 2.0, 5.0], &[1.0, 3.0, 3.0]);
        assert_eq!(m.n, 3);
        assert!((m.mae - 1.0).abs() < 1e-12);
        assert!((m.rmse - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
