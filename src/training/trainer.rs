//! Fit every ensemble member and property regressor from a catalogue.
//!
//! Steps:
//! 1. Artifact filter, then outlier removal within each class
//! 2. Stratified train/test split (seeded)
//! 3. Feature engineering and scaler fit on the training rows
//! 4. Classifiers and regressors fitted in parallel
//! 5. Held-out evaluation stored in the bundle metadata
//! 6. Optional stratified k-fold cross-validation of the classifiers
//!
//! Every member derives its seed from `training.seed`, so the same
//! catalogue and config always give the same bundle.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{info, warn};

use super::evaluation::{accuracy, evaluate, CrossValidationReport};
use super::{LabeledObservation, TrainingError};
use crate::artifacts::{BundleMetadata, ModelBundle, PropertyModels};
use crate::config::defaults::BUNDLE_FORMAT_VERSION;
use crate::config::{ServiceConfig, TrainingConfig};
use crate::ensemble::{ClassificationEnsemble, Property};
use crate::features::{FeatureEngineer, FeatureVector, FEATURE_NAMES};
use crate::models::binning::BinnedMatrix;
use crate::models::{
    derive_seed, Classifier, ClassifierModel, GradientBoostingClassifier, GradientBoostingRegressor, LogisticRegression,
    MlpClassifier, RandomForestClassifier, RandomForestRegressor, RegressorModel,
};
use crate::preprocessing::{FeatureScaler, Preprocessor};
use crate::types::Classification;

// Seed streams
const SPLIT_STREAM: u64 = 0;
const FOREST_STREAM: u64 = 1;
const BOOSTING_STREAM: u64 = 2;
const MLP_STREAM: u64 = 3;
const CV_STREAM: u64 = 4;
const REGRESSOR_STREAM: u64 = 100;

/// Artifact filter plus per-class outlier removal.
fn clean(catalogue: Vec<LabeledObservation>, preprocessor: &Preprocessor) -> Vec<LabeledObservation> {
    let total = catalogue.len();
    let (plausible, artifacts): (Vec<_>, Vec<_>) = catalogue
        .into_iter()
        .partition(|row| preprocessor.artifact_reason(&row.observation).is_none());

    let mut kept = Vec::with_capacity(plausible.len());
    let mut outliers = 0usize;
    for class in Classification::ALL {
        let rows: Vec<LabeledObservation> = plausible.iter().filter(|r| r.class == class).cloned().collect();
        let (inliers, removed) = preprocessor.remove_outliers(rows, |r| &r.observation);
        outliers += removed.len();
        kept.extend(inliers);
    }

    info!(
        total,
        artifacts = artifacts.len(),
        outliers,
        kept = kept.len(),
        "Catalogue cleaned"
    );
    kept
}

/// Indices of the test rows, drawn per class.
fn stratified_split(rows: &[LabeledObservation], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(derive_seed(seed, SPLIT_STREAM));
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in Classification::ALL {
        let mut idx: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].class == class).collect();
        idx.shuffle(&mut rng);
        let n_test = (idx.len() as f64 * test_fraction).round() as usize;
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Test indices of each fold; every class is dealt round-robin so each
/// fold keeps the catalogue's class mix.
fn stratified_folds(rows: &[LabeledObservation], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(derive_seed(seed, CV_STREAM));
    let mut folds = vec![Vec::new(); k];
    for class in Classification::ALL {
        let mut idx: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].class == class).collect();
        idx.shuffle(&mut rng);
        for (n, i) in idx.into_iter().enumerate() {
            folds[n % k].push(i);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

fn fit_classifiers(x: &[Vec<f64>], data: &BinnedMatrix, labels: &[usize], config: &TrainingConfig) -> Vec<ClassifierModel> {
    let rows: Vec<usize> = (0..x.len()).collect();
    let seed = config.seed;

    let ((forest, boosting), (mlp, logistic)) = rayon::join(
        || {
            rayon::join(
                || RandomForestClassifier::fit(data, labels, &rows, &config.forest, derive_seed(seed, FOREST_STREAM)),
                || {
                    GradientBoostingClassifier::fit(
                        x,
                        data,
                        labels,
                        &rows,
                        &config.boosting,
                        derive_seed(seed, BOOSTING_STREAM),
                    )
                },
            )
        },
        || {
            rayon::join(
                || MlpClassifier::fit(x, labels, &rows, &config.mlp, derive_seed(seed, MLP_STREAM)),
                || LogisticRegression::fit(x, labels, &rows, &config.logistic),
            )
        },
    );

    vec![
        ClassifierModel::RandomForest(forest),
        ClassifierModel::GradientBoosting(boosting),
        ClassifierModel::Mlp(mlp),
        ClassifierModel::LogisticRegression(logistic),
    ]
}

fn fit_regressors(
    x: &[Vec<f64>],
    data: &BinnedMatrix,
    train: &[LabeledObservation],
    config: &TrainingConfig,
) -> PropertyModels {
    let rows: Vec<usize> = (0..train.len())
        .filter(|&i| train[i].class.is_planet_like() && train[i].targets.is_some())
        .collect();
    let mut models = PropertyModels::default();
    if rows.is_empty() {
        warn!("No planet rows with property targets; properties will use physics priors");
        return models;
    }

    let fitted: Vec<(Property, Vec<RegressorModel>)> = Property::ALL
        .par_iter()
        .map(|&property| {
            let targets: Vec<f64> = train
                .iter()
                .map(|r| r.targets.map_or(0.0, |t| t.get(property)))
                .collect();
            let stream = REGRESSOR_STREAM + 2 * property.index() as u64;
            let forest = RandomForestRegressor::fit(
                data,
                &targets,
                &rows,
                &config.regressor_forest,
                derive_seed(config.seed, stream),
            );
            let boosting = GradientBoostingRegressor::fit(
                x,
                data,
                &targets,
                &rows,
                &config.regressor_boosting,
                derive_seed(config.seed, stream + 1),
            );
            (
                property,
                vec![RegressorModel::RandomForest(forest), RegressorModel::GradientBoosting(boosting)],
            )
        })
        .collect();

    for (property, members) in fitted {
        *models.get_mut(property) = members;
    }
    models
}

/// Stratified k-fold accuracy of the classifier ensemble on already
/// cleaned `rows`. Each fold refits the scaler and all four members.
pub fn cross_validate(
    rows: &[LabeledObservation],
    config: &ServiceConfig,
    k: usize,
) -> Result<CrossValidationReport, TrainingError> {
    if k < 2 {
        return Err(TrainingError::Folds(k));
    }
    let training = &config.training;
    let engineer = FeatureEngineer::new(&config.features);
    let features: Vec<FeatureVector> = rows.iter().map(|r| engineer.transform(&r.observation)).collect();

    let mut fold_accuracy = Vec::with_capacity(k);
    for (fold, test_idx) in stratified_folds(rows, k, training.seed).iter().enumerate() {
        if test_idx.is_empty() {
            continue;
        }
        let train_idx: Vec<usize> = (0..rows.len()).filter(|i| test_idx.binary_search(i).is_err()).collect();
        let train_features: Vec<FeatureVector> = train_idx.iter().map(|&i| features[i]).collect();
        let scaler = FeatureScaler::fit(&train_features)?;
        let x_train: Vec<Vec<f64>> = train_features.iter().map(|f| scaler.transform(f)).collect();
        let labels: Vec<usize> = train_idx.iter().map(|&i| rows[i].class.index()).collect();
        let data = BinnedMatrix::from_rows(&x_train, training.max_bins);

        let members: Vec<Box<dyn Classifier>> = fit_classifiers(&x_train, &data, &labels, training)
            .into_iter()
            .map(|m| Box::new(m) as Box<dyn Classifier>)
            .collect();
        let ensemble = ClassificationEnsemble::new(members);

        let predicted: Vec<Classification> = test_idx
            .iter()
            .map(|&i| ensemble.predict(&scaler.transform(&features[i])).classification())
            .collect();
        let truth: Vec<Classification> = test_idx.iter().map(|&i| rows[i].class).collect();
        let fold_acc = accuracy(&predicted, &truth);
        info!(fold, accuracy = fold_acc, test = test_idx.len(), "Cross-validation fold");
        fold_accuracy.push(fold_acc);
    }

    Ok(CrossValidationReport::from_folds(fold_accuracy))
}

/// Train a complete bundle from `catalogue`.
pub fn train(catalogue: Vec<LabeledObservation>, config: &ServiceConfig) -> Result<ModelBundle, TrainingError> {
    let started = Instant::now();
    let training = &config.training;

    let rows = clean(catalogue, &Preprocessor::new(config.preprocessing.clone()));
    let first = rows.first().ok_or(TrainingError::EmptyCatalogue)?;
    if rows.iter().all(|r| r.class == first.class) {
        return Err(TrainingError::SingleClass(first.class));
    }

    let (train_idx, test_idx) = stratified_split(&rows, training.test_fraction, training.seed);
    let train_rows: Vec<LabeledObservation> = train_idx.iter().map(|&i| rows[i].clone()).collect();
    let test_rows: Vec<LabeledObservation> = test_idx.iter().map(|&i| rows[i].clone()).collect();

    let engineer = FeatureEngineer::new(&config.features);
    let train_features: Vec<_> = train_rows.iter().map(|r| engineer.transform(&r.observation)).collect();
    let scaler = FeatureScaler::fit(&train_features)?;
    let x_train: Vec<Vec<f64>> = train_features.iter().map(|f| scaler.transform(f)).collect();
    let x_test: Vec<Vec<f64>> = test_rows
        .iter()
        .map(|r| scaler.transform(&engineer.transform(&r.observation)))
        .collect();
    let labels: Vec<usize> = train_rows.iter().map(|r| r.class.index()).collect();
    let data = BinnedMatrix::from_rows(&x_train, training.max_bins);

    info!(
        train = train_rows.len(),
        test = test_rows.len(),
        features = FEATURE_NAMES.len(),
        "Fitting ensemble members"
    );
    let (classifiers, regressors) = rayon::join(
        || fit_classifiers(&x_train, &data, &labels, training),
        || fit_regressors(&x_train, &data, &train_rows, training),
    );

    let mut bundle = ModelBundle {
        version: BUNDLE_FORMAT_VERSION,
        metadata: BundleMetadata {
            trained_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            seed: training.seed,
            n_samples: rows.len(),
            n_train: train_rows.len(),
            n_test: test_rows.len(),
            feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            evaluation: None,
        },
        scaler,
        classifiers,
        regressors,
    };

    if !test_rows.is_empty() {
        let ensemble = bundle.classification_ensemble(&[]);
        let property_regressors = bundle.property_regressors(config.properties.semi_major_axis_source);
        let report = evaluate(&ensemble, &property_regressors, &test_rows, &x_test);
        info!(
            accuracy = report.accuracy,
            ece = report.expected_calibration_error,
            test = report.n_test,
            "Held-out evaluation"
        );
        bundle.metadata.evaluation = Some(report);
    }

    if training.cv_folds >= 2 {
        let cv = cross_validate(&rows, config, training.cv_folds)?;
        info!(
            folds = cv.folds,
            mean = cv.mean_accuracy,
            std = cv.std_accuracy,
            "Cross-validation complete"
        );
        if let Some(report) = bundle.metadata.evaluation.as_mut() {
            report.cross_validation = Some(cv);
        }
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Training complete");
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostingParams, ForestParams, LogisticParams, MaxFeatures, MlpParams};
    use crate::training::synthetic_catalogue;

    /// Small, fast settings for unit tests.
    fn quick_config(n: usize) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        let t = &mut config.training;
        t.catalogue_size = n;
        t.forest = ForestParams { n_trees: 10, max_depth: 6, min_samples_split: 4, min_samples_leaf: 2, max_features: MaxFeatures::Sqrt };
        t.boosting = BoostingParams { n_rounds: 5, learning_rate: 0.3, max_depth: 3, min_samples_leaf: 5, subsample: 0.8 };
        t.mlp = MlpParams { hidden_layers: vec![8], epochs: 3, batch_size: 32, learning_rate: 0.01, alpha: 1e-4 };
        t.logistic = LogisticParams { iterations: 20, learning_rate: 0.1, c: 1.0 };
        t.regressor_forest = ForestParams { n_trees: 5, max_depth: 6, min_samples_split: 4, min_samples_leaf: 2, max_features: MaxFeatures::All };
        t.regressor_boosting = BoostingParams { n_rounds: 5, learning_rate: 0.3, max_depth: 3, min_samples_leaf: 5, subsample: 0.8 };
        config
    }

    #[test]
    fn test_stratified_split_keeps_class_mix() {
        let rows = synthetic_catalogue(&quick_config(400).training).expect("catalogue");
        let (train, test) = stratified_split(&rows, 0.2, 42);
        assert_eq!(train.len() + test.len(), rows.len());
        let test_fp = test.iter().filter(|&&i| rows[i].class == Classification::FalsePositive).count();
        assert_eq!(test_fp, 28); // 140 false positives × 0.2
    }

    #[test]
    fn test_train_produces_valid_bundle() {
        let config = quick_config(600);
        let catalogue = synthetic_catalogue(&config.training).expect("catalogue");
        let bundle = train(catalogue, &config).expect("train");
        assert!(bundle.validate().is_ok());
        assert_eq!(bundle.classifiers.len(), 4);
        for property in Property::ALL {
            assert_eq!(bundle.regressors.get(property).len(), 2);
        }
        let report = bundle.metadata.evaluation.expect("evaluation");
        assert!(report.accuracy > 0.5, "accuracy {}", report.accuracy);
        assert_eq!(report.member_accuracy.len(), 4);
        assert!(report.properties.contains_key("planet_radius"));
    }

    #[test]
    fn test_stratified_folds_partition_rows() {
        let rows = synthetic_catalogue(&quick_config(300).training).expect("catalogue");
        let folds = stratified_folds(&rows, 5, 42);
        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..rows.len()).collect::<Vec<_>>());
        for fold in &folds {
            let confirmed = fold.iter().filter(|&&i| rows[i].class == Classification::ConfirmedExoplanet).count();
            assert_eq!(confirmed, 18); // 90 confirmed dealt over 5 folds
        }
        assert_eq!(folds, stratified_folds(&rows, 5, 42));
    }

    #[test]
    fn test_cross_validation_reports_every_fold() {
        let config = quick_config(300);
        let rows = synthetic_catalogue(&config.training).expect("catalogue");
        let cv = cross_validate(&rows, &config, 3).expect("cv");
        assert_eq!(cv.folds, 3);
        assert_eq!(cv.fold_accuracy.len(), 3);
        assert!(cv.fold_accuracy.iter().all(|a| (0.0..=1.0).contains(a)));
        assert!(cv.mean_accuracy > 0.4, "mean accuracy {}", cv.mean_accuracy);
        assert!(matches!(cross_validate(&rows, &config, 1), Err(TrainingError::Folds(1))));
    }

    #[test]
    fn test_cv_folds_attach_to_evaluation() {
        let mut config = quick_config(300);
        config.training.cv_folds = 2;
        let catalogue = synthetic_catalogue(&config.training).expect("catalogue");
        let bundle = train(catalogue, &config).expect("train");
        let report = bundle.metadata.evaluation.expect("evaluation");
        assert_eq!(report.cross_validation.map(|cv| cv.folds), Some(2));
        let q = report.uncertainty_quality;
        assert!((0.0..=1.0).contains(&q.mean_uncertainty_correct));
        assert!((-1.0..=1.0).contains(&q.uncertainty_error_correlation));
    }

    #[test]
    fn test_single_class_rejected() {
        let config = quick_config(50);
        let catalogue: Vec<LabeledObservation> = synthetic_catalogue(&config.training)
            .expect("catalogue")
            .into_iter()
            .filter(|r| r.class == Classification::FalsePositive)
            .collect();
        assert!(matches!(train(catalogue, &config), Err(TrainingError::SingleClass(_))));
    }

    #[test]
    fn test_empty_catalogue_rejected() {
        assert!(matches!(train(Vec::new(), &quick_config(10)), Err(TrainingError::EmptyCatalogue)));
    }
}
