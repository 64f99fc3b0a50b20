//! Offline training
//!
//! Everything needed to produce a model bundle:
//!
//! - `catalogue`: seeded synthetic catalogue and CSV catalogue loader
//! - `trainer`: cleaning, feature scaling, split, member fitting, k-fold CV
//! - `evaluation`: accuracy, confusion, calibration, uncertainty quality
//!   and property errors
//!
//! Training is never on the request path; `exo-classifier train` runs it
//! and writes the bundle the server loads at startup.

pub mod catalogue;
pub mod evaluation;
pub mod trainer;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::ensemble::Property;
use crate::preprocessing::ScalerError;
use crate::types::{Classification, Observation};

pub use catalogue::{load_csv_catalogue, synthetic_catalogue};
pub use evaluation::{CrossValidationReport, EvaluationReport, RegressionMetrics, UncertaintyQuality};
pub use trainer::{cross_validate, train};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training catalogue is empty after cleaning")]
    EmptyCatalogue,

    #[error("training catalogue contains only {0} rows; at least two classes are required")]
    SingleClass(Classification),

    #[error("cross-validation needs at least 2 folds (got {0})")]
    Folds(usize),

    #[error("invalid sampling distribution: {0}")]
    Distribution(String),

    #[error("failed to read catalogue {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalogue line {line}: {reason}")]
    Csv { line: usize, reason: String },

    #[error(transparent)]
    Scaler(#[from] ScalerError),
}

/// Ground-truth property values for a planet-like training row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyTargets {
    pub planet_radius: f64,
    pub planet_temp: f64,
    pub semi_major_axis: f64,
    pub impact_parameter: f64,
}

impl PropertyTargets {
    pub const fn get(&self, property: Property) -> f64 {
        match property {
            Property::PlanetRadius => self.planet_radius,
            Property::PlanetTemp => self.planet_temp,
            Property::SemiMajorAxis => self.semi_major_axis,
            Property::ImpactParameter => self.impact_parameter,
        }
    }
}

/// One catalogue row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledObservation {
    pub observation: Observation,
    pub class: Classification,
    /// Present for planet-like rows with known properties
    pub targets: Option<PropertyTargets>,
}
