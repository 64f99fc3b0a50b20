//! Core data types shared across preprocessing, scoring and the API.

mod observation;
mod prediction;

pub use observation::{Classification, Observation, REQUIRED_FIELDS};
pub use prediction::{
    ClassProbabilities, CorrectionRecord, EstimateSource, PlanetProperties, PredictionResult,
    PropertyEstimate,
};
