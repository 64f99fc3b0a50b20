//! exo-classifier: transit observation triage
//!
//! Classifies transit detections as confirmed exoplanet, planetary
//! candidate or false positive, and estimates planet properties for
//! planet-like detections.
//!
//! ## Architecture
//!
//! - **Preprocessing**: record coercion, range checks, artifact and outlier filters
//! - **Features**: 30 deterministic features per observation, robust scaling
//! - **Ensemble**: four heterogeneous classifiers, soft-voted
//! - **Correction**: rule-based confirmation score that can override weak votes
//! - **Properties**: per-property regressor ensembles with physics fallbacks
//! - **Training**: synthetic or CSV catalogue to a versioned JSON bundle

pub mod api;
pub mod artifacts;
pub mod config;
pub mod correction;
pub mod diagnostics;
pub mod ensemble;
pub mod features;
pub mod models;
pub mod physics;
pub mod pipeline;
pub mod preprocessing;
pub mod training;
pub mod types;

// Re-export configuration
pub use config::ServiceConfig;

// Re-export commonly used types
pub use types::{
    ClassProbabilities, Classification, Observation, PlanetProperties, PredictionResult, PropertyEstimate,
};

// Re-export the scoring surface
pub use artifacts::{ArtifactError, ModelBundle};
pub use pipeline::ScoringContext;
pub use preprocessing::ValidationError;
