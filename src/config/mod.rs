//! Service Configuration Module
//!
//! Provides deployment configuration loaded from TOML files: model bundle
//! location, confirmation-score rules, cleaning bands and training
//! hyperparameters.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line (fatal if invalid)
//! 2. `EXO_CONFIG` environment variable (path to TOML file)
//! 3. `exo_config.toml` in the current working directory
//! 4. Built-in defaults
//!
//! ## Usage
//!
//! The config is loaded once in `main()` and handed to whatever needs it.
//! There is no global: the scoring context takes the sections it uses by
//! value, so tests can build contexts with arbitrary settings.
//!
//! ```ignore
//! let config = ServiceConfig::load();
//! let ctx = ScoringContext::from_bundle(bundle, &config)?;
//! ```

mod service_config;
mod training_config;
pub mod defaults;
pub mod validation;

pub use service_config::*;
pub use training_config::*;
