//! Transit physics
//!
//! Closed-form stellar, orbital and planetary relations shared by feature
//! engineering, property fallbacks and diagnostics.

mod transit_models;

pub use transit_models::*;
