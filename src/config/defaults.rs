//! System-wide default constants.
//!
//! Physical constants and numeric guards shared by the feature engineer,
//! physics priors and training code. Operator-tunable values live in
//! [`super::ServiceConfig`]; these are fixed by the model contract.

// ============================================================================
// Numeric guards
// ============================================================================

/// Floor applied to every base or divisor before an exponent or division
/// in feature engineering, so degenerate inputs never yield NaN/Inf.
pub const FEATURE_FLOOR: f64 = 1e-6;

/// Offset added to the depth in `snr_per_depth`.
pub const SNR_PER_DEPTH_EPSILON: f64 = 1e-6;

/// Scaled features are clipped to `±SCALED_FEATURE_CLIP` interquartile ranges.
pub const SCALED_FEATURE_CLIP: f64 = 10.0;

/// Consistency constant of the modified z-score (`0.6745 = Φ⁻¹(0.75)`).
pub const MODIFIED_Z_SCALE: f64 = 0.6745;

/// Probability vectors must sum to one within this tolerance.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

// ============================================================================
// Astronomy
// ============================================================================

/// Days per Julian year, used by Kepler's third law.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Solar radius in astronomical units.
pub const SOLAR_RADIUS_AU: f64 = 0.00465;

/// Earth radii per solar radius.
pub const EARTH_RADII_PER_SOLAR_RADIUS: f64 = 109.1;

/// Effective temperature of the Sun (K), reference for the density proxy.
pub const SOLAR_TEMP_K: f64 = 5778.0;

/// Mass-radius exponent for main-sequence stars (`R ∝ M^0.8`).
pub const MASS_RADIUS_EXPONENT: f64 = 0.8;

/// Mass-luminosity exponent for main-sequence stars (`L ∝ M^3.5`).
pub const MASS_LUMINOSITY_EXPONENT: f64 = 3.5;

/// Ceiling applied to the impact parameter physics prior.
pub const IMPACT_PRIOR_MAX: f64 = 0.99;

// ============================================================================
// Model artifacts
// ============================================================================

/// Current on-disk model bundle format version.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Default path of the trained model bundle.
pub const DEFAULT_BUNDLE_PATH: &str = "models/exo_bundle.json";

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "exo_config.toml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "EXO_CONFIG";

// ============================================================================
// HTTP
// ============================================================================

/// Default bind address (the historical Flask port).
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:5000";

/// Default maximum request body size (bytes).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default maximum number of rows accepted by `/predict/batch`.
pub const DEFAULT_MAX_BATCH_ROWS: usize = 1_000;
