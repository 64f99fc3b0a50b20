//! Service Configuration - every scoring and training constant as a TOML value
//!
//! Each struct implements `Default` with the values the service ships with,
//! so running without a config file is always a valid deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use super::training_config::TrainingConfig;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a classifier deployment.
///
/// Load with `ServiceConfig::load()` which searches:
/// 1. `$EXO_CONFIG` env var
/// 2. `./exo_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Model bundle location and member selection
    #[serde(default)]
    pub models: ModelsConfig,

    /// Feature engineering knobs
    #[serde(default)]
    pub features: FeatureConfig,

    /// Batch cleaning bands and outlier threshold
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    /// Confirmation score rules and the correction blend
    #[serde(default)]
    pub correction: CorrectionConfig,

    /// Property regressor reporting
    #[serde(default)]
    pub properties: PropertiesConfig,

    /// Offline training hyperparameters
    #[serde(default)]
    pub training: TrainingConfig,
}

impl ServiceConfig {
    /// Load configuration using the standard search order:
    /// 1. `$EXO_CONFIG` environment variable
    /// 2. `./exo_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded service config from EXO_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from EXO_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "EXO_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded service config from ./{}", defaults::DEFAULT_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::DEFAULT_CONFIG_FILE);
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        for warning in super::validation::validate_unknown_keys(&contents) {
            warn!(path = %path.display(), field = %warning.field, "{warning}");
        }
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file (used by `exo-classifier config --write`).
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Service config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - SNR and magnitude tiers must be ordered
    /// - Band minimums must be below band maximums
    /// - Blend weight and target distribution must be valid probabilities
    /// - Training sizes and fractions must be usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let r = &self.correction.rules;
        Self::check_ordered(r.snr_weak, r.snr_good, "correction.rules.snr_weak/snr_good", &mut errors);
        Self::check_ordered(r.snr_good, r.snr_strong, "correction.rules.snr_good/snr_strong", &mut errors);
        Self::check_ordered(r.snr_strong, r.snr_excellent, "correction.rules.snr_strong/snr_excellent", &mut errors);
        Self::check_ordered(r.depth_min, r.depth_max, "correction.rules.depth", &mut errors);
        Self::check_ordered(r.sunlike_temp_min_k, r.sunlike_temp_max_k, "correction.rules.sunlike_temp", &mut errors);
        Self::check_ordered(r.sunlike_mass_min, r.sunlike_mass_max, "correction.rules.sunlike_mass", &mut errors);
        Self::check_ordered(
            r.bright_magnitude,
            r.moderate_magnitude,
            "correction.rules.bright_magnitude/moderate_magnitude",
            &mut errors,
        );

        let c = &self.correction;
        if c.fire_threshold > 100 {
            errors.push(format!(
                "correction.fire_threshold: must be within 0..=100 (got {})",
                c.fire_threshold
            ));
        }
        Self::check_unit(c.blend_weight, "correction.blend_weight", &mut errors);
        Self::check_unit(c.min_confidence_gain, "correction.min_confidence_gain", &mut errors);
        let t = &c.target;
        for (name, v) in [
            ("confirmed_exoplanet", t.confirmed_exoplanet),
            ("planetary_candidate", t.planetary_candidate),
            ("false_positive", t.false_positive),
        ] {
            Self::check_unit(v, &format!("correction.target.{name}"), &mut errors);
        }
        let target_sum = t.confirmed_exoplanet + t.planetary_candidate + t.false_positive;
        if (target_sum - 1.0).abs() > 0.01 {
            errors.push(format!(
                "correction.target: probabilities must sum to 1.0 (got {target_sum:.3})"
            ));
        }

        let p = &self.preprocessing;
        Self::check_ordered(p.min_stellar_temp_k, p.max_stellar_temp_k, "preprocessing.stellar_temp", &mut errors);
        Self::check_ordered(p.min_stellar_mass, p.max_stellar_mass, "preprocessing.stellar_mass", &mut errors);
        if !(p.outlier_z_threshold.is_finite() && p.outlier_z_threshold > 0.0) {
            errors.push(format!(
                "preprocessing.outlier_z_threshold: must be positive (got {})",
                p.outlier_z_threshold
            ));
        }

        if self.features.default_num_transits == 0 {
            errors.push("features.default_num_transits: must be at least 1".to_string());
        }
        if self.server.max_body_bytes == 0 {
            errors.push("server.max_body_bytes: must be > 0".to_string());
        }
        if self.server.max_batch_rows == 0 {
            errors.push("server.max_batch_rows: must be > 0".to_string());
        }

        self.training.collect_errors(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub(crate) fn check_ordered(low: f64, high: f64, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass, catch them explicitly
        if !low.is_finite() || !high.is_finite() {
            errors.push(format!("{name}: values must be finite (got {low}, {high})"));
            return;
        }
        if high <= low {
            errors.push(format!("{name}: upper ({high:.4}) must be > lower ({low:.4})"));
        }
    }

    pub(crate) fn check_unit(value: f64, name: &str, errors: &mut Vec<String>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(format!("{name}: must be within [0, 1] (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (overridden by `--addr` / `EXO_SERVER_ADDR`)
    #[serde(default = "default_server_addr")]
    pub addr: String,

    /// Maximum accepted request body (bytes)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Maximum rows in one `/predict/batch` request
    #[serde(default = "default_max_batch_rows")]
    pub max_batch_rows: usize,
}

fn default_server_addr() -> String { defaults::DEFAULT_SERVER_ADDR.to_string() }
fn default_max_body_bytes() -> usize { defaults::DEFAULT_MAX_BODY_BYTES }
fn default_max_batch_rows() -> usize { defaults::DEFAULT_MAX_BATCH_ROWS }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            max_body_bytes: default_max_body_bytes(),
            max_batch_rows: default_max_batch_rows(),
        }
    }
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Path of the trained model bundle
    #[serde(default = "default_bundle_path")]
    pub bundle_path: PathBuf,

    /// Ensemble members to skip at load time (e.g. `["mlp"]`)
    #[serde(default)]
    pub disabled_members: Vec<String>,
}

fn default_bundle_path() -> PathBuf { PathBuf::from(defaults::DEFAULT_BUNDLE_PATH) }

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            bundle_path: default_bundle_path(),
            disabled_members: Vec::new(),
        }
    }
}

// ============================================================================
// Features
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Transit count assumed by `mes_proxy` when the request has none
    #[serde(default = "default_num_transits")]
    pub default_num_transits: u32,
}

fn default_num_transits() -> u32 { 1 }

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { default_num_transits: default_num_transits() }
    }
}

// ============================================================================
// Preprocessing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Stellar temperature plausibility band, exclusive (K)
    #[serde(default = "default_min_stellar_temp")]
    pub min_stellar_temp_k: f64,
    #[serde(default = "default_max_stellar_temp")]
    pub max_stellar_temp_k: f64,

    /// Stellar mass plausibility band, exclusive (solar masses)
    #[serde(default = "default_min_stellar_mass")]
    pub min_stellar_mass: f64,
    #[serde(default = "default_max_stellar_mass")]
    pub max_stellar_mass: f64,

    /// Rows with any |modified z| at or above this are outliers
    #[serde(default = "default_outlier_z")]
    pub outlier_z_threshold: f64,

    /// Apply outlier removal to CSV batches as well as training catalogues
    #[serde(default)]
    pub remove_batch_outliers: bool,
}

fn default_min_stellar_temp() -> f64 { 2000.0 }
fn default_max_stellar_temp() -> f64 { 50_000.0 }
fn default_min_stellar_mass() -> f64 { 0.1 }
fn default_max_stellar_mass() -> f64 { 100.0 }
fn default_outlier_z() -> f64 { 4.0 }

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            min_stellar_temp_k: default_min_stellar_temp(),
            max_stellar_temp_k: default_max_stellar_temp(),
            min_stellar_mass: default_min_stellar_mass(),
            max_stellar_mass: default_max_stellar_mass(),
            outlier_z_threshold: default_outlier_z(),
            remove_batch_outliers: false,
        }
    }
}

// ============================================================================
// Correction
// ============================================================================

/// Confirmation score rule table plus the override blend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Disable to report the raw ensemble distribution unconditionally
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum confirmation score for the override to be considered
    #[serde(default = "default_fire_threshold")]
    pub fire_threshold: u32,

    /// Weight of the target distribution in the blend (original gets the rest)
    #[serde(default = "default_blend_weight")]
    pub blend_weight: f64,

    /// Corrected confidence must beat the original by more than this
    #[serde(default = "default_min_confidence_gain")]
    pub min_confidence_gain: f64,

    #[serde(default)]
    pub target: TargetDistribution,

    #[serde(default)]
    pub rules: ScoreRules,
}

fn default_true() -> bool { true }
fn default_fire_threshold() -> u32 { 90 }
fn default_blend_weight() -> f64 { 0.9 }
fn default_min_confidence_gain() -> f64 { 0.15 }

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fire_threshold: default_fire_threshold(),
            blend_weight: default_blend_weight(),
            min_confidence_gain: default_min_confidence_gain(),
            target: TargetDistribution::default(),
            rules: ScoreRules::default(),
        }
    }
}

/// Distribution the override pulls toward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDistribution {
    #[serde(default = "default_target_confirmed")]
    pub confirmed_exoplanet: f64,
    #[serde(default = "default_target_minor")]
    pub planetary_candidate: f64,
    #[serde(default = "default_target_minor")]
    pub false_positive: f64,
}

fn default_target_confirmed() -> f64 { 0.92 }
fn default_target_minor() -> f64 { 0.04 }

impl Default for TargetDistribution {
    fn default() -> Self {
        Self {
            confirmed_exoplanet: default_target_confirmed(),
            planetary_candidate: default_target_minor(),
            false_positive: default_target_minor(),
        }
    }
}

/// Additive rule table of the confirmation score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRules {
    /// Starting score before any rule applies
    #[serde(default = "default_base_score")]
    pub base: i32,

    // SNR tiers (checked high to low)
    #[serde(default = "default_snr_excellent")]
    pub snr_excellent: f64,
    #[serde(default = "default_snr_excellent_bonus")]
    pub snr_excellent_bonus: i32,
    #[serde(default = "default_snr_strong")]
    pub snr_strong: f64,
    #[serde(default = "default_snr_strong_bonus")]
    pub snr_strong_bonus: i32,
    #[serde(default = "default_snr_good")]
    pub snr_good: f64,
    #[serde(default = "default_snr_good_bonus")]
    pub snr_good_bonus: i32,
    /// Below this the signal is penalised
    #[serde(default = "default_snr_weak")]
    pub snr_weak: f64,
    #[serde(default = "default_snr_weak_penalty")]
    pub snr_weak_penalty: i32,

    // Depth band (inclusive)
    #[serde(default = "default_depth_min")]
    pub depth_min: f64,
    #[serde(default = "default_depth_max")]
    pub depth_max: f64,
    #[serde(default = "default_depth_planet_bonus")]
    pub depth_planet_bonus: i32,
    #[serde(default = "default_depth_too_deep_penalty")]
    pub depth_too_deep_penalty: i32,
    #[serde(default = "default_depth_too_shallow_penalty")]
    pub depth_too_shallow_penalty: i32,

    // Sun-like host (inclusive)
    #[serde(default = "default_sunlike_temp_min")]
    pub sunlike_temp_min_k: f64,
    #[serde(default = "default_sunlike_temp_max")]
    pub sunlike_temp_max_k: f64,
    #[serde(default = "default_sunlike_mass_min")]
    pub sunlike_mass_min: f64,
    #[serde(default = "default_sunlike_mass_max")]
    pub sunlike_mass_max: f64,
    #[serde(default = "default_sunlike_bonus")]
    pub sunlike_bonus: i32,

    // Duration band: [min_hours, base_hours + log_period_coeff * ln(1 + P)]
    #[serde(default = "default_duration_min_hours")]
    pub duration_min_hours: f64,
    #[serde(default = "default_duration_base_hours")]
    pub duration_base_hours: f64,
    #[serde(default = "default_duration_log_period_coeff")]
    pub duration_log_period_coeff: f64,
    #[serde(default = "default_duration_bonus")]
    pub duration_bonus: i32,

    // Host brightness (strictly below)
    #[serde(default = "default_bright_magnitude")]
    pub bright_magnitude: f64,
    #[serde(default = "default_bright_bonus")]
    pub bright_bonus: i32,
    #[serde(default = "default_moderate_magnitude")]
    pub moderate_magnitude: f64,
    #[serde(default = "default_moderate_bonus")]
    pub moderate_bonus: i32,

    // Long-period planet with a clean signal
    #[serde(default = "default_long_period_days")]
    pub long_period_days: f64,
    #[serde(default = "default_long_period_min_snr")]
    pub long_period_min_snr: f64,
    #[serde(default = "default_long_period_bonus")]
    pub long_period_bonus: i32,
}

fn default_base_score() -> i32 { 50 }
fn default_snr_excellent() -> f64 { 15.0 }
fn default_snr_excellent_bonus() -> i32 { 20 }
fn default_snr_strong() -> f64 { 12.0 }
fn default_snr_strong_bonus() -> i32 { 15 }
fn default_snr_good() -> f64 { 10.0 }
fn default_snr_good_bonus() -> i32 { 10 }
fn default_snr_weak() -> f64 { 7.0 }
fn default_snr_weak_penalty() -> i32 { -10 }
fn default_depth_min() -> f64 { 0.0001 }
fn default_depth_max() -> f64 { 0.05 }
fn default_depth_planet_bonus() -> i32 { 15 }
fn default_depth_too_deep_penalty() -> i32 { -30 }
fn default_depth_too_shallow_penalty() -> i32 { -10 }
fn default_sunlike_temp_min() -> f64 { 4500.0 }
fn default_sunlike_temp_max() -> f64 { 6500.0 }
fn default_sunlike_mass_min() -> f64 { 0.7 }
fn default_sunlike_mass_max() -> f64 { 1.3 }
fn default_sunlike_bonus() -> i32 { 10 }
fn default_duration_min_hours() -> f64 { 2.0 }
fn default_duration_base_hours() -> f64 { 3.0 }
fn default_duration_log_period_coeff() -> f64 { 0.8 }
fn default_duration_bonus() -> i32 { 10 }
fn default_bright_magnitude() -> f64 { 13.0 }
fn default_bright_bonus() -> i32 { 10 }
fn default_moderate_magnitude() -> f64 { 15.0 }
fn default_moderate_bonus() -> i32 { 5 }
fn default_long_period_days() -> f64 { 150.0 }
fn default_long_period_min_snr() -> f64 { 10.0 }
fn default_long_period_bonus() -> i32 { 15 }

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            base: default_base_score(),
            snr_excellent: default_snr_excellent(),
            snr_excellent_bonus: default_snr_excellent_bonus(),
            snr_strong: default_snr_strong(),
            snr_strong_bonus: default_snr_strong_bonus(),
            snr_good: default_snr_good(),
            snr_good_bonus: default_snr_good_bonus(),
            snr_weak: default_snr_weak(),
            snr_weak_penalty: default_snr_weak_penalty(),
            depth_min: default_depth_min(),
            depth_max: default_depth_max(),
            depth_planet_bonus: default_depth_planet_bonus(),
            depth_too_deep_penalty: default_depth_too_deep_penalty(),
            depth_too_shallow_penalty: default_depth_too_shallow_penalty(),
            sunlike_temp_min_k: default_sunlike_temp_min(),
            sunlike_temp_max_k: default_sunlike_temp_max(),
            sunlike_mass_min: default_sunlike_mass_min(),
            sunlike_mass_max: default_sunlike_mass_max(),
            sunlike_bonus: default_sunlike_bonus(),
            duration_min_hours: default_duration_min_hours(),
            duration_base_hours: default_duration_base_hours(),
            duration_log_period_coeff: default_duration_log_period_coeff(),
            duration_bonus: default_duration_bonus(),
            bright_magnitude: default_bright_magnitude(),
            bright_bonus: default_bright_bonus(),
            moderate_magnitude: default_moderate_magnitude(),
            moderate_bonus: default_moderate_bonus(),
            long_period_days: default_long_period_days(),
            long_period_min_snr: default_long_period_min_snr(),
            long_period_bonus: default_long_period_bonus(),
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Which semi-major axis estimate is reported as `semi_major_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemiMajorAxisSource {
    /// Kepler's third law from period and stellar mass
    #[default]
    Kepler,
    /// Mean of the learned regressor members
    Learned,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertiesConfig {
    #[serde(default)]
    pub semi_major_axis_source: SemiMajorAxisSource,
}

// ============================================================================
// Tests
// ============================================================================
