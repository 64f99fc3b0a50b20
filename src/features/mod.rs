//! Feature Engineering
//!
//! Turns the seven raw observation fields into the fixed, ordered vector
//! the trained models expect. The order in [`FEATURE_NAMES`] is part of the
//! model contract: bundles record it and are rejected at load if it differs.
//!
//! Groups, in order:
//! - raw inputs (7)
//! - transit geometry (4)
//! - stellar relations (4)
//! - orbit and irradiation (4)
//! - detection statistics (5)
//! - interaction terms (5)
//! - detection quality (1)

use serde::Serialize;

use crate::config::defaults::{SNR_PER_DEPTH_EPSILON, SOLAR_TEMP_K};
use crate::config::FeatureConfig;
use crate::physics::{self, finite_or_zero, floored};
use crate::preprocessing::quality_score;
use crate::types::Observation;

/// Length of every feature vector.
pub const N_FEATURES: usize = 30;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    // Raw
    "orbital_period",
    "transit_duration",
    "transit_depth",
    "snr",
    "stellar_mass",
    "stellar_temp",
    "stellar_magnitude",
    // Transit geometry
    "duration_period_ratio",
    "radius_ratio",
    "estimated_impact",
    "signal_strength",
    // Stellar
    "stellar_radius_estimate",
    "stellar_luminosity",
    "stellar_density_proxy",
    "brightness_metric",
    // Orbit
    "semimajor_axis_estimate",
    "orbital_velocity_proxy",
    "insolation_flux",
    "equilibrium_temp_estimate",
    // Detection
    "mes_proxy",
    "transit_probability",
    "depth_noise_ratio",
    "duration_anomaly",
    "transit_shape_indicator",
    // Interactions
    "period_snr_interaction",
    "depth_duration_interaction",
    "stellar_planet_interaction",
    "snr_per_depth",
    "period_normalized_duration",
    // Quality
    "quality_score",
];

/// Heavy-tailed, non-negative features that the scaler log-transforms.
pub const LOG_SCALED: [&str; 18] = [
    "orbital_period",
    "transit_duration",
    "transit_depth",
    "snr",
    "duration_period_ratio",
    "signal_strength",
    "stellar_luminosity",
    "stellar_density_proxy",
    "brightness_metric",
    "semimajor_axis_estimate",
    "insolation_flux",
    "mes_proxy",
    "transit_probability",
    "depth_noise_ratio",
    "duration_anomaly",
    "transit_shape_indicator",
    "depth_duration_interaction",
    "snr_per_depth",
];

/// Index of a feature by name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Ordered, finite feature values for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; N_FEATURES],
}

impl FeatureVector {
    pub const fn from_values(values: [f64; N_FEATURES]) -> Self {
        Self { values }
    }

    pub const fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|i| self.values[i])
    }

    /// `(name, value)` pairs in vector order.
    pub fn named(&self) -> Vec<NamedFeature> {
        FEATURE_NAMES
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| NamedFeature { name, value: *value })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NamedFeature {
    pub name: &'static str,
    pub value: f64,
}

/// Deterministic `Observation → FeatureVector` transform.
#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    default_num_transits: u32,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}

impl FeatureEngineer {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            default_num_transits: config.default_num_transits.max(1),
        }
    }

    pub fn transform(&self, obs: &Observation) -> FeatureVector {
        let period = floored(obs.orbital_period);
        let duration = obs.transit_duration;
        let depth = obs.transit_depth.max(0.0);
        let snr = obs.snr;
        let mass = obs.stellar_mass;
        let temp = obs.stellar_temp;
        let magnitude = obs.stellar_magnitude;

        // Transit geometry
        let duration_period_ratio = duration / period;
        let radius_ratio = depth.sqrt();
        let impact = physics::estimated_impact(duration_period_ratio, depth);
        let signal_strength = snr * radius_ratio;

        // Stellar
        let stellar_radius = physics::stellar_radius(mass);
        let luminosity = physics::stellar_luminosity(mass);
        let density_proxy = floored(mass) / floored(temp / SOLAR_TEMP_K).powi(4);
        let brightness = 10f64.powf(-magnitude / 2.5);

        // Orbit
        let sma = physics::kepler_semi_major_axis(period, mass);
        let velocity_proxy = 1.0 / floored(sma).sqrt();
        let insolation = luminosity / floored(sma).powi(2);
        // Dimensionless proxy: R* stays in solar radii, a in AU
        let t_eq = temp * (stellar_radius / (2.0 * floored(sma))).sqrt();

        // Detection
        let n_transits = f64::from(obs.num_transits.unwrap_or(self.default_num_transits).max(1));
        let mes = snr * n_transits.sqrt();
        let transit_probability = stellar_radius / floored(sma);
        let depth_noise = depth * snr;
        let expected_duration_days = floored(period * transit_probability * 0.1);
        let duration_anomaly = (duration / 24.0 - expected_duration_days).abs() / expected_duration_days;
        let shape_indicator = duration_period_ratio / floored(radius_ratio);

        // Interactions
        let period_snr = period.ln_1p() * snr.max(0.0).ln_1p();
        let depth_duration = depth * duration;
        let stellar_planet = mass * radius_ratio;
        let snr_per_depth = snr / (depth + SNR_PER_DEPTH_EPSILON);
        let normalized_duration = duration / floored(period.ln_1p());

        let values = [
            obs.orbital_period,
            duration,
            obs.transit_depth,
            snr,
            mass,
            temp,
            magnitude,
            duration_period_ratio,
            radius_ratio,
            impact,
            signal_strength,
            stellar_radius,
            luminosity,
            density_proxy,
            brightness,
            sma,
            velocity_proxy,
            insolation,
            t_eq,
            mes,
            transit_probability,
            depth_noise,
            duration_anomaly,
            shape_indicator,
            period_snr,
            depth_duration,
            stellar_planet,
            snr_per_depth,
            normalized_duration,
            quality_score(obs),
        ];

        FeatureVector::from_values(values.map(finite_or_zero))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Observation {
        Observation::new(289.9, 7.4, 0.00492, 12.0, 0.97, 5627.0, 11.7)
    }

    fn feat(fv: &FeatureVector, name: &str) -> f64 {
        fv.get(name).unwrap_or_else(|| panic!("missing feature {name}"))
    }

    #[test]
    fn test_names_unique_and_log_list_known() {
        let mut seen = std::collections::HashSet::new();
        for n in FEATURE_NAMES {
            assert!(seen.insert(n), "duplicate feature {n}");
        }
        for n in LOG_SCALED {
            assert!(feature_index(n).is_some(), "unknown log feature {n}");
        }
    }

    #[test]
    fn test_required_formulas() {
        let fv = FeatureEngineer::default().transform(&scenario());
        assert!((feat(&fv, "duration_period_ratio") - 7.4 / 289.9).abs() < 1e-12);
        assert!((feat(&fv, "radius_ratio") - 0.00492f64.sqrt()).abs() < 1e-12);
        assert!((feat(&fv, "signal_strength") - 12.0 * 0.00492f64.sqrt()).abs() < 1e-12);
        assert!((feat(&fv, "stellar_radius_estimate") - 0.97f64.powf(0.8)).abs() < 1e-12);
        assert!((feat(&fv, "stellar_luminosity") - 0.97f64.powf(3.5)).abs() < 1e-12);
        assert!((feat(&fv, "mes_proxy") - 12.0).abs() < 1e-12);
        assert!((feat(&fv, "depth_noise_ratio") - 0.00492 * 12.0).abs() < 1e-12);

        let a = feat(&fv, "semimajor_axis_estimate");
        assert!((a - 0.8486).abs() < 0.001, "a = {a}");
        assert!((feat(&fv, "transit_probability") - 0.97f64.powf(0.8) / a).abs() < 1e-12);
        assert!((feat(&fv, "orbital_velocity_proxy") - 1.0 / a.sqrt()).abs() < 1e-12);

        let t_eq = feat(&fv, "equilibrium_temp_estimate");
        let expected = 5627.0 * (0.97f64.powf(0.8) / (2.0 * a)).sqrt();
        assert!((t_eq - expected).abs() < 1e-9, "t_eq = {t_eq}, expected {expected}");
        assert!((t_eq - 4267.0).abs() < 1.0);
    }

    #[test]
    fn test_num_transits_scales_mes() {
        let mut obs = scenario();
        obs.num_transits = Some(4);
        let fv = FeatureEngineer::default().transform(&obs);
        assert!((feat(&fv, "mes_proxy") - 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs_stay_finite() {
        let obs = Observation::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let fv = FeatureEngineer::default().transform(&obs);
        assert!(fv.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(feat(&fv, "estimated_impact"), 0.0);
    }

    #[test]
    fn test_impact_within_unit_interval() {
        let obs = Observation::new(1.0, 30.0, 0.0001, 10.0, 1.0, 5800.0, 12.0);
        let fv = FeatureEngineer::default().transform(&obs);
        let b = feat(&fv, "estimated_impact");
        assert!((0.0..=1.0).contains(&b));
    }
}
