//! Confidence correction
//!
//! A rule-based confirmation score in [0, 100] and an override that pulls
//! the ensemble distribution toward a fixed "confirmed" target when the
//! score is high and the pull actually gains confidence.
//!
//! ## Firing condition
//!
//! The override is applied only when all hold:
//! - `score >= fire_threshold`
//! - the ensemble label or the blended label is `confirmed_exoplanet`
//! - blended confidence exceeds the original by more than `min_confidence_gain`
//!
//! Otherwise the ensemble distribution is reported untouched.

use serde::Serialize;
use tracing::debug;

use crate::config::{CorrectionConfig, ScoreRules, TargetDistribution};
use crate::types::{ClassProbabilities, Classification, CorrectionRecord, Observation};

/// Additive confirmation score, clamped to [0, 100].
pub fn confirmation_score(obs: &Observation, rules: &ScoreRules) -> u8 {
    let mut score = rules.base;

    // Signal strength, strongest tier wins
    if obs.snr >= rules.snr_excellent {
        score += rules.snr_excellent_bonus;
    } else if obs.snr >= rules.snr_strong {
        score += rules.snr_strong_bonus;
    } else if obs.snr >= rules.snr_good {
        score += rules.snr_good_bonus;
    } else if obs.snr < rules.snr_weak {
        score += rules.snr_weak_penalty;
    }

    // Eclipsing binaries are deep, noise is shallow
    let planet_depth = (rules.depth_min..=rules.depth_max).contains(&obs.transit_depth);
    if planet_depth {
        score += rules.depth_planet_bonus;
    } else if obs.transit_depth > rules.depth_max {
        score += rules.depth_too_deep_penalty;
    } else {
        score += rules.depth_too_shallow_penalty;
    }

    if (rules.sunlike_temp_min_k..=rules.sunlike_temp_max_k).contains(&obs.stellar_temp)
        && (rules.sunlike_mass_min..=rules.sunlike_mass_max).contains(&obs.stellar_mass)
    {
        score += rules.sunlike_bonus;
    }

    let max_duration =
        rules.duration_base_hours + rules.duration_log_period_coeff * obs.orbital_period.max(0.0).ln_1p();
    if (rules.duration_min_hours..=max_duration).contains(&obs.transit_duration) {
        score += rules.duration_bonus;
    }

    if obs.stellar_magnitude < rules.bright_magnitude {
        score += rules.bright_bonus;
    } else if obs.stellar_magnitude < rules.moderate_magnitude {
        score += rules.moderate_bonus;
    }

    if obs.orbital_period > rules.long_period_days && obs.snr >= rules.long_period_min_snr && planet_depth {
        score += rules.long_period_bonus;
    }

    // Clamped, so the narrowing cast cannot truncate
    score.clamp(0, 100) as u8
}

/// `w · target + (1 − w) · original`, renormalised.
pub fn blend(original: &ClassProbabilities, target: &TargetDistribution, weight: f64) -> ClassProbabilities {
    let t = [target.confirmed_exoplanet, target.planetary_candidate, target.false_positive];
    let o = original.as_array();
    ClassProbabilities::from_array(std::array::from_fn(|k| weight * t[k] + (1.0 - weight) * o[k]))
}

/// What the correction stage decided for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    /// Distribution to report: corrected if applied, else the original
    pub probabilities: ClassProbabilities,
    /// `None` when the stage is disabled
    pub score: Option<u8>,
    pub applied: bool,
    /// Pre-correction state, present only when applied
    pub original: Option<CorrectionRecord>,
}

impl CorrectionOutcome {
    fn unchanged(probabilities: ClassProbabilities, score: Option<u8>) -> Self {
        Self {
            probabilities,
            score,
            applied: false,
            original: None,
        }
    }
}

/// Run the correction stage.
pub fn apply(obs: &Observation, probabilities: &ClassProbabilities, config: &CorrectionConfig) -> CorrectionOutcome {
    if !config.enabled {
        return CorrectionOutcome::unchanged(*probabilities, None);
    }

    let score = confirmation_score(obs, &config.rules);
    if u32::from(score) < config.fire_threshold {
        return CorrectionOutcome::unchanged(*probabilities, Some(score));
    }

    let corrected = blend(probabilities, &config.target, config.blend_weight);
    let original_label = probabilities.argmax();
    let confirmed_involved = original_label == Classification::ConfirmedExoplanet
        || corrected.argmax() == Classification::ConfirmedExoplanet;
    let gain = corrected.confidence() - probabilities.confidence();

    if !confirmed_involved || gain <= config.min_confidence_gain {
        debug!(score, gain, "Correction not applied");
        return CorrectionOutcome::unchanged(*probabilities, Some(score));
    }

    debug!(score, gain, from = %original_label, to = %corrected.argmax(), "Correction applied");
    CorrectionOutcome {
        probabilities: corrected,
        score: Some(score),
        applied: true,
        original: Some(CorrectionRecord {
            original_classification: original_label,
            original_confidence: probabilities.confidence(),
            original_probabilities: *probabilities,
            original_uncertainty: probabilities.normalized_entropy(),
        }),
    }
}
