//! Closed-form transit and stellar physics
//!
//! Every function here is pure and total: bases and divisors are floored at
//! [`FEATURE_FLOOR`] so degenerate inputs give finite values instead of
//! NaN/Inf. Used by the feature engineer, the property fallback path and
//! the diagnostic report.

use crate::config::defaults::{
    DAYS_PER_YEAR, EARTH_RADII_PER_SOLAR_RADIUS, FEATURE_FLOOR, IMPACT_PRIOR_MAX,
    MASS_LUMINOSITY_EXPONENT, MASS_RADIUS_EXPONENT, SOLAR_RADIUS_AU,
};

/// Clamp a base or divisor to at least `FEATURE_FLOOR`; NaN becomes the floor.
pub fn floored(x: f64) -> f64 {
    if x.is_finite() {
        x.max(FEATURE_FLOOR)
    } else {
        FEATURE_FLOOR
    }
}

/// Replace NaN/Inf with zero.
pub fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

// ============================================================================
// Stellar relations
// ============================================================================

/// Main-sequence stellar radius in solar radii.
///
/// Formula: R = M^0.8
pub fn stellar_radius(stellar_mass: f64) -> f64 {
    floored(stellar_mass).powf(MASS_RADIUS_EXPONENT)
}

/// Main-sequence luminosity in solar luminosities.
///
/// Formula: L = M^3.5
pub fn stellar_luminosity(stellar_mass: f64) -> f64 {
    floored(stellar_mass).powf(MASS_LUMINOSITY_EXPONENT)
}

// ============================================================================
// Orbit
// ============================================================================

/// Semi-major axis from Kepler's third law, in AU.
///
/// Formula: a = (P / 365.25)^(2/3) × M^(1/3)
///
/// Where:
/// - P = orbital period (days)
/// - M = stellar mass (solar masses)
pub fn kepler_semi_major_axis(period_days: f64, stellar_mass: f64) -> f64 {
    (floored(period_days) / DAYS_PER_YEAR).powf(2.0 / 3.0) * floored(stellar_mass).powf(1.0 / 3.0)
}

/// Physical planetary equilibrium temperature in Kelvin (zero albedo, full
/// redistribution). Property prior only; the feature vector keeps the
/// unit-free proxy.
///
/// Formula: T_eq = T* × sqrt(R* / (2a)), with R* converted to AU.
pub fn planet_equilibrium_temperature(stellar_temp: f64, stellar_mass: f64, semi_major_axis_au: f64) -> f64 {
    let r_star_au = stellar_radius(stellar_mass) * SOLAR_RADIUS_AU;
    stellar_temp.max(0.0) * (r_star_au / (2.0 * floored(semi_major_axis_au))).sqrt()
}

/// Transit duration in hours for a circular orbit.
///
/// Formula: T = (P/π) × asin( (R*/a) × sqrt((1+k)² − b²) ), with k = Rp/R*.
/// Returns 0 when the chord does not cross the disc (b ≥ 1 + k).
pub fn geometric_transit_duration(
    period_days: f64,
    stellar_mass: f64,
    radius_ratio: f64,
    impact_parameter: f64,
) -> f64 {
    let a = kepler_semi_major_axis(period_days, stellar_mass);
    let r_star_over_a = stellar_radius(stellar_mass) * SOLAR_RADIUS_AU / a;
    let chord_sq = (1.0 + radius_ratio).powi(2) - impact_parameter.powi(2);
    if chord_sq <= 0.0 {
        return 0.0;
    }
    let arg = (r_star_over_a * chord_sq.sqrt()).min(1.0);
    floored(period_days) / std::f64::consts::PI * arg.asin() * 24.0
}

// ============================================================================
// Planet
// ============================================================================

/// Planet radius in Earth radii from transit depth.
///
/// Formula: Rp = sqrt(depth) × R* × 109.1
pub fn planet_radius_from_depth(transit_depth: f64, stellar_mass: f64) -> f64 {
    transit_depth.max(0.0).sqrt() * stellar_radius(stellar_mass) * EARTH_RADII_PER_SOLAR_RADIUS
}

/// Impact parameter estimate from the duration/period ratio.
///
/// Formula: b = 1 − (duration/period) / (2 × sqrt(depth)), clamped to [0, 1].
/// A zero-depth transit has no defined chord and reports 0.
pub fn estimated_impact(duration_period_ratio: f64, transit_depth: f64) -> f64 {
    let radius_ratio = transit_depth.max(0.0).sqrt();
    if radius_ratio < FEATURE_FLOOR {
        return 0.0;
    }
    finite_or_zero(1.0 - duration_period_ratio / (2.0 * radius_ratio)).clamp(0.0, 1.0)
}

/// Impact parameter used when no regressor produced a value; capped below grazing.
pub fn impact_prior(duration_period_ratio: f64, transit_depth: f64) -> f64 {
    estimated_impact(duration_period_ratio, transit_depth).min(IMPACT_PRIOR_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kepler_earth_orbit() {
        let a = kepler_semi_major_axis(365.25, 1.0);
        assert!((a - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kepler_third_law_holds() {
        for &(p, m) in &[(3.5, 0.8), (289.9, 0.97), (1200.0, 1.4)] {
            let a: f64 = kepler_semi_major_axis(p, m);
            let years: f64 = p / DAYS_PER_YEAR;
            let ratio = a.powi(3) / years.powi(2);
            assert!((ratio - m).abs() / m < 1e-9, "a^3/P^2 = {ratio} for M = {m}");
        }
    }

    #[test]
    fn test_floors_prevent_nan() {
        assert!(kepler_semi_major_axis(0.0, 0.0).is_finite());
        assert!(stellar_luminosity(-3.0).is_finite());
        assert!(planet_equilibrium_temperature(5800.0, 1.0, 0.0).is_finite());
        assert_eq!(floored(f64::NAN), FEATURE_FLOOR);
    }

    #[test]
    fn test_impact_clamped_and_zero_depth() {
        assert_eq!(estimated_impact(0.01, 0.0), 0.0);
        assert_eq!(estimated_impact(10.0, 0.01), 0.0);
        let b = estimated_impact(0.001, 0.01);
        assert!((b - 0.995).abs() < 1e-12);
        assert!(impact_prior(0.001, 0.01) <= IMPACT_PRIOR_MAX);
    }

    #[test]
    fn test_radius_from_depth_jupiter() {
        // Jupiter transiting the Sun: depth ~ 0.0106, radius ~ 11.2 Earth radii
        let r = planet_radius_from_depth(0.0106, 1.0);
        assert!((r - 11.23).abs() < 0.1, "got {r}");
    }

    #[test]
    fn test_geometric_duration_earth_like() {
        // Earth-Sun central transit lasts about 13 hours
        let t = geometric_transit_duration(365.25, 1.0, 0.009, 0.0);
        assert!((t - 13.0).abs() < 0.5, "got {t}");
        assert_eq!(geometric_transit_duration(10.0, 1.0, 0.1, 1.5), 0.0);
    }
}
