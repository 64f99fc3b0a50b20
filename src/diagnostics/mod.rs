//! Explainable per-observation diagnostics
//!
//! A model-free report built from closed-form physics and fixed indicator
//! bands. It explains *why* an observation looks planet-like or not, and is
//! served by `POST /diagnose` and printed by the `predict` subcommand.

use serde::Serialize;
use std::fmt;

use crate::config::ScoreRules;
use crate::correction::confirmation_score;
use crate::physics;
use crate::types::{Classification, Observation};

// Detection-quality bands
const LOW_SNR: f64 = 7.0;
const GOOD_SNR: f64 = 12.0;
const MAX_PLAUSIBLE_SNR: f64 = 100.0;
const LONG_PERIOD_DAYS: f64 = 200.0;
const SHORT_PERIOD_DAYS: f64 = 2.0;
const DEEP_TRANSIT: f64 = 0.05;
const SHALLOW_TRANSIT: f64 = 0.0001;
const LONG_DURATION_RATIO: f64 = 0.2;
const SHORT_DURATION_RATIO: f64 = 0.01;
const PLANET_DURATION_RATIO_MAX: f64 = 0.15;
const MAX_PLANET_RADIUS: f64 = 20.0;
const MIN_PLANET_RADIUS: f64 = 0.5;

// Habitable-zone window (Venus to Earth-like orbits)
const HZ_AXIS_AU: (f64, f64) = (0.8, 1.2);
const HZ_PERIOD_DAYS: (f64, f64) = (200.0, 400.0);

const PLANET_INDICATORS: u8 = 6;
const FP_INDICATORS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    SubEarth,
    EarthToSuperEarth,
    NeptuneLike,
    JupiterLike,
    SuperJupiter,
}

impl SizeClass {
    pub fn from_radius(earth_radii: f64) -> Self {
        match earth_radii {
            r if r < 0.5 => Self::SubEarth,
            r if r < 2.0 => Self::EarthToSuperEarth,
            r if r < 6.0 => Self::NeptuneLike,
            r if r < 15.0 => Self::JupiterLike,
            _ => Self::SuperJupiter,
        }
    }

    pub const fn describe(self) -> &'static str {
        match self {
            Self::SubEarth => "Sub-Earth (very small)",
            Self::EarthToSuperEarth => "Earth to Super-Earth",
            Self::NeptuneLike => "Neptune-like",
            Self::JupiterLike => "Jupiter-like (gas giant)",
            Self::SuperJupiter => "Super-Jupiter (unlikely for planet)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitClass {
    VeryClose,
    Close,
    Inner,
    Outer,
    Far,
}

impl OrbitClass {
    pub fn from_axis(au: f64) -> Self {
        match au {
            a if a < 0.1 => Self::VeryClose,
            a if a < 0.5 => Self::Close,
            a if a < 1.5 => Self::Inner,
            a if a < 5.0 => Self::Outer,
            _ => Self::Far,
        }
    }

    pub const fn describe(self) -> &'static str {
        match self {
            Self::VeryClose => "Very close orbit (hot Jupiter/Neptune)",
            Self::Close => "Close orbit (like Mercury)",
            Self::Inner => "Inner system (like Venus/Earth)",
            Self::Outer => "Outer system (like Mars/Jupiter)",
            Self::Far => "Far orbit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Good,
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityNote {
    pub severity: Severity,
    pub topic: &'static str,
    pub message: String,
}

impl QualityNote {
    fn new(severity: Severity, topic: &'static str, message: impl Into<String>) -> Self {
        Self { severity, topic, message: message.into() }
    }
}

/// Overall verdict from the indicator counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    StrongCandidate,
    GoodCandidate,
    ModerateCandidate,
    Uncertain,
}

impl Assessment {
    fn from_counts(planet: u8, fp: u8) -> Self {
        if planet >= 5 && fp == 0 {
            Self::StrongCandidate
        } else if planet >= 3 && fp <= 1 {
            Self::GoodCandidate
        } else if planet >= 2 {
            Self::ModerateCandidate
        } else {
            Self::Uncertain
        }
    }

    /// Labels a model would plausibly assign.
    pub fn expected(self) -> Vec<Classification> {
        use Classification::{ConfirmedExoplanet, FalsePositive, PlanetaryCandidate};
        match self {
            Self::StrongCandidate => vec![ConfirmedExoplanet],
            Self::GoodCandidate => vec![ConfirmedExoplanet, PlanetaryCandidate],
            Self::ModerateCandidate => vec![PlanetaryCandidate],
            Self::Uncertain => vec![PlanetaryCandidate, FalsePositive],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// Earth radii, from depth and stellar mass
    pub planet_radius_estimate: f64,
    /// AU, Kepler's third law
    pub semi_major_axis_estimate: f64,
    pub equilibrium_temp_estimate: f64,
    /// Transit duration over period, both in days
    pub duration_ratio: f64,
    pub size_class: SizeClass,
    pub orbit_class: OrbitClass,
    pub notes: Vec<QualityNote>,
    pub planet_indicators: u8,
    pub planet_indicators_total: u8,
    pub false_positive_indicators: u8,
    pub false_positive_indicators_total: u8,
    pub assessment: Assessment,
    pub expected_classifications: Vec<Classification>,
    pub habitable_zone: bool,
    pub confirmation_score: u8,
}

fn count(flags: &[bool]) -> u8 {
    flags.iter().map(|&f| u8::from(f)).sum()
}

fn quality_notes(obs: &Observation, duration_ratio: f64) -> Vec<QualityNote> {
    let mut notes = Vec::new();

    if obs.snr < LOW_SNR {
        notes.push(QualityNote::new(
            Severity::Warning,
            "snr",
            format!("SNR ({:.1}) is below the typical threshold ({LOW_SNR}); needs confirmation", obs.snr),
        ));
    } else if obs.snr < GOOD_SNR {
        notes.push(QualityNote::new(Severity::Good, "snr", format!("SNR ({:.1}) is moderate", obs.snr)));
    } else {
        notes.push(QualityNote::new(Severity::Good, "snr", format!("SNR ({:.1}) is good", obs.snr)));
    }

    if obs.orbital_period > LONG_PERIOD_DAYS {
        notes.push(QualityNote::new(
            Severity::Info,
            "period",
            format!(
                "Long period ({:.1} days): fewer transits observed, harder to confirm",
                obs.orbital_period
            ),
        ));
    } else if obs.orbital_period < SHORT_PERIOD_DAYS {
        notes.push(QualityNote::new(
            Severity::Info,
            "period",
            format!("Very short period ({:.1} days): check for eclipsing binary", obs.orbital_period),
        ));
    }

    if obs.transit_depth > DEEP_TRANSIT {
        notes.push(QualityNote::new(
            Severity::Warning,
            "depth",
            format!(
                "Very deep transit ({:.2}%): large object, possibly an eclipsing binary",
                obs.transit_depth * 100.0
            ),
        ));
    } else if obs.transit_depth < SHALLOW_TRANSIT {
        notes.push(QualityNote::new(
            Severity::Warning,
            "depth",
            format!(
                "Very shallow transit ({:.4}%): small planet or noise, needs high SNR",
                obs.transit_depth * 100.0
            ),
        ));
    } else {
        notes.push(QualityNote::new(
            Severity::Good,
            "depth",
            format!("Transit depth ({:.3}%) is planet-like", obs.transit_depth * 100.0),
        ));
    }

    if duration_ratio > LONG_DURATION_RATIO {
        notes.push(QualityNote::new(
            Severity::Warning,
            "duration",
            "Transit is very long relative to the period: unusual geometry, check for false positive",
        ));
    } else if duration_ratio < SHORT_DURATION_RATIO {
        notes.push(QualityNote::new(
            Severity::Warning,
            "duration",
            "Transit is very short relative to the period: grazing or unusual geometry",
        ));
    }

    notes
}

/// Build the diagnostic report for one validated observation.
pub fn diagnose(obs: &Observation, rules: &ScoreRules) -> DiagnosticReport {
    let radius = physics::planet_radius_from_depth(obs.transit_depth, obs.stellar_mass);
    let axis = physics::kepler_semi_major_axis(obs.orbital_period, obs.stellar_mass);
    let teq = physics::planet_equilibrium_temperature(obs.stellar_temp, obs.stellar_mass, axis);
    let duration_ratio = physics::finite_or_zero(obs.transit_duration / 24.0 / physics::floored(obs.orbital_period));

    let planet_indicators = count(&[
        obs.transit_depth > SHALLOW_TRANSIT && obs.transit_depth < DEEP_TRANSIT,
        obs.snr > LOW_SNR && obs.snr < MAX_PLAUSIBLE_SNR,
        radius > MIN_PLANET_RADIUS && radius < MAX_PLANET_RADIUS,
        duration_ratio > SHORT_DURATION_RATIO && duration_ratio < PLANET_DURATION_RATIO_MAX,
        obs.stellar_temp > 3000.0 && obs.stellar_temp < 8000.0,
        obs.stellar_mass > 0.5 && obs.stellar_mass < 2.0,
    ]);
    let false_positive_indicators = count(&[
        obs.transit_depth > DEEP_TRANSIT,
        obs.snr < LOW_SNR,
        radius > MAX_PLANET_RADIUS,
        duration_ratio > LONG_DURATION_RATIO,
    ]);
    let assessment = Assessment::from_counts(planet_indicators, false_positive_indicators);

    let habitable_zone = (HZ_AXIS_AU.0 < axis && axis < HZ_AXIS_AU.1)
        && (HZ_PERIOD_DAYS.0 < obs.orbital_period && obs.orbital_period < HZ_PERIOD_DAYS.1);

    DiagnosticReport {
        planet_radius_estimate: radius,
        semi_major_axis_estimate: axis,
        equilibrium_temp_estimate: teq,
        duration_ratio,
        size_class: SizeClass::from_radius(radius),
        orbit_class: OrbitClass::from_axis(axis),
        notes: quality_notes(obs, duration_ratio),
        planet_indicators,
        planet_indicators_total: PLANET_INDICATORS,
        false_positive_indicators,
        false_positive_indicators_total: FP_INDICATORS,
        assessment,
        expected_classifications: assessment.expected(),
        habitable_zone,
        confirmation_score: confirmation_score(obs, rules),
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Derived properties:")?;
        writeln!(f, "  Planet radius:     {:.2} R_earth ({})", self.planet_radius_estimate, self.size_class.describe())?;
        writeln!(f, "  Semi-major axis:   {:.3} AU ({})", self.semi_major_axis_estimate, self.orbit_class.describe())?;
        writeln!(f, "  Equilibrium temp:  {:.0} K", self.equilibrium_temp_estimate)?;
        writeln!(f, "Detection quality:")?;
        for note in &self.notes {
            let mark = match note.severity {
                Severity::Good => "ok  ",
                Severity::Info => "info",
                Severity::Warning => "warn",
            };
            writeln!(f, "  [{mark}] {}", note.message)?;
        }
        writeln!(
            f,
            "Indicators: planet-like {}/{}, false positive {}/{}",
            self.planet_indicators,
            self.planet_indicators_total,
            self.false_positive_indicators,
            self.false_positive_indicators_total
        )?;
        let expected: Vec<&str> = self.expected_classifications.iter().map(|c| c.as_str()).collect();
        writeln!(f, "Assessment: {:?} (expected {})", self.assessment, expected.join(" or "))?;
        writeln!(f, "Confirmation score: {}/100", self.confirmation_score)?;
        if self.habitable_zone {
            writeln!(f, "Orbit lies in the habitable-zone window")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_period_giant_report() {
        let obs = Observation::new(289.9, 7.4, 0.00492, 12.0, 0.97, 5627.0, 11.7);
        let r = diagnose(&obs, &ScoreRules::default());
        assert_eq!(r.size_class, SizeClass::JupiterLike);
        assert_eq!(r.orbit_class, OrbitClass::Inner);
        assert!(r.habitable_zone);
        assert_eq!(r.false_positive_indicators, 0);
        assert_eq!(r.confirmation_score, 100);
        // duration ratio 7.4/24/289.9 ≈ 0.00106 misses the planet band
        assert_eq!(r.planet_indicators, 5);
        assert_eq!(r.assessment, Assessment::StrongCandidate);
        assert!(r.notes.iter().any(|n| n.topic == "period"));
    }

    #[test]
    fn test_eclipsing_binary_flags() {
        let obs = Observation::new(3.5, 20.0, 0.2, 5.0, 1.0, 5800.0, 12.0);
        let r = diagnose(&obs, &ScoreRules::default());
        assert!(r.false_positive_indicators >= 3, "{r:?}");
        assert_eq!(r.size_class, SizeClass::SuperJupiter);
        assert!(r.notes.iter().any(|n| n.topic == "depth" && n.severity == Severity::Warning));
        assert!(!r.habitable_zone);
    }

    #[test]
    fn test_size_and_orbit_bands() {
        assert_eq!(SizeClass::from_radius(0.3), SizeClass::SubEarth);
        assert_eq!(SizeClass::from_radius(1.0), SizeClass::EarthToSuperEarth);
        assert_eq!(SizeClass::from_radius(4.0), SizeClass::NeptuneLike);
        assert_eq!(SizeClass::from_radius(25.0), SizeClass::SuperJupiter);
        assert_eq!(OrbitClass::from_axis(0.05), OrbitClass::VeryClose);
        assert_eq!(OrbitClass::from_axis(10.0), OrbitClass::Far);
    }

    #[test]
    fn test_display_mentions_assessment() {
        let obs = Observation::new(10.0, 3.0, 0.001, 15.0, 1.0, 5700.0, 12.0);
        let text = diagnose(&obs, &ScoreRules::default()).to_string();
        assert!(text.contains("Assessment"));
        assert!(text.contains("Confirmation score"));
    }
}
