//! Transit observation input and class labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Required request fields, in feature order.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "orbital_period",
    "transit_duration",
    "transit_depth",
    "snr",
    "stellar_mass",
    "stellar_temp",
    "stellar_magnitude",
];

/// One transit detection to be scored.
///
/// Units: period in days, duration in hours, depth as a flux fraction,
/// mass in solar masses, temperature in Kelvin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub orbital_period: f64,
    pub transit_duration: f64,
    pub transit_depth: f64,
    pub snr: f64,
    pub stellar_mass: f64,
    pub stellar_temp: f64,
    pub stellar_magnitude: f64,
    /// Number of observed transits, if the pipeline that found it knows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_transits: Option<u32>,
}

impl Observation {
    /// Convenience constructor for the seven required fields.
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        orbital_period: f64,
        transit_duration: f64,
        transit_depth: f64,
        snr: f64,
        stellar_mass: f64,
        stellar_temp: f64,
        stellar_magnitude: f64,
    ) -> Self {
        Self {
            orbital_period,
            transit_duration,
            transit_depth,
            snr,
            stellar_mass,
            stellar_temp,
            stellar_magnitude,
            num_transits: None,
        }
    }

    /// Field values in `REQUIRED_FIELDS` order.
    pub const fn values(&self) -> [f64; 7] {
        [
            self.orbital_period,
            self.transit_duration,
            self.transit_depth,
            self.snr,
            self.stellar_mass,
            self.stellar_temp,
            self.stellar_magnitude,
        ]
    }
}

/// Ensemble output class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    ConfirmedExoplanet,
    PlanetaryCandidate,
    FalsePositive,
}

impl Classification {
    /// All classes in probability-vector order.
    pub const ALL: [Self; 3] = [
        Self::ConfirmedExoplanet,
        Self::PlanetaryCandidate,
        Self::FalsePositive,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::ConfirmedExoplanet => 0,
            Self::PlanetaryCandidate => 1,
            Self::FalsePositive => 2,
        }
    }

    /// Inverse of [`Classification::index`]; anything past 1 is a false positive.
    pub const fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::ConfirmedExoplanet,
            1 => Self::PlanetaryCandidate,
            _ => Self::FalsePositive,
        }
    }

    /// Confirmed planets and candidates get property estimates.
    pub const fn is_planet_like(self) -> bool {
        matches!(self, Self::ConfirmedExoplanet | Self::PlanetaryCandidate)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfirmedExoplanet => "confirmed_exoplanet",
            Self::PlanetaryCandidate => "planetary_candidate",
            Self::FalsePositive => "false_positive",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses our own labels plus the archive dispositions
/// (`CONFIRMED`, `CANDIDATE`, `FALSE POSITIVE`).
impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "confirmed_exoplanet" | "confirmed" | "cp" | "kp" => Ok(Self::ConfirmedExoplanet),
            "planetary_candidate" | "candidate" | "pc" => Ok(Self::PlanetaryCandidate),
            "false_positive" | "fp" => Ok(Self::FalsePositive),
            _ => Err(format!("unknown classification label: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_index_round_trip() {
        for class in Classification::ALL {
            assert_eq!(Classification::from_index(class.index()), class);
        }
    }

    #[test]
    fn test_archive_dispositions_parse() {
        assert_eq!("CONFIRMED".parse::<Classification>(), Ok(Classification::ConfirmedExoplanet));
        assert_eq!("FALSE POSITIVE".parse::<Classification>(), Ok(Classification::FalsePositive));
        assert_eq!("candidate".parse::<Classification>(), Ok(Classification::PlanetaryCandidate));
        assert!("rogue".parse::<Classification>().is_err());
    }

    #[test]
    fn test_observation_serde_skips_missing_transits() {
        let obs = Observation::new(10.0, 3.0, 0.01, 12.0, 1.0, 5800.0, 12.0);
        let v = serde_json::to_value(obs).expect("serialize");
        assert!(v.get("num_transits").is_none());
        assert_eq!(v["snr"], 12.0);
    }
}
