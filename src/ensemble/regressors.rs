//! Per-property regressor ensembles.
//!
//! Each property averages its members' finite predictions and reports the
//! sample standard deviation as its uncertainty. When no member produces a
//! finite value the closed-form physics prior stands in.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::SemiMajorAxisSource;
use crate::models::Regressor;
use crate::physics;
use crate::types::{EstimateSource, Observation, PlanetProperties, PropertyEstimate};

/// Regressed planet property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    PlanetRadius,
    PlanetTemp,
    SemiMajorAxis,
    ImpactParameter,
}

impl Property {
    pub const ALL: [Self; 4] = [
        Self::PlanetRadius,
        Self::PlanetTemp,
        Self::SemiMajorAxis,
        Self::ImpactParameter,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::PlanetRadius => 0,
            Self::PlanetTemp => 1,
            Self::SemiMajorAxis => 2,
            Self::ImpactParameter => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlanetRadius => "planet_radius",
            Self::PlanetTemp => "planet_temp",
            Self::SemiMajorAxis => "semi_major_axis",
            Self::ImpactParameter => "impact_parameter",
        }
    }

    /// Closed-form value used when the learned members give nothing usable.
    pub fn physics_prior(self, obs: &Observation) -> f64 {
        let kepler = physics::kepler_semi_major_axis(obs.orbital_period, obs.stellar_mass);
        match self {
            Self::PlanetRadius => physics::planet_radius_from_depth(obs.transit_depth, obs.stellar_mass),
            Self::PlanetTemp => physics::planet_equilibrium_temperature(obs.stellar_temp, obs.stellar_mass, kepler),
            Self::SemiMajorAxis => kepler,
            Self::ImpactParameter => physics::impact_prior(
                obs.transit_duration / physics::floored(obs.orbital_period),
                obs.transit_depth,
            ),
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Members predicting one property.
pub struct PropertyEnsemble {
    property: Property,
    members: Vec<Box<dyn Regressor>>,
}

impl PropertyEnsemble {
    pub fn new(property: Property, members: Vec<Box<dyn Regressor>>) -> Self {
        Self { property, members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Mean and sample std of the finite member outputs, or `prior`.
    pub fn estimate(&self, x: &[f64], prior: f64) -> PropertyEstimate {
        let finite: Vec<f64> = self
            .members
            .iter()
            .map(|m| m.predict(x))
            .filter(|v| v.is_finite())
            .collect();

        if finite.len() < self.members.len() {
            debug!(
                property = %self.property,
                excluded = self.members.len() - finite.len(),
                "Excluded non-finite regressor outputs"
            );
        }

        if finite.is_empty() {
            return PropertyEstimate {
                value: physics::finite_or_zero(prior),
                uncertainty: 0.0,
                members: 0,
                source: EstimateSource::Physics,
            };
        }

        let uncertainty = if finite.len() < 2 { 0.0 } else { finite.iter().std_dev() };
        PropertyEstimate {
            value: finite.iter().mean(),
            uncertainty: physics::finite_or_zero(uncertainty),
            members: finite.len(),
            source: EstimateSource::Learned,
        }
    }
}

/// The four property ensembles plus the semi-major axis reporting choice.
pub struct PropertyRegressors {
    ensembles: Vec<PropertyEnsemble>,
    sma_source: SemiMajorAxisSource,
}

impl std::fmt::Debug for PropertyRegressors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegressors")
            .field("members", &self.ensembles.iter().map(PropertyEnsemble::len).collect::<Vec<_>>())
            .field("sma_source", &self.sma_source)
            .finish()
    }
}

impl PropertyRegressors {
    /// `members` is indexed by [`Property::index`].
    pub fn new(members: [Vec<Box<dyn Regressor>>; 4], sma_source: SemiMajorAxisSource) -> Self {
        let ensembles = Property::ALL
            .into_iter()
            .zip(members)
            .map(|(p, m)| PropertyEnsemble::new(p, m))
            .collect();
        Self { ensembles, sma_source }
    }

    /// Ensembles with no members at all; every property falls back to physics.
    pub fn physics_only(sma_source: SemiMajorAxisSource) -> Self {
        Self::new(std::array::from_fn(|_| Vec::new()), sma_source)
    }

    pub fn member_counts(&self) -> Vec<(Property, usize)> {
        self.ensembles.iter().map(|e| (e.property, e.len())).collect()
    }

    pub fn estimate(&self, obs: &Observation, x: &[f64]) -> PlanetProperties {
        let est = |p: Property| self.ensembles[p.index()].estimate(x, p.physics_prior(obs));

        let kepler = Property::SemiMajorAxis.physics_prior(obs);
        let learned = est(Property::SemiMajorAxis);
        let semi_major_axis = match self.sma_source {
            SemiMajorAxisSource::Learned => learned,
            SemiMajorAxisSource::Kepler => PropertyEstimate {
                value: kepler,
                uncertainty: match learned.source {
                    EstimateSource::Learned => (kepler - learned.value).abs(),
                    EstimateSource::Physics => 0.0,
                },
                members: learned.members,
                source: EstimateSource::Physics,
            },
        };

        PlanetProperties {
            planet_radius: est(Property::PlanetRadius),
            planet_temp: est(Property::PlanetTemp),
            semi_major_axis,
            impact_parameter: est(Property::ImpactParameter),
            semi_major_axis_kepler: kepler,
            semi_major_axis_learned: learned,
        }
    }
}
