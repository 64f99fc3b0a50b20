//! Soft-voting ensemble over heterogeneous classifiers.
//!
//! The ensemble distribution is the unweighted mean of the member vectors,
//! renormalised. Each member's vector is sanitised first so a single broken
//! member cannot push NaN into the result.

pub mod regressors;

use serde::Serialize;
use tracing::warn;

use crate::models::Classifier;
use crate::types::{ClassProbabilities, Classification};

pub use regressors::{Property, PropertyEnsemble, PropertyRegressors};

/// One member's opinion, kept for agreement and for the `/model` detail.
#[derive(Debug, Clone, Serialize)]
pub struct MemberVote {
    pub member: String,
    pub classification: Classification,
    pub probabilities: ClassProbabilities,
}

/// Combined output of one ensemble evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleOutput {
    pub probabilities: ClassProbabilities,
    pub votes: Vec<MemberVote>,
}

impl EnsembleOutput {
    pub fn classification(&self) -> Classification {
        self.probabilities.argmax()
    }

    /// Fraction of members whose own arg-max equals `label`.
    pub fn agreement_with(&self, label: Classification) -> f64 {
        if self.votes.is_empty() {
            return 0.0;
        }
        let agreeing = self.votes.iter().filter(|v| v.classification == label).count();
        agreeing as f64 / self.votes.len() as f64
    }

    /// Agreement with the ensemble's own label.
    pub fn agreement(&self) -> f64 {
        self.agreement_with(self.classification())
    }

    pub fn uncertainty(&self) -> f64 {
        self.probabilities.normalized_entropy()
    }
}

pub struct ClassificationEnsemble {
    members: Vec<Box<dyn Classifier>>,
}

impl std::fmt::Debug for ClassificationEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationEnsemble")
            .field("members", &self.member_names())
            .finish()
    }
}

impl ClassificationEnsemble {
    pub fn new(members: Vec<Box<dyn Classifier>>) -> Self {
        if members.len() < 2 {
            warn!(
                members = members.len(),
                "Classification ensemble has fewer than two members, accuracy will be degraded"
            );
        }
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name().to_string()).collect()
    }

    /// Soft vote over all members for one scaled feature row.
    pub fn predict(&self, x: &[f64]) -> EnsembleOutput {
        let mut sum = [0.0; 3];
        let votes: Vec<MemberVote> = self
            .members
            .iter()
            .map(|m| {
                let p = ClassProbabilities::from_array(m.predict_proba(x));
                for (s, v) in sum.iter_mut().zip(p.as_array()) {
                    *s += v;
                }
                MemberVote {
                    member: m.name().to_string(),
                    classification: p.argmax(),
                    probabilities: p,
                }
            })
            .collect();

        let n = votes.len().max(1) as f64;
        EnsembleOutput {
            probabilities: ClassProbabilities::from_array(sum.map(|s| s / n)),
            votes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, [f64; 3]);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn predict_proba(&self, _x: &[f64]) -> [f64; 3] {
            self.1
        }
    }

    fn ensemble(members: Vec<[f64; 3]>) -> ClassificationEnsemble {
        ClassificationEnsemble::new(
            members
                .into_iter()
                .map(|p| Box::new(Fixed("fixed", p)) as Box<dyn Classifier>)
                .collect(),
        )
    }

    #[test]
    fn test_soft_vote_is_member_mean() {
        let e = ensemble(vec![[0.6, 0.3, 0.1], [0.2, 0.5, 0.3], [0.7, 0.2, 0.1], [0.5, 0.4, 0.1]]);
        let out = e.predict(&[]);
        assert!((out.probabilities.confirmed_exoplanet - 0.5).abs() < 1e-12);
        assert!((out.probabilities.planetary_candidate - 0.35).abs() < 1e-12);
        assert_eq!(out.classification(), Classification::ConfirmedExoplanet);
        assert!((out.agreement() - 0.75).abs() < 1e-12);
        let total: f64 = out.probabilities.as_array().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_broken_member_is_sanitised() {
        let e = ensemble(vec![[f64::NAN, f64::NAN, f64::NAN], [0.0, 0.0, 1.0]]);
        let out = e.predict(&[]);
        assert!(out.probabilities.as_array().iter().all(|p| p.is_finite()));
        assert_eq!(out.classification(), Classification::FalsePositive);
    }

    #[test]
    fn test_single_member_still_predicts() {
        let e = ensemble(vec![[0.1, 0.8, 0.1]]);
        let out = e.predict(&[]);
        assert_eq!(out.classification(), Classification::PlanetaryCandidate);
        assert_eq!(out.agreement(), 1.0);
        assert_eq!(out.agreement_with(Classification::ConfirmedExoplanet), 0.0);
    }

    #[test]
    fn test_uncertainty_is_normalised_entropy() {
        let e = ensemble(vec![[1.0, 1.0, 1.0]]);
        assert!((e.predict(&[]).uncertainty() - 1.0).abs() < 1e-9);
    }
}
