//! Preprocessing
//!
//! Turns raw records into clean observations before feature engineering:
//!
//! - `validation`: JSON/CSV record coercion and request range checks
//! - artifact filter: drops physically nonsensical rows (stellar bands)
//! - robust outlier removal: modified z-score on MAD, log space for
//!   period, duration and depth
//! - `scaler`: log transform + median/IQR scaling fitted at training time
//!
//! Dropped rows are reported with a reason, never fatal to the batch.

mod scaler;
mod validation;

pub use scaler::{FeatureScaler, ScalerError};
pub use validation::{coerce_observation, validate_observation, ValidationError};

use serde::Serialize;
use serde_json::Value;
use statrs::statistics::{Data, OrderStatistics};
use tracing::debug;

use crate::config::defaults::{FEATURE_FLOOR, MODIFIED_Z_SCALE};
use crate::config::PreprocessingConfig;
use crate::types::{Observation, REQUIRED_FIELDS};

/// Robust statistics are meaningless on tiny batches.
const MIN_ROWS_FOR_OUTLIERS: usize = 10;

/// Detection-quality composite in (0, 1].
///
/// Starts at 1.0 and is multiplied down for weak signals:
/// - SNR below 7 → × 0.7
/// - depth below the 1/SNR noise floor → × 0.5
pub fn quality_score(obs: &Observation) -> f64 {
    let mut score = 1.0;
    if obs.snr < 7.0 {
        score *= 0.7;
    }
    if obs.snr > 0.0 && obs.transit_depth < 1.0 / obs.snr {
        score *= 0.5;
    }
    score
}

/// A row removed during cleaning.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedRow {
    pub index: usize,
    pub reason: String,
}

/// Result of cleaning a batch; `rows` keep their original index.
#[derive(Debug, Clone, Default)]
pub struct CleanedBatch {
    pub rows: Vec<(usize, Observation)>,
    pub dropped: Vec<DroppedRow>,
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessingConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    /// Reason a coerced row is physically nonsensical, if it is.
    pub fn artifact_reason(&self, obs: &Observation) -> Option<String> {
        let c = &self.config;
        if obs.orbital_period <= 0.0 {
            return Some(format!("non-positive orbital period {}", obs.orbital_period));
        }
        if obs.transit_duration <= 0.0 {
            return Some(format!("non-positive transit duration {}", obs.transit_duration));
        }
        if !(obs.transit_depth > 0.0 && obs.transit_depth < 1.0) {
            return Some(format!("transit depth {} outside (0, 1)", obs.transit_depth));
        }
        if !(obs.stellar_temp > c.min_stellar_temp_k && obs.stellar_temp < c.max_stellar_temp_k) {
            return Some(format!(
                "stellar temperature {} K outside ({}, {})",
                obs.stellar_temp, c.min_stellar_temp_k, c.max_stellar_temp_k
            ));
        }
        if !(obs.stellar_mass > c.min_stellar_mass && obs.stellar_mass < c.max_stellar_mass) {
            return Some(format!(
                "stellar mass {} outside ({}, {})",
                obs.stellar_mass, c.min_stellar_mass, c.max_stellar_mass
            ));
        }
        None
    }

    /// Coerce, artifact-filter and (if configured) outlier-filter a batch.
    pub fn clean_records(&self, records: &[Value]) -> CleanedBatch {
        let mut batch = CleanedBatch::default();
        for (index, record) in records.iter().enumerate() {
            match coerce_observation(record) {
                Ok(obs) => match self.artifact_reason(&obs) {
                    None => batch.rows.push((index, obs)),
                    Some(reason) => batch.dropped.push(DroppedRow { index, reason }),
                },
                Err(e) => batch.dropped.push(DroppedRow { index, reason: e.to_string() }),
            }
        }

        if self.config.remove_batch_outliers {
            let rows = std::mem::take(&mut batch.rows);
            let (kept, removed) = self.remove_outliers(rows, |(_, obs)| obs);
            batch.rows = kept;
            batch.dropped.extend(removed.into_iter().map(|((index, _), reason)| DroppedRow { index, reason }));
            batch.dropped.sort_by_key(|d| d.index);
        }

        debug!(kept = batch.rows.len(), dropped = batch.dropped.len(), "Batch cleaned");
        batch
    }

    /// Split `items` into inliers and outliers (with reason) by modified z-score.
    ///
    /// Period, duration and depth are scored in natural-log space. A field
    /// whose MAD is zero is skipped. Batches under ten rows pass untouched.
    pub fn remove_outliers<T, F>(&self, items: Vec<T>, obs_of: F) -> (Vec<T>, Vec<(T, String)>)
    where
        F: Fn(&T) -> &Observation,
    {
        if items.len() < MIN_ROWS_FOR_OUTLIERS {
            return (items, Vec::new());
        }

        let columns: Vec<Vec<f64>> = (0..REQUIRED_FIELDS.len())
            .map(|field| items.iter().map(|it| robust_value(obs_of(it), field)).collect())
            .collect();
        let centres: Vec<Option<(f64, f64)>> = columns.iter().map(|c| median_and_mad(c)).collect();

        let threshold = self.config.outlier_z_threshold;
        let mut kept = Vec::with_capacity(items.len());
        let mut removed = Vec::new();
        for (row, item) in items.into_iter().enumerate() {
            let worst = centres
                .iter()
                .enumerate()
                .filter_map(|(field, centre)| {
                    centre.map(|(median, mad)| (field, MODIFIED_Z_SCALE * (columns[field][row] - median) / mad))
                })
                .find(|(_, z)| z.abs() >= threshold);
            match worst {
                Some((field, z)) => {
                    removed.push((item, format!("outlier in {} (modified z = {z:.2})", REQUIRED_FIELDS[field])))
                }
                None => kept.push(item),
            }
        }
        (kept, removed)
    }
}

fn robust_value(obs: &Observation, field: usize) -> f64 {
    let x = obs.values()[field];
    match field {
        0..=2 => x.max(FEATURE_FLOOR).ln(),
        _ => x,
    }
}

fn median_and_mad(column: &[f64]) -> Option<(f64, f64)> {
    let median = Data::new(column.to_vec()).median();
    let deviations: Vec<f64> = column.iter().map(|x| (x - median).abs()).collect();
    let mad = Data::new(deviations).median();
    (mad.is_finite() && mad > 0.0).then_some((median, mad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(period: f64) -> Observation {
        Observation::new(period, 3.0, 0.01, 12.0, 1.0, 5800.0, 12.0)
    }

    #[test]
    fn test_quality_score_penalties() {
        let deep = Observation::new(10.0, 3.0, 0.2, 12.0, 1.0, 5800.0, 12.0);
        assert_eq!(quality_score(&deep), 1.0);
        let weak = Observation::new(10.0, 3.0, 0.5, 5.0, 1.0, 5800.0, 12.0);
        assert!((quality_score(&weak) - 0.7).abs() < 1e-12);
        assert!((quality_score(&obs(10.0)) - 0.5).abs() < 1e-12);
        let both = Observation::new(10.0, 3.0, 0.01, 5.0, 1.0, 5800.0, 12.0);
        assert!((quality_score(&both) - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_artifact_bands() {
        let p = Preprocessor::default();
        assert!(p.artifact_reason(&obs(10.0)).is_none());
        let hot = Observation::new(10.0, 3.0, 0.01, 12.0, 1.0, 60_000.0, 12.0);
        assert!(p.artifact_reason(&hot).is_some_and(|r| r.contains("temperature")));
        let light = Observation::new(10.0, 3.0, 0.01, 12.0, 0.05, 5800.0, 12.0);
        assert!(p.artifact_reason(&light).is_some_and(|r| r.contains("mass")));
        let flat = Observation::new(10.0, 3.0, 0.0, 12.0, 1.0, 5800.0, 12.0);
        assert!(p.artifact_reason(&flat).is_some());
    }

    #[test]
    fn test_clean_records_reports_drops_with_index() {
        let records = vec![
            json!({"orbital_period": 10, "transit_duration": 3, "transit_depth": 0.01, "snr": 12,
                   "stellar_mass": 1, "stellar_temp": 5800, "stellar_magnitude": 12}),
            json!({"orbital_period": "x"}),
            json!({"orbital_period": 10, "transit_duration": 3, "transit_depth": 0.01, "snr": 12,
                   "stellar_mass": 1, "stellar_temp": 90000, "stellar_magnitude": 12}),
        ];
        let batch = Preprocessor::default().clean_records(&records);
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].0, 0);
        let idx: Vec<usize> = batch.dropped.iter().map(|d| d.index).collect();
        assert_eq!(idx, vec![1, 2]);
    }

    #[test]
    fn test_outlier_removed_in_log_space() {
        let mut items: Vec<Observation> = (0..30).map(|i| obs(10.0 + f64::from(i) * 0.5)).collect();
        items.push(obs(1.0e6));
        let (kept, removed) = Preprocessor::default().remove_outliers(items, |o| o);
        assert_eq!(kept.len(), 30);
        assert_eq!(removed.len(), 1);
        assert!(removed[0].1.contains("orbital_period"));
    }

    #[test]
    fn test_small_batches_untouched() {
        let items = vec![obs(10.0), obs(1.0e6)];
        let (kept, removed) = Preprocessor::default().remove_outliers(items, |o| o);
        assert_eq!(kept.len(), 2);
        assert!(removed.is_empty());
    }
}
