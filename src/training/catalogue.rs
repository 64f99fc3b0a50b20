//! Training catalogues: seeded synthetic generation and CSV loading.
//!
//! The synthetic catalogue draws class-conditional populations:
//!
//! - confirmed planets: log-normal period, SNR and radius; Gaussian host;
//!   duration from the transit chord at a uniform impact parameter
//! - candidates: the same physics with wider, noisier distributions and
//!   weaker signals
//! - false positives: eclipsing-binary-like depths, durations unrelated
//!   to the orbit, highly variable SNR
//!
//! Depth is `(Rp / 109.1)²` for planets (Earth radii over a solar radius),
//! so the radius target and the depth always agree.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use super::{LabeledObservation, PropertyTargets, TrainingError};
use crate::config::defaults::EARTH_RADII_PER_SOLAR_RADIUS;
use crate::config::TrainingConfig;
use crate::physics;
use crate::preprocessing::coerce_observation;
use crate::types::{Classification, Observation};

const MIN_PERIOD_DAYS: f64 = 0.5;
const MIN_DURATION_HOURS: f64 = 0.5;
const MIN_STELLAR_MASS: f64 = 0.15;
const STELLAR_TEMP_RANGE: (f64, f64) = (3000.0, 10_000.0);
const MAGNITUDE_RANGE: (f64, f64) = (8.0, 20.0);
const PLANET_DEPTH_RANGE: (f64, f64) = (1e-4, 0.1);
const FP_DEPTH_RANGE: (f64, f64) = (1e-4, 0.3);

fn lognormal(mu: f64, sigma: f64) -> Result<LogNormal<f64>, TrainingError> {
    LogNormal::new(mu, sigma).map_err(|e| TrainingError::Distribution(format!("lognormal({mu}, {sigma}): {e}")))
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>, TrainingError> {
    Normal::new(mean, std).map_err(|e| TrainingError::Distribution(format!("normal({mean}, {std}): {e}")))
}

/// Host star distributions shared by every class.
struct HostProfile {
    mass: Normal<f64>,
    temp: Normal<f64>,
    magnitude: Normal<f64>,
}

impl HostProfile {
    fn new(mass: (f64, f64), temp: (f64, f64), magnitude: (f64, f64)) -> Result<Self, TrainingError> {
        Ok(Self {
            mass: normal(mass.0, mass.1)?,
            temp: normal(temp.0, temp.1)?,
            magnitude: normal(magnitude.0, magnitude.1)?,
        })
    }

    fn sample(&self, rng: &mut StdRng) -> (f64, f64, f64) {
        (
            self.mass.sample(rng).max(MIN_STELLAR_MASS),
            self.temp.sample(rng).clamp(STELLAR_TEMP_RANGE.0, STELLAR_TEMP_RANGE.1),
            self.magnitude.sample(rng).clamp(MAGNITUDE_RANGE.0, MAGNITUDE_RANGE.1),
        )
    }
}

struct PlanetProfile {
    class: Classification,
    period: LogNormal<f64>,
    host: HostProfile,
    radius: LogNormal<f64>,
    max_impact: f64,
    duration_noise: LogNormal<f64>,
    snr: LogNormal<f64>,
    min_snr: f64,
}

impl PlanetProfile {
    fn confirmed() -> Result<Self, TrainingError> {
        Ok(Self {
            class: Classification::ConfirmedExoplanet,
            period: lognormal(2.5, 1.5)?,
            host: HostProfile::new((1.0, 0.3), (5500.0, 800.0), (14.0, 2.0))?,
            radius: lognormal(0.5, 0.8)?,
            max_impact: 0.9,
            duration_noise: lognormal(0.0, 0.15)?,
            snr: lognormal(2.5, 0.7)?,
            min_snr: 5.0,
        })
    }

    fn candidate() -> Result<Self, TrainingError> {
        Ok(Self {
            class: Classification::PlanetaryCandidate,
            period: lognormal(2.5, 1.8)?,
            host: HostProfile::new((1.0, 0.4), (5500.0, 1000.0), (15.0, 2.5))?,
            radius: lognormal(0.5, 1.0)?,
            max_impact: 0.95,
            duration_noise: lognormal(0.0, 0.3)?,
            snr: lognormal(1.8, 0.8)?,
            min_snr: 4.0,
        })
    }

    fn sample(&self, rng: &mut StdRng) -> LabeledObservation {
        let period = self.period.sample(rng).max(MIN_PERIOD_DAYS);
        let (mass, temp, magnitude) = self.host.sample(rng);

        let drawn_radius = self.radius.sample(rng);
        let depth = (drawn_radius / EARTH_RADII_PER_SOLAR_RADIUS)
            .powi(2)
            .clamp(PLANET_DEPTH_RANGE.0, PLANET_DEPTH_RANGE.1);
        let radius = depth.sqrt() * EARTH_RADII_PER_SOLAR_RADIUS;

        let impact = rng.gen_range(0.0..self.max_impact);
        let chord = physics::geometric_transit_duration(period, mass, depth.sqrt(), impact);
        let duration = (chord * self.duration_noise.sample(rng)).max(MIN_DURATION_HOURS);
        let snr = self.snr.sample(rng).max(self.min_snr);

        let axis = physics::kepler_semi_major_axis(period, mass);
        LabeledObservation {
            observation: Observation::new(period, duration, depth, snr, mass, temp, magnitude),
            class: self.class,
            targets: Some(PropertyTargets {
                planet_radius: radius,
                planet_temp: physics::planet_equilibrium_temperature(temp, mass, axis),
                semi_major_axis: axis,
                impact_parameter: impact,
            }),
        }
    }
}

struct FalsePositiveProfile {
    period: LogNormal<f64>,
    host: HostProfile,
    depth: LogNormal<f64>,
    duration: Normal<f64>,
    snr: LogNormal<f64>,
}

impl FalsePositiveProfile {
    fn new() -> Result<Self, TrainingError> {
        Ok(Self {
            period: lognormal(2.0, 2.0)?,
            host: HostProfile::new((1.0, 0.5), (5500.0, 1200.0), (15.5, 3.0))?,
            depth: lognormal(-4.0, 1.5)?,
            duration: normal(4.0, 2.0)?,
            snr: lognormal(1.5, 1.0)?,
        })
    }

    fn sample(&self, rng: &mut StdRng) -> LabeledObservation {
        let period = self.period.sample(rng).max(MIN_PERIOD_DAYS);
        let (mass, temp, magnitude) = self.host.sample(rng);
        let depth = self.depth.sample(rng).clamp(FP_DEPTH_RANGE.0, FP_DEPTH_RANGE.1);
        let duration = self.duration.sample(rng).max(MIN_DURATION_HOURS);
        let snr = self.snr.sample(rng).max(3.0);
        LabeledObservation {
            observation: Observation::new(period, duration, depth, snr, mass, temp, magnitude),
            class: Classification::FalsePositive,
            targets: None,
        }
    }
}

/// Deterministic synthetic catalogue for `config.seed`.
pub fn synthetic_catalogue(config: &TrainingConfig) -> Result<Vec<LabeledObservation>, TrainingError> {
    if config.catalogue_size == 0 {
        return Err(TrainingError::EmptyCatalogue);
    }
    let n = config.catalogue_size;
    let n_confirmed = (n as f64 * config.confirmed_fraction).round() as usize;
    let n_candidate = ((n as f64 * config.candidate_fraction).round() as usize).min(n - n_confirmed.min(n));
    let n_false = n.saturating_sub(n_confirmed + n_candidate);

    let confirmed = PlanetProfile::confirmed()?;
    let candidate = PlanetProfile::candidate()?;
    let false_positive = FalsePositiveProfile::new()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut rows = Vec::with_capacity(n);
    rows.extend((0..n_confirmed).map(|_| confirmed.sample(&mut rng)));
    rows.extend((0..n_candidate).map(|_| candidate.sample(&mut rng)));
    rows.extend((0..n_false).map(|_| false_positive.sample(&mut rng)));
    rows.shuffle(&mut rng);

    info!(
        rows = rows.len(),
        confirmed = n_confirmed,
        candidate = n_candidate,
        false_positive = n_false,
        seed = config.seed,
        "Generated synthetic catalogue"
    );
    Ok(rows)
}

// ============================================================================
// CSV
// ============================================================================

/// Split a CSV line respecting quoted fields (`""` is an escaped quote).
pub fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Header-keyed records from CSV text, with their 1-based line numbers.
///
/// Blank lines and `#` comment lines (as in archive exports) are skipped.
/// Column names are trimmed and lower-cased; empty cells become `null`.
pub fn csv_records(text: &str) -> Result<Vec<(usize, Map<String, Value>)>, TrainingError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

    let (_, header) = lines.next().ok_or(TrainingError::Csv {
        line: 1,
        reason: "missing header row".to_string(),
    })?;
    let columns: Vec<String> = csv_split(header).iter().map(|c| c.trim().to_lowercase()).collect();

    Ok(lines
        .map(|(line, row)| {
            let record = columns
                .iter()
                .zip(csv_split(row))
                .map(|(name, cell)| {
                    let cell = cell.trim();
                    let value = if cell.is_empty() { Value::Null } else { Value::String(cell.to_string()) };
                    (name.clone(), value)
                })
                .collect();
            (line, record)
        })
        .collect())
}

const LABEL_COLUMNS: [&str; 3] = ["classification", "disposition", "koi_disposition"];

fn cell_f64(record: &Map<String, Value>, column: &str) -> Option<f64> {
    record
        .get(column)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn row_targets(record: &Map<String, Value>) -> Option<PropertyTargets> {
    Some(PropertyTargets {
        planet_radius: cell_f64(record, "planet_radius")?,
        planet_temp: cell_f64(record, "planet_temp")?,
        semi_major_axis: cell_f64(record, "semi_major_axis")?,
        impact_parameter: cell_f64(record, "impact_parameter")?,
    })
}

/// Load a labelled catalogue from CSV.
///
/// Needs a label column (`classification`, `disposition` or
/// `koi_disposition`) plus the seven observation columns. Property targets
/// are read when all four columns are present on a planet-like row. Rows
/// that fail to parse are skipped with a warning.
pub fn load_csv_catalogue(path: &Path) -> Result<Vec<LabeledObservation>, TrainingError> {
    let text = std::fs::read_to_string(path).map_err(|source| TrainingError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in csv_records(&text)? {
        let label = LABEL_COLUMNS
            .iter()
            .find_map(|c| record.get(*c).and_then(Value::as_str))
            .ok_or_else(|| "missing classification".to_string())
            .and_then(str::parse::<Classification>);
        let class = match label {
            Ok(class) => class,
            Err(reason) => {
                warn!(line, reason = %reason, "Skipping catalogue row");
                skipped += 1;
                continue;
            }
        };

        let targets = if class.is_planet_like() { row_targets(&record) } else { None };
        match coerce_observation(&Value::Object(record)) {
            Ok(observation) => rows.push(LabeledObservation { observation, class, targets }),
            Err(e) => {
                warn!(line, error = %e, "Skipping catalogue row");
                skipped += 1;
            }
        }
    }

    info!(path = %path.display(), rows = rows.len(), skipped, "Loaded CSV catalogue");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn small_config(n: usize) -> TrainingConfig {
        TrainingConfig { catalogue_size: n, ..TrainingConfig::default() }
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let a = synthetic_catalogue(&small_config(200)).expect("catalogue");
        let b = synthetic_catalogue(&small_config(200)).expect("catalogue");
        assert_eq!(a, b);
        assert_eq!(a.len(), 200);
    }

    #[test]
    fn test_synthetic_class_mix() {
        let rows = synthetic_catalogue(&small_config(1000)).expect("catalogue");
        let count = |c: Classification| rows.iter().filter(|r| r.class == c).count();
        assert_eq!(count(Classification::ConfirmedExoplanet), 300);
        assert_eq!(count(Classification::PlanetaryCandidate), 350);
        assert_eq!(count(Classification::FalsePositive), 350);
    }

    #[test]
    fn test_planet_rows_are_physically_consistent() {
        let rows = synthetic_catalogue(&small_config(500)).expect("catalogue");
        for row in rows.iter().filter(|r| r.class.is_planet_like()) {
            let t = row.targets.expect("planet rows carry targets");
            let o = &row.observation;
            let depth_radius = o.transit_depth.sqrt() * EARTH_RADII_PER_SOLAR_RADIUS;
            assert!((t.planet_radius - depth_radius).abs() < 1e-9);
            assert!(o.transit_depth <= 0.1);
            assert!(o.transit_duration >= MIN_DURATION_HOURS);
            assert!((0.0..0.95).contains(&t.impact_parameter));
        }
        assert!(rows.iter().filter(|r| r.class == Classification::FalsePositive).all(|r| r.targets.is_none()));
    }

    #[test]
    fn test_empty_catalogue_rejected() {
        assert!(matches!(synthetic_catalogue(&small_config(0)), Err(TrainingError::EmptyCatalogue)));
    }

    #[test]
    fn test_csv_split_quotes() {
        assert_eq!(csv_split(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(csv_split(r#""say ""hi""",2"#), vec![r#"say "hi""#, "2"]);
    }

    #[test]
    fn test_csv_records_skip_comments() {
        let text = "# exported\nA,B\n\n1,\n";
        let records = csv_records(text).expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 4);
        assert_eq!(records[0].1["a"], Value::String("1".to_string()));
        assert_eq!(records[0].1["b"], Value::Null);
    }

    #[test]
    fn test_load_csv_catalogue_skips_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "classification,orbital_period,transit_duration,transit_depth,snr,stellar_mass,stellar_temp,stellar_magnitude,planet_radius,planet_temp,semi_major_axis,impact_parameter"
        )
        .expect("write");
        writeln!(file, "CONFIRMED,10,3,0.01,15,1,5800,12,10.9,900,0.09,0.3").expect("write");
        writeln!(file, "FALSE POSITIVE,2,5,0.2,9,1,5800,12,,,,").expect("write");
        writeln!(file, "CANDIDATE,abc,3,0.01,15,1,5800,12,,,,").expect("write");
        writeln!(file, "mystery,10,3,0.01,15,1,5800,12,,,,").expect("write");

        let rows = load_csv_catalogue(file.path()).expect("catalogue");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class, Classification::ConfirmedExoplanet);
        assert_eq!(rows[0].targets.map(|t| t.planet_radius), Some(10.9));
        assert!(rows[1].targets.is_none());
    }
}
