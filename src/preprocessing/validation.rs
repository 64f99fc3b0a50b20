//! Record coercion and request-level range validation.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{Observation, REQUIRED_FIELDS};

/// Why a raw record could not become an [`Observation`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Observation must be a JSON object")]
    NotAnObject,

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Field '{field}' must be numeric (got {value})")]
    NotNumeric { field: String, value: String },

    #[error("Field '{field}' must be finite (got {value})")]
    NotFinite { field: String, value: f64 },

    #[error("Field '{field}' out of range: {value} ({rule})")]
    OutOfRange {
        field: String,
        value: f64,
        rule: &'static str,
    },
}

impl ValidationError {
    /// Field names the client must supply, for the missing-field response.
    pub fn required_fields(&self) -> Option<Vec<&'static str>> {
        matches!(self, Self::MissingFields(_)).then(|| REQUIRED_FIELDS.to_vec())
    }
}

/// Coerce a JSON object into a validated observation.
///
/// Numbers may arrive as JSON numbers or numeric strings (CSV rows are fed
/// through here as string maps).
pub fn coerce_observation(value: &Value) -> Result<Observation, ValidationError> {
    let map = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| map.get(**f).map_or(true, Value::is_null))
        .map(|f| (*f).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let mut v = [0.0; 7];
    for (slot, field) in v.iter_mut().zip(REQUIRED_FIELDS) {
        *slot = numeric_field(map, field)?;
    }

    let num_transits = match map.get("num_transits") {
        None | Some(Value::Null) => None,
        Some(_) => {
            let n = numeric_field(map, "num_transits")?;
            if n < 1.0 || n.fract() != 0.0 || n > f64::from(u32::MAX) {
                return Err(ValidationError::OutOfRange {
                    field: "num_transits".to_string(),
                    value: n,
                    rule: "must be a positive integer",
                });
            }
            Some(n as u32)
        }
    };

    let obs = Observation {
        num_transits,
        ..Observation::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6])
    };
    validate_observation(&obs)?;
    Ok(obs)
}

fn numeric_field(map: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    let raw = map.get(field).unwrap_or(&Value::Null);
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let x = parsed.ok_or_else(|| ValidationError::NotNumeric {
        field: field.to_string(),
        value: raw.to_string(),
    })?;
    if !x.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
            value: x,
        });
    }
    Ok(x)
}

/// Physical range checks applied to every request.
pub fn validate_observation(obs: &Observation) -> Result<(), ValidationError> {
    for (field, value) in REQUIRED_FIELDS.iter().zip(obs.values()) {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                field: (*field).to_string(),
                value,
            });
        }
    }

    let positive = [
        ("orbital_period", obs.orbital_period),
        ("transit_duration", obs.transit_duration),
        ("snr", obs.snr),
        ("stellar_mass", obs.stellar_mass),
        ("stellar_temp", obs.stellar_temp),
    ];
    for (field, value) in positive {
        if value <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                value,
                rule: "must be > 0",
            });
        }
    }

    if !(0.0..=1.0).contains(&obs.transit_depth) {
        return Err(ValidationError::OutOfRange {
            field: "transit_depth".to_string(),
            value: obs.transit_depth,
            rule: "must be within [0, 1]",
        });
    }

    Ok(())
}
