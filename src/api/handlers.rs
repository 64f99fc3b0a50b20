//! API route handlers
//!
//! Every scoring handler takes the raw JSON body as `Result<Json<Value>, _>`
//! so malformed bodies and missing fields both come back in the error
//! envelope instead of axum's plain-text rejections.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::artifacts::BundleMetadata;
use crate::diagnostics::{diagnose, DiagnosticReport};
use crate::features::{NamedFeature, FEATURE_NAMES};
use crate::pipeline::ScoringContext;
use crate::preprocessing::{coerce_observation, CleanedBatch, DroppedRow, ValidationError};
use crate::types::{
    ClassProbabilities, Classification, CorrectionRecord, Observation, PlanetProperties, PredictionResult,
};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub context: Arc<ScoringContext>,
    /// Upper bound on rows accepted by `/predict/batch`
    pub max_batch_rows: usize,
    pub started: Instant,
}

impl ApiState {
    pub fn new(context: Arc<ScoringContext>, max_batch_rows: usize) -> Self {
        Self {
            context,
            max_batch_rows,
            started: Instant::now(),
        }
    }
}

// ============================================================================
// Response bodies
// ============================================================================

/// Property values as the API reports them.
#[derive(Debug, Serialize)]
pub struct PropertyValues {
    pub planet_radius: f64,
    pub planet_temp: f64,
    pub semi_major_axis: f64,
    pub impact_parameter: f64,
    pub semi_major_axis_kepler: f64,
    pub semi_major_axis_learned: f64,
}

/// Spread of each property across regressor members.
#[derive(Debug, Serialize)]
pub struct PropertyUncertainties {
    pub planet_radius: f64,
    pub planet_temp: f64,
    pub semi_major_axis: f64,
    pub impact_parameter: f64,
}

/// Flattened [`PredictionResult`] for the wire.
#[derive(Debug, Serialize)]
pub struct PredictionBody {
    pub classification: Classification,
    pub confidence: f64,
    pub class_probabilities: ClassProbabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_uncertainties: Option<PropertyUncertainties>,
    pub uncertainty: f64,
    pub model_agreement: f64,
    pub correction_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionRecord>,
}

impl From<&PlanetProperties> for PropertyValues {
    fn from(p: &PlanetProperties) -> Self {
        Self {
            planet_radius: p.planet_radius.value,
            planet_temp: p.planet_temp.value,
            semi_major_axis: p.semi_major_axis.value,
            impact_parameter: p.impact_parameter.value,
            semi_major_axis_kepler: p.semi_major_axis_kepler,
            semi_major_axis_learned: p.semi_major_axis_learned.value,
        }
    }
}

impl From<&PlanetProperties> for PropertyUncertainties {
    fn from(p: &PlanetProperties) -> Self {
        Self {
            planet_radius: p.planet_radius.uncertainty,
            planet_temp: p.planet_temp.uncertainty,
            semi_major_axis: p.semi_major_axis.uncertainty,
            impact_parameter: p.impact_parameter.uncertainty,
        }
    }
}

impl From<&PredictionResult> for PredictionBody {
    fn from(r: &PredictionResult) -> Self {
        Self {
            classification: r.classification,
            confidence: r.confidence,
            class_probabilities: r.class_probabilities,
            properties: r.properties.as_ref().map(PropertyValues::from),
            property_uncertainties: r.properties.as_ref().map(PropertyUncertainties::from),
            uncertainty: r.uncertainty,
            model_agreement: r.model_agreement,
            correction_applied: r.correction_applied,
            confirmation_score: r.confirmation_score,
            correction: r.correction,
        }
    }
}

/// One row of a batch response: the prediction or the row's error.
#[derive(Debug, Serialize)]
pub struct BatchRow {
    pub index: usize,
    pub status: &'static str,
    #[serde(flatten)]
    pub prediction: Option<PredictionBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchRow {
    pub fn from_result(index: usize, row: &Result<PredictionResult, ValidationError>) -> Self {
        match row {
            Ok(result) => Self {
                index,
                status: "success",
                prediction: Some(PredictionBody::from(result)),
                error: None,
            },
            Err(e) => Self {
                index,
                status: "error",
                prediction: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// A row removed by batch cleaning before it reached the models.
    pub fn dropped(row: &DroppedRow) -> Self {
        Self {
            index: row.index,
            status: "error",
            prediction: None,
            error: Some(format!("Row dropped: {}", row.reason)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchBody {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchRow>,
}

impl BatchBody {
    pub fn from_rows(results: Vec<BatchRow>) -> Self {
        let failed = results.iter().filter(|r| r.error.is_some()).count();
        Self {
            total: results.len(),
            succeeded: results.len() - failed,
            failed,
            results,
        }
    }
}

/// Score the kept rows of a cleaned batch and report every dropped row in
/// place, so the output covers the whole input in index order.
pub fn cleaned_batch_rows(context: &ScoringContext, batch: &CleanedBatch) -> Vec<BatchRow> {
    let observations: Vec<Observation> = batch.rows.iter().map(|(_, obs)| *obs).collect();
    let mut rows: Vec<BatchRow> = batch
        .rows
        .iter()
        .zip(context.score_many(&observations))
        .map(|((index, _), result)| BatchRow::from_result(*index, &Ok(result)))
        .chain(batch.dropped.iter().map(BatchRow::dropped))
        .collect();
    rows.sort_by_key(|r| r.index);
    rows
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub model_loaded: bool,
    pub members: Vec<String>,
    pub uptime_secs: u64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub members: Vec<String>,
    /// Regressor member count per property
    pub regressors: BTreeMap<String, usize>,
    pub features: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BundleMetadata>,
}

#[derive(Debug, Serialize)]
pub struct DiagnoseBody {
    pub report: DiagnosticReport,
    pub features: Vec<NamedFeature>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Unwrap the JSON extractor result into a value or an error envelope.
fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, Response> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        debug!(error = %rejection.body_text(), "Rejected request body");
        ApiErrorResponse::from_rejection(&rejection)
    })
}

fn validation_failure(err: &ValidationError) -> Response {
    debug!(error = %err, "Observation rejected");
    ApiErrorResponse::from_validation(err)
}

/// GET / - service info and endpoint list
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "online",
        "endpoints": {
            "GET /": "service info",
            "GET /health": "liveness and model status",
            "GET /model": "loaded bundle metadata",
            "POST /predict": "classify one observation",
            "POST /analyze": "alias of /predict",
            "POST /predict/batch": "classify {\"observations\": [...]}",
            "POST /diagnose": "rule-based diagnostic report",
        },
        "required_fields": crate::types::REQUIRED_FIELDS,
    }))
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<HealthBody> {
    let members = state.context.member_names();
    Json(HealthBody {
        status: "healthy",
        model_loaded: !members.is_empty(),
        members,
        uptime_secs: state.started.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /model
pub async fn model_info(State(state): State<ApiState>) -> Response {
    let ctx = &state.context;
    ApiResponse::ok(ModelInfo {
        members: ctx.member_names(),
        regressors: ctx
            .regressor_counts()
            .into_iter()
            .map(|(p, n)| (p.as_str().to_string(), n))
            .collect(),
        features: FEATURE_NAMES.to_vec(),
        metadata: ctx.metadata().cloned(),
    })
}

/// POST /predict and POST /analyze
pub async fn predict(State(state): State<ApiState>, payload: Result<Json<Value>, JsonRejection>) -> Response {
    let body = match json_body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let obs = match coerce_observation(&body) {
        Ok(obs) => obs,
        Err(e) => return validation_failure(&e),
    };

    let result = state.context.score(&obs);
    info!(
        classification = %result.classification,
        confidence = result.confidence,
        corrected = result.correction_applied,
        "Prediction served"
    );
    ApiResponse::ok(PredictionBody::from(&result))
}

/// POST /predict/batch
pub async fn predict_batch(State(state): State<ApiState>, payload: Result<Json<Value>, JsonRejection>) -> Response {
    let mut body = match json_body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(Value::Array(records)) = body.get_mut("observations").map(Value::take) else {
        return ApiErrorResponse::bad_request(r#"Missing "observations" array in request"#);
    };
    if records.len() > state.max_batch_rows {
        warn!(rows = records.len(), limit = state.max_batch_rows, "Batch too large");
        return ApiErrorResponse::payload_too_large(format!(
            "Batch of {} observations exceeds the limit of {}",
            records.len(),
            state.max_batch_rows
        ));
    }

    // Rayon fan-out stays off the async workers.
    let ctx = Arc::clone(&state.context);
    let scored = match tokio::task::spawn_blocking(move || ctx.score_records(&records)).await {
        Ok(scored) => scored,
        Err(e) => {
            error!(error = %e, "Batch scoring task failed");
            return ApiErrorResponse::internal("Batch scoring failed");
        }
    };

    let results: Vec<BatchRow> = scored
        .iter()
        .enumerate()
        .map(|(index, row)| BatchRow::from_result(index, row))
        .collect();
    let body = BatchBody::from_rows(results);
    info!(total = body.total, failed = body.failed, "Batch served");
    ApiResponse::ok(body)
}

/// POST /diagnose
pub async fn diagnose_observation(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match coerce_observation(&body) {
        Ok(obs) => ApiResponse::ok(DiagnoseBody {
            report: diagnose(&obs, state.context.score_rules()),
            features: state.context.features(&obs).named(),
        }),
        Err(e) => validation_failure(&e),
    }
}

/// Fallback for unknown paths.
pub async fn not_found() -> Response {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(json!({"status": "error", "error": "Endpoint not found"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EstimateSource, PropertyEstimate};

    fn estimate(value: f64, uncertainty: f64) -> PropertyEstimate {
        PropertyEstimate {
            value,
            uncertainty,
            members: 2,
            source: EstimateSource::Learned,
        }
    }

    #[test]
    fn test_prediction_body_flattens_properties() {
        let result = PredictionResult {
            classification: Classification::ConfirmedExoplanet,
            confidence: 0.9,
            class_probabilities: ClassProbabilities::from_array([0.9, 0.08, 0.02]),
            uncertainty: 0.3,
            model_agreement: 1.0,
            properties: Some(PlanetProperties {
                planet_radius: estimate(7.6, 0.2),
                planet_temp: estimate(250.0, 10.0),
                semi_major_axis: estimate(0.85, 0.01),
                impact_parameter: estimate(0.4, 0.05),
                semi_major_axis_kepler: 0.85,
                semi_major_axis_learned: estimate(0.84, 0.02),
            }),
            correction_applied: false,
            confirmation_score: Some(75),
            correction: None,
        };
        let v = serde_json::to_value(PredictionBody::from(&result)).expect("serialize");
        assert_eq!(v["classification"], "confirmed_exoplanet");
        assert_eq!(v["properties"]["planet_radius"], 7.6);
        assert_eq!(v["properties"]["semi_major_axis_learned"], 0.84);
        assert_eq!(v["property_uncertainties"]["planet_temp"], 10.0);
        assert_eq!(v["confirmation_score"], 75);
        assert!(v.get("correction").is_none());
    }

    #[test]
    fn test_batch_row_tags_status() {
        let row = BatchRow::from_result(3, &Err(ValidationError::NotAnObject));
        let v = serde_json::to_value(row).expect("serialize");
        assert_eq!(
            v,
            json!({"status": "error", "index": 3, "error": "Observation must be a JSON object"})
        );
    }

    struct Uniform;

    impl crate::models::Classifier for Uniform {
        fn name(&self) -> &str {
            "uniform"
        }

        fn predict_proba(&self, _x: &[f64]) -> [f64; 3] {
            [0.5, 0.3, 0.2]
        }
    }

    #[test]
    fn test_cleaned_batch_reports_dropped_rows_in_place() {
        use crate::config::{CorrectionConfig, SemiMajorAxisSource};
        use crate::ensemble::{ClassificationEnsemble, PropertyRegressors};
        use crate::features::FeatureEngineer;
        use crate::preprocessing::{FeatureScaler, Preprocessor};

        let context = ScoringContext::new(
            FeatureEngineer::default(),
            FeatureScaler::identity(),
            ClassificationEnsemble::new(vec![Box::new(Uniform)]),
            PropertyRegressors::physics_only(SemiMajorAxisSource::Kepler),
            CorrectionConfig::default(),
        );
        let valid = json!({
            "orbital_period": 12.0, "transit_duration": 3.0, "transit_depth": 0.001, "snr": 11.0,
            "stellar_mass": 1.0, "stellar_temp": 5800.0, "stellar_magnitude": 12.0
        });
        let mut cold_star = valid.clone();
        cold_star["stellar_temp"] = json!(100.0);
        let records = vec![valid.clone(), json!({"snr": 3}), cold_star, valid];

        let batch = Preprocessor::default().clean_records(&records);
        let body = BatchBody::from_rows(cleaned_batch_rows(&context, &batch));

        assert_eq!(body.total, 4);
        assert_eq!(body.succeeded, 2);
        assert_eq!(body.failed, 2);
        let indices: Vec<usize> = body.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(body.results[1].status, "error");
        assert!(body.results[2]
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Row dropped")));
        assert!(body.results[3].prediction.is_some());
    }
}
