//! API route definitions
//!
//! - `GET /` service info
//! - `GET /health` liveness and model status
//! - `GET /model` bundle metadata
//! - `POST /predict`, `POST /analyze` single observation
//! - `POST /predict/batch` many observations
//! - `POST /diagnose` rule-based report

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/model", get(handlers::model_info))
        .route("/predict", post(handlers::predict))
        .route("/analyze", post(handlers::predict))
        .route("/predict/batch", post(handlers::predict_batch))
        .route("/diagnose", post(handlers::diagnose_observation))
        .fallback(handlers::not_found)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrectionConfig, SemiMajorAxisSource};
    use crate::ensemble::{ClassificationEnsemble, PropertyRegressors};
    use crate::features::FeatureEngineer;
    use crate::models::Classifier;
    use crate::pipeline::ScoringContext;
    use crate::preprocessing::FeatureScaler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Even;

    impl Classifier for Even {
        fn name(&self) -> &str {
            "even"
        }
        fn predict_proba(&self, _x: &[f64]) -> [f64; 3] {
            [0.3, 0.4, 0.3]
        }
    }

    fn create_test_state() -> ApiState {
        let ctx = ScoringContext::new(
            FeatureEngineer::default(),
            FeatureScaler::identity(),
            ClassificationEnsemble::new(vec![Box::new(Even), Box::new(Even)]),
            PropertyRegressors::physics_only(SemiMajorAxisSource::Kepler),
            CorrectionConfig::default(),
        );
        ApiState::new(Arc::new(ctx), 10)
    }

    async fn get_status(uri: &str) -> StatusCode {
        let response = api_routes(create_test_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        response.status()
    }

    #[tokio::test]
    async fn test_api_routes_index() {
        assert_eq!(get_status("/").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_health() {
        assert_eq!(get_status("/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_model() {
        assert_eq!(get_status("/model").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        assert_eq!(get_status("/nope").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_predict_rejects_get() {
        assert_eq!(get_status("/predict").await, StatusCode::METHOD_NOT_ALLOWED);
    }
}
