//! Response envelope shared by every endpoint.
//!
//! Success bodies carry `"status": "success"` next to the payload fields;
//! errors carry `"status": "error"` and a human-readable `error` string.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::preprocessing::ValidationError;

/// Successful response: `{ "status": "success", ...data }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        let body = Self { status: "success", data };
        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

/// Error response: `{ "status": "error", "error": "...", "required_fields": [...]? }`
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub status: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_fields: Option<Vec<&'static str>>,
}

impl ApiErrorResponse {
    fn build(status: StatusCode, msg: impl Into<String>, required_fields: Option<Vec<&'static str>>) -> Response {
        let body = Self {
            status: "error",
            error: msg.into(),
            required_fields,
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, msg, None)
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::PAYLOAD_TOO_LARGE, msg, None)
    }

    pub fn internal(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, msg, None)
    }

    /// 400 with the required field list when fields are missing.
    pub fn from_validation(err: &ValidationError) -> Response {
        Self::build(StatusCode::BAD_REQUEST, err.to_string(), err.required_fields())
    }

    /// Map an axum JSON extractor failure into the envelope.
    ///
    /// Body-limit rejections keep their 413; everything else is a 400.
    pub fn from_rejection(rejection: &JsonRejection) -> Response {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::payload_too_large("Request body too large");
        }
        Self::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn test_ok_response_is_flat() {
        let resp = ApiResponse::ok(serde_json::json!({"classification": "false_positive"}));
        assert_eq!(resp.status(), StatusCode::OK);

        let v = body_json(resp).await;
        assert_eq!(v["status"], "success");
        assert_eq!(v["classification"], "false_positive");
    }

    #[tokio::test]
    async fn test_missing_fields_lists_required() {
        let err = ValidationError::MissingFields(vec!["snr".to_string()]);
        let resp = ApiErrorResponse::from_validation(&err);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let v = body_json(resp).await;
        assert_eq!(v["status"], "error");
        assert_eq!(v["error"], "Missing required fields: snr");
        assert_eq!(v["required_fields"].as_array().map(Vec::len), Some(7));
    }

    #[tokio::test]
    async fn test_plain_error_has_no_field_list() {
        let v = body_json(ApiErrorResponse::bad_request("nope")).await;
        assert_eq!(v["error"], "nope");
        assert!(v.get("required_fields").is_none());
    }
}
