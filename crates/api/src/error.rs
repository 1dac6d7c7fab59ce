//! API error types with HTTP response mapping.
//!
//! Every error is rendered as `application/problem+json`.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use domain::{ValidationError, Violation};
use orchestrator::ServiceError;
use order_store::StoreError;
use serde_json::json;

pub const PROBLEM_JSON: &str = "application/problem+json";

const CONSTRAINT_VIOLATION_TYPE: &str = "https://zalando.github.io/problem/constraint-violation";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request was rejected before reaching the service.
    Validation(Vec<Violation>),
    /// The command service failed.
    Service(ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(violations) => constraint_violation(violations),
            ApiError::Service(ServiceError::Validation(err)) => {
                constraint_violation(err.into_violations())
            }
            ApiError::Service(err) => service_error_to_response(err),
        }
    }
}

fn constraint_violation(violations: Vec<Violation>) -> Response {
    let body = json!({
        "type": CONSTRAINT_VIOLATION_TYPE,
        "title": "Constraint Violation",
        "status": StatusCode::BAD_REQUEST.as_u16(),
        "violations": violations,
    });
    problem(StatusCode::BAD_REQUEST, body)
}

fn service_error_to_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::Persistence(StoreError::ConcurrencyConflict { .. }) => StatusCode::CONFLICT,
        ServiceError::Persistence(store) if store.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::warn!(error = %err, "request rejected");
    }

    let body = json!({
        "title": status.canonical_reason().unwrap_or("Error"),
        "status": status.as_u16(),
        "detail": err.to_string(),
    });
    problem(status, body)
}

fn problem(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, PROBLEM_JSON)],
        body.to_string(),
    )
        .into_response()
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.into_violations())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(vec![Violation::new("body", rejection.body_text())])
    }
}
