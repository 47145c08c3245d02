//! Admin API errors as RFC 7807 problem responses.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::config::ValidationErrors;
use crate::net::DomainError;
use crate::policy::{PolicyError, PolicyStoreError};
use crate::routing::RollbackError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("{0}")]
    Certificate(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Certificate(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "One or more validation errors occurred.",
            ApiError::Certificate(_) => "Invalid certificate.",
            ApiError::BadRequest(_) => "Bad request.",
            ApiError::Unauthorized(_) => "Unauthorized.",
            ApiError::NotFound(_) => "Not found.",
            ApiError::Conflict(_) => "Conflict.",
            ApiError::Internal(_) => "Internal server error.",
        }
    }
}

#[derive(Debug, Serialize)]
struct Problem {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let title = self.title();

        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let detail = match self {
            ApiError::Validation(validation) => {
                let count = validation.len();
                for e in validation.into_errors() {
                    errors.entry(e.field).or_default().push(e.message);
                }
                format!("{} validation error(s)", count)
            }
            ApiError::Certificate(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(%detail, "admin request failed");
        }

        let problem = Problem {
            problem_type: "about:blank",
            title,
            status: status.as_u16(),
            detail,
            errors,
        };
        let mut response = (status, Json(problem)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"admin\""),
            );
        }
        response
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Certificate(e) => ApiError::Certificate(e.to_string()),
            DomainError::NotBound(host) => ApiError::NotFound(format!("no binding for host '{}'", host)),
        }
    }
}

impl From<RollbackError> for ApiError {
    fn from(err: RollbackError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl From<PolicyStoreError> for ApiError {
    fn from(err: PolicyStoreError) -> Self {
        ApiError::Internal(format!("policy store: {}", err))
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Validation(errors) => ApiError::Validation(errors),
            PolicyError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_lists_every_field() {
        let mut errors = ValidationErrors::new();
        errors.push("windowSeconds", "must be at least 1");
        errors.push("defaults.permitLimit", "must be non-negative");
        errors.push("windowSeconds", "must be an integer");

        let response = ApiError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/problem+json");

        let body = body_json(response).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["errors"]["windowSeconds"].as_array().unwrap().len(), 2);
        assert_eq!(body["errors"]["defaults.permitLimit"][0], "must be non-negative");
    }

    #[tokio::test]
    async fn test_rollback_conflict() {
        let response = ApiError::from(RollbackError::NothingToRollback).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["detail"], "nothing to rollback");
    }
}
