//! Error types for CareWatch.
//!
//! Domain failures are typed with `thiserror`; storage and start-up code use
//! `anyhow`. [`ApiError`] turns either into an HTTP response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::model::OutbreakStatus;

/// Rejections raised before any scoring begins.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// A submitted field failed validation. `field` is the path of the
    /// offending value, for example `symptoms[1].severity`.
    #[error("invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },
}

impl AnalysisError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of the surveillance subsystem.
#[derive(Debug, Error)]
pub enum SurveillanceError {
    /// A detection parameter was out of range.
    #[error("invalid detection parameter '{field}': {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// The storage layer failed. The operation produced no result and may be retried.
    #[error("storage unavailable: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("outbreak {0} not found")]
    OutbreakNotFound(i64),

    #[error("cannot move outbreak from '{from}' to '{to}'")]
    InvalidTransition {
        from: OutbreakStatus,
        to: OutbreakStatus,
    },
}

impl SurveillanceError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SurveillanceError::Storage(_))
    }
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Surveillance(#[from] SurveillanceError),

    #[error("{0} not found")]
    NotFound(String),

    /// The request body could not be read into the expected shape. `field`
    /// is the path of the offending value when one is known.
    #[error("invalid request: {reason}")]
    BadRequest {
        field: Option<String>,
        reason: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, field, retryable) = match &self {
            ApiError::Analysis(AnalysisError::InvalidInput { field, .. }) => {
                (StatusCode::BAD_REQUEST, Some(field.clone()), false)
            }
            ApiError::Surveillance(SurveillanceError::InvalidParameter { field, .. }) => {
                (StatusCode::BAD_REQUEST, Some(field.to_string()), false)
            }
            ApiError::Surveillance(SurveillanceError::Storage(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, None, true)
            }
            ApiError::Surveillance(SurveillanceError::OutbreakNotFound(_)) | ApiError::NotFound(_) => {
                (StatusCode::NOT_FOUND, None, false)
            }
            ApiError::Surveillance(SurveillanceError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, None, false)
            }
            ApiError::BadRequest { field, .. } => (StatusCode::BAD_REQUEST, field.clone(), false),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None, false),
        };

        let body = ErrorBody {
            error: self.to_string(),
            field,
            retryable,
        };

        (status, Json(body)).into_response()
    }
}
