//! `/api/v1` response envelope.
//!
//! Success: `{"data": T, "meta": {...}}`. Failure:
//! `{"error": {"code", "message"}, "meta": {...}}`. Handlers return
//! `Result<Envelope<T>, ApiError>` and both sides render themselves.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::StorageError;

const API_VERSION: &str = "1";

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

impl Meta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: API_VERSION,
        }
    }
}

/// Successful payload wrapper.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    pub meta: Meta,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Meta::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Handler failures.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    meta: Meta,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
            Self::Storage(e) => {
                tracing::warn!(error = %e, "Store query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
        };
        let body = ErrorBody {
            error: ErrorDetail { code, message },
            meta: Meta::now(),
        };
        (status, Json(body)).into_response()
    }
}
