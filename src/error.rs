//! API error surface.
//!
//! Every axum handler returns `Result<_, ApiError>`. `ApiError` carries the
//! HTTP status code it maps to (`spec.md` §6/§7) and renders as
//! `{"detail": "..."}`, matching the wire contract.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    /// 400 — malformed request (e.g. non-CSV filename).
    BadRequest(String),
    /// 404 — entity missing (symbol, import).
    NotFound(String),
    /// 422 — semantic failure (bad dates, insufficient data, invalid
    /// strategy parameters, weights not summing to 1).
    Unprocessable(String),
    /// 500 — unhandled.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
