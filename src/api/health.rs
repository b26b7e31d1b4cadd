//! Liveness endpoints — `spec.md` §6.

use crate::api::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn health_db(State(state): State<AppState>) -> Json<Value> {
    match state.prices.count_by_filter(None, None, None) {
        Ok(count) => Json(json!({ "status": "ok", "price_records": count })),
        Err(err) => Json(json!({ "status": "error", "detail": err.to_string() })),
    }
}
