//! `/api/backtest` — single-symbol run, multi-strategy compare, portfolio.

use crate::api::AppState;
use crate::backtest::types::{
    BacktestRequest, BacktestResult, CompareRequest, PortfolioRequest, PortfolioResult,
};
use crate::backtest::{engine, portfolio};
use crate::error::ApiError;
use axum::extract::State;
use axum::Json;

/// `POST /api/backtest`
pub async fn run(
    State(state): State<AppState>,
    Json(request): Json<BacktestRequest>,
) -> Result<Json<BacktestResult>, ApiError> {
    let result = engine::run(&state.prices, &request)?;
    Ok(Json(result))
}

/// `POST /api/backtest/compare`
pub async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<Vec<BacktestResult>>, ApiError> {
    let results = engine::compare(&state.prices, &request)?;
    Ok(Json(results))
}

/// `POST /api/backtest/portfolio`
pub async fn run_portfolio(
    State(state): State<AppState>,
    Json(request): Json<PortfolioRequest>,
) -> Result<Json<PortfolioResult>, ApiError> {
    let result = portfolio::run(&state.prices, &request)?;
    Ok(Json(result))
}
