//! `/api/stock-prices` — paginated listing, distinct symbols, date range.

use crate::api::AppState;
use crate::error::ApiError;
use crate::models::{PriceRecord, SymbolSummary};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub symbol: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<PriceRecord>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct DateRangeResponse {
    pub symbol: String,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub data_points: i64,
}

/// `GET /api/stock-prices?symbol=&date_from=&date_to=&skip=&limit=`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let skip = query.skip.max(0);
    let symbol_upper = query.symbol.as_ref().map(|s| s.to_uppercase());

    let data = state.prices.find_page(
        symbol_upper.as_deref(),
        query.date_from,
        query.date_to,
        skip,
        limit,
    )?;
    let total =
        state
            .prices
            .count_by_filter(symbol_upper.as_deref(), query.date_from, query.date_to)?;

    Ok(Json(ListResponse { data, total }))
}

/// `GET /api/stock-prices/symbols`
pub async fn symbols(
    State(state): State<AppState>,
) -> Result<Json<Vec<SymbolSummary>>, ApiError> {
    Ok(Json(state.cache.get()?))
}

/// `GET /api/backtest/symbols/{symbol}/date-range`
pub async fn date_range(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<DateRangeResponse>, ApiError> {
    let symbol_upper = symbol.to_uppercase();
    let (min_date, max_date, data_points) = state
        .prices
        .date_range_for_symbol(&symbol_upper)?
        .ok_or_else(|| ApiError::NotFound(format!("no price data for symbol {symbol_upper}")))?;

    Ok(Json(DateRangeResponse {
        symbol: symbol_upper,
        min_date,
        max_date,
        data_points,
    }))
}
