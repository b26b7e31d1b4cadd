//! HTTP surface — `spec.md` §6. Thin handlers: parse, delegate to a
//! component, map the result to a response or an [`crate::error::ApiError`].

pub mod backtest;
pub mod health;
pub mod imports;
pub mod stock_prices;

use crate::ingestion::IngestionPipeline;
use crate::store::{ImportRegistry, PriceStore};
use crate::symbol_cache::SymbolIndexCache;
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub prices: PriceStore,
    pub imports: ImportRegistry,
    pub cache: SymbolIndexCache,
    pub ingestion: Arc<IngestionPipeline>,
}
