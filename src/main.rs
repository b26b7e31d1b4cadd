//! Stock price ingestion and backtesting API server.

use anyhow::{Context, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockbacktest_backend::api::{self, AppState};
use stockbacktest_backend::config::Config;
use stockbacktest_backend::ingestion::IngestionPipeline;
use stockbacktest_backend::middleware;
use stockbacktest_backend::store::{Db, ImportRegistry, PriceStore};
use stockbacktest_backend::symbol_cache::SymbolIndexCache;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockbacktest_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    if dotenv().is_err() {
        // No .env file present; environment variables alone are fine.
    }
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("starting stock price ingestion and backtesting API");

    let config = Config::from_env();

    let db = Db::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path))?;

    let prices = PriceStore::new(db.clone());
    let imports = ImportRegistry::new(db.clone());
    let cache = SymbolIndexCache::new(prices.clone());
    let ingestion = Arc::new(IngestionPipeline::new(
        prices.clone(),
        imports.clone(),
        cache.clone(),
        config.csv_chunk_size,
    ));

    let (orphan_imports, swept_prices) = imports
        .recover_at_startup(&prices)
        .context("startup recovery failed")?;
    if orphan_imports > 0 || swept_prices > 0 {
        info!(
            orphan_imports,
            swept_prices, "recovered from an unclean shutdown"
        );
    }

    let state = AppState {
        prices,
        imports,
        cache,
        ingestion,
    };

    let app = Router::new()
        .route("/health", get(api::health::health))
        .route("/health/db", get(api::health::health_db))
        .route("/api/imports/upload", post(api::imports::upload))
        .route("/api/imports", get(api::imports::list))
        .route("/api/imports/:id/status", get(api::imports::status))
        .route("/api/imports/:id", delete(api::imports::delete))
        .route("/api/stock-prices", get(api::stock_prices::list))
        .route("/api/stock-prices/symbols", get(api::stock_prices::symbols))
        .route(
            "/api/backtest/symbols/:symbol/date-range",
            get(api::stock_prices::date_range),
        )
        .route("/api/backtest", post(api::backtest::run))
        .route("/api/backtest/compare", post(api::backtest::compare))
        .route("/api/backtest/portfolio", post(api::backtest::run_portfolio))
        .with_state(state)
        .layer(build_cors(&config.allowed_origins))
        .layer(axum::middleware::from_fn(
            middleware::request_logging_simple,
        ));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
