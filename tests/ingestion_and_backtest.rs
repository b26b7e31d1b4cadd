//! End-to-end coverage across the Import Registry, Ingestion Pipeline,
//! Price Store, and Backtest Engine, wired together the way the HTTP
//! handlers do it but without going through axum.

use chrono::NaiveDate;
use stockbacktest_backend::backtest::types::{BacktestRequest, StrategyRequest};
use stockbacktest_backend::backtest::engine;
use stockbacktest_backend::ingestion::IngestionPipeline;
use stockbacktest_backend::models::{ImportStatus, PriceRecord};
use stockbacktest_backend::store::{Db, ImportRegistry, PriceStore};
use stockbacktest_backend::symbol_cache::SymbolIndexCache;

fn open_db(dir: &tempfile::TempDir) -> Db {
    Db::open(dir.path().join("test.db")).expect("open db")
}

#[test]
fn ingest_then_delete_cascades_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let prices = PriceStore::new(db.clone());
    let imports = ImportRegistry::new(db.clone());
    let cache = SymbolIndexCache::new(prices.clone());
    let pipeline = IngestionPipeline::new(prices.clone(), imports.clone(), cache.clone(), 3);

    let fixture = std::fs::read("tests/fixtures/sample_prices.csv").unwrap();
    let staged = stockbacktest_backend::ingestion::stage_temp_file(&fixture).unwrap();
    let import_id = imports.create("sample_prices.csv").unwrap();

    pipeline.run(&staged, &import_id);

    let record = imports.get(&import_id).unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Completed);
    assert_eq!(record.processed_rows, 10);
    assert_eq!(record.symbols_count, 2);
    assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 10);
    assert_eq!(cache.get().unwrap().len(), 2);

    // staged file is removed once ingestion finishes, successfully or not
    assert!(!staged.exists());

    // cascade delete: mark deleting, then do what the background task does
    imports.mark_deleting(&import_id).unwrap();
    prices.delete_by_import(&import_id).unwrap();
    imports.delete(&import_id).unwrap();
    cache.invalidate();

    assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 0);
    assert!(imports.get(&import_id).unwrap().is_none());
    assert!(cache.get().unwrap().is_empty());
}

#[test]
fn reupload_after_delete_is_independent() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let prices = PriceStore::new(db.clone());
    let imports = ImportRegistry::new(db.clone());
    let cache = SymbolIndexCache::new(prices.clone());
    let pipeline = IngestionPipeline::new(prices.clone(), imports.clone(), cache.clone(), 100);

    let fixture = std::fs::read("tests/fixtures/sample_prices.csv").unwrap();

    let staged_first = stockbacktest_backend::ingestion::stage_temp_file(&fixture).unwrap();
    let first_id = imports.create("sample_prices.csv").unwrap();
    pipeline.run(&staged_first, &first_id);
    assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 10);

    prices.delete_by_import(&first_id).unwrap();
    imports.delete(&first_id).unwrap();

    let staged_second = stockbacktest_backend::ingestion::stage_temp_file(&fixture).unwrap();
    let second_id = imports.create("sample_prices.csv").unwrap();
    pipeline.run(&staged_second, &second_id);

    let record = imports.get(&second_id).unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Completed);
    assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 10);
}

#[test]
fn crash_recovery_removes_orphaned_import_and_its_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let prices = PriceStore::new(db.clone());
    let imports = ImportRegistry::new(db.clone());

    let stuck_id = imports.create("stuck.csv").unwrap();
    imports
        .set_status(&stuck_id, ImportStatus::Processing)
        .unwrap();
    prices
        .insert_many(&[PriceRecord {
            symbol: "ACME".into(),
            security_name: "Acme Corp".into(),
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            open: 10.0,
            high: 10.0,
            low: 10.0,
            close: 10.0,
            adj_close: 10.0,
            volume: 100,
            import_id: stuck_id.clone(),
        }])
        .unwrap();

    let (orphan_imports, swept_prices) = imports.recover_at_startup(&prices).unwrap();
    assert_eq!(orphan_imports, 1);
    assert_eq!(swept_prices, 0);
    assert!(imports.get(&stuck_id).unwrap().is_none());
    assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 0);
}

#[test]
fn buy_and_hold_backtest_against_ingested_data() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let prices = PriceStore::new(db.clone());
    let imports = ImportRegistry::new(db.clone());
    let cache = SymbolIndexCache::new(prices.clone());
    let pipeline = IngestionPipeline::new(prices.clone(), imports.clone(), cache, 1000);

    let fixture = std::fs::read("tests/fixtures/sample_prices.csv").unwrap();
    let staged = stockbacktest_backend::ingestion::stage_temp_file(&fixture).unwrap();
    let import_id = imports.create("sample_prices.csv").unwrap();
    pipeline.run(&staged, &import_id);

    let request = BacktestRequest {
        symbol: "acme".to_string(),
        date_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        date_to: NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(),
        initial_capital: 1_000.0,
        strategy: StrategyRequest::BuyAndHold,
    };

    let result = engine::run(&prices, &request).unwrap();
    assert_eq!(result.symbol, "ACME");
    assert_eq!(result.trades.len(), 1);
    // 10.20 -> 13.10 over the window
    assert!((result.metrics.total_return - (13.10 / 10.20 - 1.0)).abs() < 1e-6);
}

#[test]
fn backtest_on_unknown_symbol_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    let prices = PriceStore::new(db);

    let request = BacktestRequest {
        symbol: "NOPE".to_string(),
        date_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        date_to: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
        initial_capital: 1_000.0,
        strategy: StrategyRequest::BuyAndHold,
    };

    let err = engine::run(&prices, &request).unwrap_err();
    assert!(matches!(
        err,
        stockbacktest_backend::error::ApiError::NotFound(_)
    ));
}
