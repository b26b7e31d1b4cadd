//! sqlite schema bootstrap, ensured once at startup (`spec.md` §4.1).

use anyhow::{Context, Result};
use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS import_records (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    status TEXT NOT NULL,
    total_rows INTEGER NOT NULL DEFAULT 0,
    processed_rows INTEGER NOT NULL DEFAULT 0,
    symbols_count INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_imports_uploaded_at ON import_records(uploaded_at DESC);
CREATE INDEX IF NOT EXISTS idx_imports_status ON import_records(status);

CREATE TABLE IF NOT EXISTS price_records (
    symbol TEXT NOT NULL,
    security_name TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    adj_close REAL NOT NULL,
    volume INTEGER NOT NULL DEFAULT 0,
    import_id TEXT NOT NULL,
    PRIMARY KEY (symbol, date)
);

CREATE INDEX IF NOT EXISTS idx_prices_date ON price_records(date);
CREATE INDEX IF NOT EXISTS idx_prices_import_id ON price_records(import_id);
CREATE INDEX IF NOT EXISTS idx_prices_symbol_name ON price_records(symbol, security_name);
"#;

/// Create tables and indices if absent, and switch on WAL journalling the
/// way the teacher's `DbSignalStorage::new` does.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .context("failed to initialize sqlite schema")?;

    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
        .unwrap_or_default();
    if journal_mode.to_lowercase() != "wal" {
        tracing::warn!(%journal_mode, "WAL mode not active");
    }

    Ok(())
}
