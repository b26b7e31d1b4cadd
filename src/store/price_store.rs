//! Price Store (PS) — `spec.md` §4.1.
//!
//! Owns `PriceRecord`s exclusively. Bulk insert is idempotent on the unique
//! `(symbol, date)` key: duplicates are silently skipped and not counted,
//! mirroring the teacher's `INSERT OR IGNORE` batching in
//! `DbSignalStorage::store_batch`.

use super::Db;
use crate::models::{PriceRecord, SymbolSummary};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::params;

#[derive(Clone)]
pub struct PriceStore {
    db: Db,
}

impl PriceStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Attempt bulk insert; rows violating the `(symbol, date)` unique key
    /// are skipped silently. Returns the count actually inserted.
    pub fn insert_many(&self, records: &[PriceRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.db.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;

        let mut inserted = 0usize;
        {
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO price_records
                 (symbol, security_name, date, open, high, low, close, adj_close, volume, import_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for r in records {
                let changes = stmt.execute(params![
                    r.symbol,
                    r.security_name,
                    r.date.format("%Y-%m-%d").to_string(),
                    r.open,
                    r.high,
                    r.low,
                    r.close,
                    r.adj_close,
                    r.volume,
                    r.import_id,
                ])?;
                inserted += changes;
            }
        }

        conn.execute("COMMIT", [])?;
        Ok(inserted)
    }

    /// Remove all records produced by an ingestion. Idempotent.
    pub fn delete_by_import(&self, import_id: &str) -> Result<usize> {
        let conn = self.db.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM price_records WHERE import_id = ?1",
            params![import_id],
        )?;
        Ok(deleted)
    }

    /// Distinct `symbol` values currently attached to `import_id`, used by
    /// the ingestion pipeline to recompute `symbols_count` every Nth chunk.
    pub fn distinct_symbol_count_for_import(&self, import_id: &str) -> Result<i64> {
        let conn = self.db.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT symbol) FROM price_records WHERE import_id = ?1",
            params![import_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Ascending-date records in `[from, to]` for `symbol`, projected to
    /// `(date, adj_close)` — the projection the Backtest Engine needs.
    pub fn find_range_adj_close(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT date, adj_close FROM price_records
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let rows = stmt.query_map(
            params![
                symbol,
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string()
            ],
            |row| {
                let date_str: String = row.get(0)?;
                let adj_close: f64 = row.get(1)?;
                Ok((date_str, adj_close))
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            let (date_str, adj_close) = row?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("corrupt stored date {date_str}: {e}"))?;
            out.push((date, adj_close));
        }
        Ok(out)
    }

    /// Full records in `[from, to]` (or unbounded) for the
    /// `GET /api/stock-prices` listing endpoint, paginated.
    pub fn find_page(
        &self,
        symbol: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<PriceRecord>> {
        let conn = self.db.conn.lock();
        let mut sql = String::from(
            "SELECT symbol, security_name, date, open, high, low, close, adj_close, volume, import_id
             FROM price_records WHERE 1=1",
        );
        if symbol.is_some() {
            sql.push_str(" AND symbol = ?1");
        }
        if from.is_some() {
            sql.push_str(" AND date >= ?2");
        }
        if to.is_some() {
            sql.push_str(" AND date <= ?3");
        }
        sql.push_str(" ORDER BY date ASC LIMIT ?4 OFFSET ?5");

        let mut stmt = conn.prepare(&sql)?;
        let symbol_param = symbol.unwrap_or_default().to_string();
        let from_param = from.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        let to_param = to.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();

        let rows = stmt.query_map(
            params![symbol_param, from_param, to_param, limit, skip],
            Self::row_to_record,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Exact count for filtered queries; approximated (full-table scan, no
    /// separate metadata counter exists in sqlite the way Mongo's
    /// `estimated_document_count` does) when the filter is empty.
    pub fn count_by_filter(
        &self,
        symbol: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<i64> {
        let conn = self.db.conn.lock();
        if symbol.is_none() && from.is_none() && to.is_none() {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM price_records", [], |row| row.get(0))?;
            return Ok(count);
        }

        let mut sql = String::from("SELECT COUNT(*) FROM price_records WHERE 1=1");
        let mut bound: Vec<String> = Vec::new();
        if let Some(symbol) = symbol {
            sql.push_str(" AND symbol = ?");
            bound.push(symbol.to_string());
        }
        if let Some(from) = from {
            sql.push_str(" AND date >= ?");
            bound.push(from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = to {
            sql.push_str(" AND date <= ?");
            bound.push(to.format("%Y-%m-%d").to_string());
        }
        let count: i64 =
            conn.query_row(&sql, rusqlite::params_from_iter(bound.iter()), |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// `(min_date, max_date, row_count)` for a symbol, or `None` if the
    /// symbol has no records. Backs `GET /api/backtest/symbols/{symbol}/date-range`.
    pub fn date_range_for_symbol(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, i64)>> {
        let conn = self.db.conn.lock();
        let row: Option<(String, String, i64)> = conn.query_row(
            "SELECT MIN(date), MAX(date), COUNT(*) FROM price_records WHERE symbol = ?1",
            params![symbol],
            |row| {
                let min: Option<String> = row.get(0)?;
                let max: Option<String> = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok(min.zip(max).map(|(min, max)| (min, max, count)))
            },
        )?;
        let Some((min, max, count)) = row else {
            return Ok(None);
        };
        let min_date = NaiveDate::parse_from_str(&min, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("corrupt stored date {min}: {e}"))?;
        let max_date = NaiveDate::parse_from_str(&max, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("corrupt stored date {max}: {e}"))?;
        Ok(Some((min_date, max_date, count)))
    }

    /// Distinct symbols with first-occurrence security name and row count,
    /// ordered by symbol. Feeds the Symbol Index Cache.
    pub fn distinct_symbols(&self) -> Result<Vec<SymbolSummary>> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p1.symbol,
                    (SELECT p2.security_name FROM price_records p2
                     WHERE p2.symbol = p1.symbol ORDER BY p2.rowid ASC LIMIT 1) AS security_name,
                    COUNT(*) AS count
             FROM price_records p1
             GROUP BY p1.symbol
             ORDER BY p1.symbol ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SymbolSummary {
                symbol: row.get(0)?,
                security_name: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Best-effort single-record lookup for display metadata: first
    /// non-empty `security_name` for `symbol` within `[from, to]`, falling
    /// back to the first non-empty overall.
    pub fn find_first_security_name(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Option<String> {
        let conn = self.db.conn.lock();
        let windowed: Option<String> = conn
            .query_row(
                "SELECT security_name FROM price_records
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                   AND security_name IS NOT NULL AND security_name != ''
                 ORDER BY date ASC LIMIT 1",
                params![
                    symbol,
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string()
                ],
                |row| row.get(0),
            )
            .ok();
        if windowed.is_some() {
            return windowed;
        }

        conn.query_row(
            "SELECT security_name FROM price_records
             WHERE symbol = ?1 AND security_name IS NOT NULL AND security_name != ''
             ORDER BY rowid ASC LIMIT 1",
            params![symbol],
            |row| row.get(0),
        )
        .ok()
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<PriceRecord> {
        let date_str: String = row.get(2)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(PriceRecord {
            symbol: row.get(0)?,
            security_name: row.get(1)?,
            date,
            open: row.get(3)?,
            high: row.get(4)?,
            low: row.get(5)?,
            close: row.get(6)?,
            adj_close: row.get(7)?,
            volume: row.get(8)?,
            import_id: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(symbol: &str, date: &str, import_id: &str) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_string(),
            security_name: format!("{symbol} Inc"),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            adj_close: 10.5,
            volume: 100,
            import_id: import_id.to_string(),
        }
    }

    #[test]
    fn duplicate_rows_are_skipped_silently() {
        let store = PriceStore::new(Db::open_in_memory().unwrap());
        let rows = vec![sample("AAPL", "2020-01-01", "imp1")];
        assert_eq!(store.insert_many(&rows).unwrap(), 1);
        // Re-insert the same (symbol, date): dropped, not counted.
        assert_eq!(store.insert_many(&rows).unwrap(), 0);
        assert_eq!(store.count_by_filter(None, None, None).unwrap(), 1);
    }

    #[test]
    fn count_by_filter_with_only_symbol_set() {
        let store = PriceStore::new(Db::open_in_memory().unwrap());
        store
            .insert_many(&[
                sample("AAPL", "2020-01-01", "imp1"),
                sample("AAPL", "2020-01-02", "imp1"),
                sample("MSFT", "2020-01-01", "imp1"),
            ])
            .unwrap();
        assert_eq!(store.count_by_filter(Some("AAPL"), None, None).unwrap(), 2);
        assert_eq!(store.count_by_filter(Some("MSFT"), None, None).unwrap(), 1);
        assert_eq!(store.count_by_filter(None, None, None).unwrap(), 3);
    }

    #[test]
    fn delete_by_import_is_idempotent() {
        let store = PriceStore::new(Db::open_in_memory().unwrap());
        let rows = vec![sample("AAPL", "2020-01-01", "imp1")];
        store.insert_many(&rows).unwrap();
        assert_eq!(store.delete_by_import("imp1").unwrap(), 1);
        assert_eq!(store.delete_by_import("imp1").unwrap(), 0);
    }

    #[test]
    fn distinct_symbols_orders_and_counts() {
        let store = PriceStore::new(Db::open_in_memory().unwrap());
        store
            .insert_many(&[
                sample("AAPL", "2020-01-01", "imp1"),
                sample("AAPL", "2020-01-02", "imp1"),
                sample("MSFT", "2020-01-01", "imp1"),
            ])
            .unwrap();
        let symbols = store.distinct_symbols().unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].symbol, "AAPL");
        assert_eq!(symbols[0].count, 2);
        assert_eq!(symbols[1].symbol, "MSFT");
    }
}
