//! Import Registry (IR) — `spec.md` §4.2.
//!
//! Owns `ImportRecord`s exclusively; only the Ingestion Pipeline and the
//! delete endpoint mutate them.

use super::price_store::PriceStore;
use super::Db;
use crate::models::{ImportRecord, ImportStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

#[derive(Clone)]
pub struct ImportRegistry {
    db: Db,
}

impl ImportRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create a new import record with status `pending`. Returns the
    /// generated opaque id.
    pub fn create(&self, filename: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let uploaded_at = Utc::now();
        let conn = self.db.conn.lock();
        conn.execute(
            "INSERT INTO import_records
             (id, filename, uploaded_at, status, total_rows, processed_rows, symbols_count, error)
             VALUES (?1, ?2, ?3, ?4, 0, 0, 0, NULL)",
            params![id, filename, uploaded_at.to_rfc3339(), ImportStatus::Pending.as_str()],
        )?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<ImportRecord>> {
        let conn = self.db.conn.lock();
        conn.query_row(
            "SELECT id, filename, uploaded_at, status, total_rows, processed_rows, symbols_count, error
             FROM import_records WHERE id = ?1",
            params![id],
            Self::row_to_record,
        )
        .optional()
        .map_err(anyhow::Error::from)
    }

    /// Paginated list sorted by `uploaded_at desc`.
    pub fn list(&self, skip: i64, limit: i64) -> Result<(Vec<ImportRecord>, i64)> {
        let conn = self.db.conn.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM import_records", [], |r| r.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, filename, uploaded_at, status, total_rows, processed_rows, symbols_count, error
             FROM import_records ORDER BY uploaded_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, skip], Self::row_to_record)?;
        let mut data = Vec::new();
        for row in rows {
            data.push(row?);
        }
        Ok((data, total))
    }

    pub fn set_status(&self, id: &str, status: ImportStatus) -> Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE import_records SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn set_total_rows(&self, id: &str, total_rows: i64) -> Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE import_records SET total_rows = ?1 WHERE id = ?2",
            params![total_rows, id],
        )?;
        Ok(())
    }

    /// Add `delta` to `processed_rows`, optionally also refreshing
    /// `symbols_count` (every Nth chunk per `spec.md` §4.3 step 4).
    pub fn add_processed_rows(
        &self,
        id: &str,
        delta: i64,
        symbols_count: Option<i64>,
    ) -> Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE import_records SET processed_rows = processed_rows + ?1 WHERE id = ?2",
            params![delta, id],
        )?;
        if let Some(count) = symbols_count {
            conn.execute(
                "UPDATE import_records SET symbols_count = ?1 WHERE id = ?2",
                params![count, id],
            )?;
        }
        Ok(())
    }

    pub fn set_completed(&self, id: &str, symbols_count: i64) -> Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE import_records SET status = ?1, symbols_count = ?2 WHERE id = ?3",
            params![ImportStatus::Completed.as_str(), symbols_count, id],
        )?;
        Ok(())
    }

    pub fn set_failed(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.db.conn.lock();
        conn.execute(
            "UPDATE import_records SET status = ?1, error = ?2 WHERE id = ?3",
            params![ImportStatus::Failed.as_str(), error, id],
        )?;
        Ok(())
    }

    /// Mark an import `deleting` synchronously; the cascade delete of its
    /// `PriceRecord`s runs afterwards in the background.
    pub fn mark_deleting(&self, id: &str) -> Result<bool> {
        let conn = self.db.conn.lock();
        let changes = conn.execute(
            "UPDATE import_records SET status = ?1 WHERE id = ?2",
            params![ImportStatus::Deleting.as_str(), id],
        )?;
        Ok(changes > 0)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.db.conn.lock();
        let changes = conn.execute("DELETE FROM import_records WHERE id = ?1", params![id])?;
        Ok(changes > 0)
    }

    /// Crash-safe recovery, run once at startup before any request is
    /// served (`spec.md` §4.2). Two passes, in order:
    /// 1. Any `ImportRecord` left in a non-terminal status is orphaned —
    ///    delete it and its `PriceRecord`s.
    /// 2. Any remaining `PriceRecord` whose `import_id` no longer
    ///    references an `ImportRecord` is orphaned too — delete it.
    pub fn recover_at_startup(&self, prices: &PriceStore) -> Result<(usize, usize)> {
        let orphaned_ids: Vec<String> = {
            let conn = self.db.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id FROM import_records WHERE status IN ('pending', 'processing', 'deleting')",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        let mut orphan_imports = 0usize;
        for id in &orphaned_ids {
            prices.delete_by_import(id)?;
            if self.delete(id)? {
                orphan_imports += 1;
            }
        }

        let swept_prices = self.sweep_orphaned_prices(prices)?;

        Ok((orphan_imports, swept_prices))
    }

    /// Remove `PriceRecord`s whose `import_id` matches no `ImportRecord`.
    fn sweep_orphaned_prices(&self, prices: &PriceStore) -> Result<usize> {
        let conn = self.db.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT import_id FROM price_records
             WHERE import_id NOT IN (SELECT id FROM import_records)",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut orphaned_import_ids = Vec::new();
        for row in rows {
            orphaned_import_ids.push(row?);
        }
        drop(stmt);
        drop(conn);

        let mut total_deleted = 0usize;
        for import_id in orphaned_import_ids {
            total_deleted += prices.delete_by_import(&import_id)?;
        }
        Ok(total_deleted)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ImportRecord> {
        let status_str: String = row.get(3)?;
        let status = ImportStatus::from_str(&status_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                3,
                "status".to_string(),
                rusqlite::types::Type::Text,
            )
        })?;
        let uploaded_at_str: String = row.get(2)?;
        let uploaded_at = DateTime::parse_from_rfc3339(&uploaded_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
        Ok(ImportRecord {
            id: row.get(0)?,
            filename: row.get(1)?,
            uploaded_at,
            status,
            total_rows: row.get(4)?,
            processed_rows: row.get(5)?,
            symbols_count: row.get(6)?,
            error: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_roundtrips() {
        let db = Db::open_in_memory().unwrap();
        let ir = ImportRegistry::new(db);
        let id = ir.create("prices.csv").unwrap();
        let record = ir.get(&id).unwrap().unwrap();
        assert_eq!(record.filename, "prices.csv");
        assert_eq!(record.status, ImportStatus::Pending);
        assert_eq!(record.total_rows, 0);
    }

    #[test]
    fn list_orders_newest_first() {
        let db = Db::open_in_memory().unwrap();
        let ir = ImportRegistry::new(db);
        let first = ir.create("a.csv").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ir.create("b.csv").unwrap();
        let (data, total) = ir.list(0, 20).unwrap();
        assert_eq!(total, 2);
        assert_eq!(data[0].id, second);
        assert_eq!(data[1].id, first);
    }

    #[test]
    fn recover_at_startup_removes_orphans() {
        let db = Db::open_in_memory().unwrap();
        let ir = ImportRegistry::new(db.clone());
        let prices = PriceStore::new(db);

        let stuck = ir.create("stuck.csv").unwrap();
        ir.set_status(&stuck, ImportStatus::Processing).unwrap();
        prices
            .insert_many(&[crate::models::PriceRecord {
                symbol: "AAPL".into(),
                security_name: "Apple".into(),
                date: chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                adj_close: 1.0,
                volume: 0,
                import_id: stuck.clone(),
            }])
            .unwrap();

        let (orphan_imports, swept_prices) = ir.recover_at_startup(&prices).unwrap();
        assert_eq!(orphan_imports, 1);
        assert_eq!(swept_prices, 0); // already removed with the import
        assert!(ir.get(&stuck).unwrap().is_none());
        assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 0);
    }
}
