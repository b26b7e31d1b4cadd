//! Ingestion Pipeline (IP) — `spec.md` §4.3.
//!
//! Streams a CSV file in bounded chunks, validates the header once,
//! transforms and bulk-inserts each chunk, and checks for cooperative
//! cancellation at every chunk boundary by re-reading the `ImportRecord`'s
//! status (`spec.md` §5: cancellation rides on persisted state, not an
//! in-memory signal, so it survives a restart of the task that started it).

use crate::models::{ImportStatus, PriceRecord};
use crate::store::{ImportRegistry, PriceStore};
use crate::symbol_cache::SymbolIndexCache;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const EXPECTED_HEADER: [&str; 9] = [
    "Symbol",
    "Security Name",
    "Date",
    "Open",
    "High",
    "Low",
    "Close",
    "Adj Close",
    "Volume",
];

/// How often (in chunks) `symbols_count` is recomputed and persisted while
/// an ingestion is still running.
const SYMBOLS_COUNT_REFRESH_EVERY: u64 = 10;

#[derive(Clone)]
pub struct IngestionPipeline {
    prices: PriceStore,
    imports: ImportRegistry,
    cache: SymbolIndexCache,
    chunk_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        prices: PriceStore,
        imports: ImportRegistry,
        cache: SymbolIndexCache,
        chunk_size: usize,
    ) -> Self {
        Self {
            prices,
            imports,
            cache,
            chunk_size,
        }
    }

    /// Run ingestion for `import_id` against the file at `file_path`.
    /// Intended to run on a blocking thread pool (`tokio::task::spawn_blocking`)
    /// since every suspension point here — file reads, store commits — is
    /// synchronous sqlite/file IO, not an async await point.
    pub fn run(&self, file_path: &Path, import_id: &str) {
        let result = self.process(file_path, import_id);

        if let Err(err) = result {
            warn!(import_id, error = %err, "ingestion failed");
            let _ = self.imports.set_failed(import_id, &err.to_string());
        }

        if file_path.exists() {
            if let Err(err) = std::fs::remove_file(file_path) {
                warn!(import_id, error = %err, "failed to remove staged upload");
            }
        }
    }

    fn process(&self, file_path: &Path, import_id: &str) -> Result<()> {
        self.imports.set_status(import_id, ImportStatus::Processing)?;

        let total_rows = count_csv_data_rows(file_path)?;
        self.imports.set_total_rows(import_id, total_rows)?;
        info!(import_id, total_rows, "ingestion started");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(file_path)
            .with_context(|| format!("failed to open {}", file_path.display()))?;

        let mut records = reader.into_records();

        let header = match records.next() {
            Some(row) => row.context("failed to read CSV header")?,
            None => bail!("CSV file has no header row"),
        };
        validate_header(&header)?;

        let mut chunk: Vec<csv::StringRecord> = Vec::with_capacity(self.chunk_size);
        let mut chunk_index: u64 = 0;

        loop {
            chunk.clear();
            while chunk.len() < self.chunk_size {
                match records.next() {
                    Some(row) => chunk.push(row.context("failed to read CSV row")?),
                    None => break,
                }
            }
            if chunk.is_empty() {
                break;
            }

            if self.cancelled(import_id)? {
                return self.cancel(import_id);
            }

            let transformed: Vec<PriceRecord> = chunk
                .iter()
                .filter_map(|row| transform_row(row, import_id))
                .collect();

            let inserted = self.prices.insert_many(&transformed)?;
            chunk_index += 1;

            let refreshed_symbols_count = if chunk_index % SYMBOLS_COUNT_REFRESH_EVERY == 0 {
                Some(self.prices.distinct_symbol_count_for_import(import_id)?)
            } else {
                None
            };
            self.imports.add_processed_rows(
                import_id,
                inserted as i64,
                refreshed_symbols_count,
            )?;
        }

        if self.cancelled(import_id)? {
            return self.cancel(import_id);
        }

        let symbols_count = self.prices.distinct_symbol_count_for_import(import_id)?;
        self.imports.set_completed(import_id, symbols_count)?;
        self.cache.invalidate();
        info!(import_id, symbols_count, "ingestion completed");
        Ok(())
    }

    /// The only cancellation point: re-read the `ImportRecord` and check
    /// whether it is missing or has been flipped to `deleting`.
    fn cancelled(&self, import_id: &str) -> Result<bool> {
        match self.imports.get(import_id)? {
            None => Ok(true),
            Some(record) => Ok(record.status == ImportStatus::Deleting),
        }
    }

    fn cancel(&self, import_id: &str) -> Result<()> {
        info!(import_id, "ingestion cancelled, cleaning up partial rows");
        self.prices.delete_by_import(import_id)?;
        self.cache.invalidate();
        Ok(())
    }
}

/// Fast line count minus the header row, via a single newline scan —
/// `spec.md` §4.3 step 2 calls for exactly this, not a full CSV parse.
fn count_csv_data_rows(file_path: &Path) -> Result<i64> {
    let file = std::fs::File::open(file_path)
        .with_context(|| format!("failed to open {}", file_path.display()))?;
    let reader = BufReader::new(file);
    let mut count: i64 = 0;
    for line in reader.lines() {
        line?;
        count += 1;
    }
    Ok((count - 1).max(0))
}

fn validate_header(header: &csv::StringRecord) -> Result<()> {
    let normalized: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();
    if normalized != EXPECTED_HEADER {
        bail!(
            "invalid CSV header: expected {:?}, got {:?}",
            EXPECTED_HEADER,
            normalized
        );
    }
    Ok(())
}

/// Transform and validate one raw CSV row. Returns `None` when the row must
/// be dropped (unparseable date, or close/adj_close not finite).
fn transform_row(row: &csv::StringRecord, import_id: &str) -> Option<PriceRecord> {
    let symbol = row.get(0)?.trim().to_string();
    let security_name = row.get(1)?.trim().to_string();
    let date = parse_date_strict(row.get(2)?)?;

    let open = parse_float_sentinel(row.get(3)?);
    let high = parse_float_sentinel(row.get(4)?);
    let low = parse_float_sentinel(row.get(5)?);
    let close = parse_float_sentinel(row.get(6)?);
    let adj_close = parse_float_sentinel(row.get(7)?);
    let volume = row
        .get(8)
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(0);

    if !close.is_finite() || !adj_close.is_finite() {
        return None;
    }

    Some(PriceRecord {
        symbol,
        security_name,
        date,
        open,
        high,
        low,
        close,
        adj_close,
        volume,
        import_id: import_id.to_string(),
    })
}

fn parse_date_strict(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Parse to `f64`; unparseable input becomes the NaN sentinel.
fn parse_float_sentinel(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Stage an uploaded file under the OS temp directory and return its path.
pub fn stage_temp_file(bytes: &[u8]) -> Result<PathBuf> {
    use std::io::Write;
    let mut path = std::env::temp_dir();
    path.push(format!("stockbacktest-upload-{}.csv", uuid::Uuid::new_v4()));
    let mut file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create temp file {}", path.display()))?;
    file.write_all(bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Db;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("prices.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn pipeline() -> (IngestionPipeline, PriceStore, ImportRegistry) {
        let db = Db::open_in_memory().unwrap();
        let prices = PriceStore::new(db.clone());
        let imports = ImportRegistry::new(db);
        let cache = SymbolIndexCache::new(prices.clone());
        (
            IngestionPipeline::new(prices.clone(), imports.clone(), cache, 10_000),
            prices,
            imports,
        )
    }

    #[test]
    fn ingests_valid_rows_and_completes() {
        let (pipeline, prices, imports) = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let csv_text = "Symbol,Security Name,Date,Open,High,Low,Close,Adj Close,Volume\n\
                         AAPL,Apple Inc,2020-01-01,10,11,9,10.5,10.5,1000\n\
                         AAPL,Apple Inc,2020-01-02,10.5,12,10,11.5,11.5,1200\n\
                         AAPL,Apple Inc,2020-01-03,,,,,,\n";
        let path = write_csv(&dir, csv_text);

        let import_id = imports.create("prices.csv").unwrap();
        pipeline.run(&path, &import_id);

        let record = imports.get(&import_id).unwrap().unwrap();
        assert_eq!(record.status, ImportStatus::Completed);
        assert_eq!(record.total_rows, 3);
        assert_eq!(record.processed_rows, 2); // 3rd row dropped: no close/adj_close
        assert_eq!(record.symbols_count, 1);
        assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn bad_header_fails_the_import() {
        let (pipeline, _prices, imports) = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "Wrong,Header\nA,B\n");

        let import_id = imports.create("bad.csv").unwrap();
        pipeline.run(&path, &import_id);

        let record = imports.get(&import_id).unwrap().unwrap();
        assert_eq!(record.status, ImportStatus::Failed);
        assert!(record.error.is_some());
    }

    #[test]
    fn reupload_same_file_inserts_zero_new_rows() {
        let (pipeline, prices, imports) = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let csv_text = "Symbol,Security Name,Date,Open,High,Low,Close,Adj Close,Volume\n\
                         AAPL,Apple Inc,2020-01-01,10,11,9,10.5,10.5,1000\n";
        let path = write_csv(&dir, csv_text);

        let first = imports.create("prices.csv").unwrap();
        pipeline.run(&path, &first);
        assert_eq!(imports.get(&first).unwrap().unwrap().processed_rows, 1);

        let path2 = write_csv(&dir, csv_text);
        let second = imports.create("prices.csv").unwrap();
        pipeline.run(&path2, &second);
        assert_eq!(imports.get(&second).unwrap().unwrap().processed_rows, 0);
        assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 1);
    }

    #[test]
    fn cancellation_before_start_removes_partial_rows() {
        let (pipeline, prices, imports) = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let csv_text = "Symbol,Security Name,Date,Open,High,Low,Close,Adj Close,Volume\n\
                         AAPL,Apple Inc,2020-01-01,10,11,9,10.5,10.5,1000\n";
        let path = write_csv(&dir, csv_text);

        let import_id = imports.create("prices.csv").unwrap();
        imports
            .set_status(&import_id, ImportStatus::Deleting)
            .unwrap();
        pipeline.run(&path, &import_id);

        assert_eq!(prices.count_by_filter(None, None, None).unwrap(), 0);
    }
}
