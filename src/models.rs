//! Shared domain types for the price store and import registry.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One daily observation, keyed by `(symbol, date)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub symbol: String,
    pub security_name: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: i64,
    pub import_id: String,
}

/// Lifecycle status of an [`ImportRecord`]. See `spec.md` §4.2 for the
/// transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Deleting,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
            ImportStatus::Deleting => "deleting",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImportStatus::Pending),
            "processing" => Some(ImportStatus::Processing),
            "completed" => Some(ImportStatus::Completed),
            "failed" => Some(ImportStatus::Failed),
            "deleting" => Some(ImportStatus::Deleting),
            _ => None,
        }
    }

    /// Non-terminal statuses left behind by an unclean shutdown.
    pub fn is_orphanable(&self) -> bool {
        matches!(
            self,
            ImportStatus::Pending | ImportStatus::Processing | ImportStatus::Deleting
        )
    }
}

/// One ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: ImportStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub symbols_count: i64,
    pub error: Option<String>,
}

/// One entry of the Symbol Index Cache / `/api/stock-prices/symbols` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub security_name: String,
    pub count: i64,
}
