//! Persistence layer: the Price Store (PS) and Import Registry (IR) of
//! `spec.md` §4.1/§4.2, both backed by a single shared sqlite connection.

pub mod import_registry;
pub mod price_store;
mod schema;

pub use import_registry::ImportRegistry;
pub use price_store::PriceStore;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Shared handle to the underlying sqlite connection. Cheaply `Clone`able;
/// `PriceStore` and `ImportRegistry` each hold one, mirroring the teacher's
/// `Arc<Mutex<Connection>>` pattern in `DbSignalStorage`.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        schema::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}
