//! Symbol Index Cache (SIC) — `spec.md` §4.4.
//!
//! A process-wide, TTL-memoised snapshot of `DistinctSymbols()`. Invalidated
//! explicitly after a completed ingestion and after an import deletion;
//! otherwise readers recompute under no mutual exclusion once the TTL
//! expires — duplicate recomputation is acceptable since the aggregation is
//! pure. Modelled as its own small component (not folded into the price
//! store) per `spec.md` §9's note on breaking the IP ↔ IR ↔ cache cycle.

use crate::models::SymbolSummary;
use crate::store::PriceStore;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    data: Vec<SymbolSummary>,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct SymbolIndexCache {
    inner: Arc<Mutex<Option<CacheEntry>>>,
    prices: PriceStore,
}

impl SymbolIndexCache {
    pub fn new(prices: PriceStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            prices,
        }
    }

    /// Return the cached snapshot if fresh, else recompute (no negative
    /// caching: an empty result is never treated as "still valid forever").
    pub fn get(&self) -> Result<Vec<SymbolSummary>> {
        {
            let guard = self.inner.lock();
            if let Some(entry) = guard.as_ref() {
                if Instant::now() < entry.expires_at {
                    return Ok(entry.data.clone());
                }
            }
        }

        let fresh = self.prices.distinct_symbols()?;
        let mut guard = self.inner.lock();
        *guard = Some(CacheEntry {
            data: fresh.clone(),
            expires_at: Instant::now() + TTL,
        });
        Ok(fresh)
    }

    /// Explicit invalidation after a completed ingestion or import deletion.
    pub fn invalidate(&self) {
        let mut guard = self.inner.lock();
        *guard = None;
    }
}
