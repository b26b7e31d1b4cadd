//! Price preparation — `spec.md` §4.5 steps 1–3: fetch, dedup, forward-fill
//! onto a dense calendar-day index.

use crate::error::ApiError;
use crate::store::PriceStore;
use chrono::{Duration, NaiveDate};

pub fn prepare_series(
    prices: &PriceStore,
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<(NaiveDate, f64)>, ApiError> {
    let symbol = symbol.to_uppercase();
    let rows = prices.find_range_adj_close(&symbol, from, to)?;

    if rows.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no price data for symbol {symbol}"
        )));
    }

    let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(rows.len());
    for (date, adj_close) in rows {
        if deduped.last().map(|(d, _)| *d) != Some(date) {
            deduped.push((date, adj_close));
        }
    }

    if deduped.len() < 2 {
        return Err(ApiError::Unprocessable(
            "not enough price data in the selected date range".to_string(),
        ));
    }

    Ok(forward_fill(&deduped))
}

/// Reindex onto every calendar day between the first and last observed date,
/// carrying the last known value forward into the gaps.
fn forward_fill(sorted_unique: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let first_date = sorted_unique[0].0;
    let last_date = sorted_unique[sorted_unique.len() - 1].0;

    let mut out = Vec::new();
    let mut source_idx = 0usize;
    let mut last_value = sorted_unique[0].1;
    let mut date = first_date;

    while date <= last_date {
        if source_idx < sorted_unique.len() && sorted_unique[source_idx].0 == date {
            last_value = sorted_unique[source_idx].1;
            source_idx += 1;
        }
        out.push((date, last_value));
        date += Duration::days(1);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_fill_carries_last_value_into_gaps() {
        let input = vec![
            (NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 10.0),
            (NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(), 12.0),
        ];
        let out = forward_fill(&input);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], (NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), 10.0));
        assert_eq!(out[2], (NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(), 12.0));
    }
}
