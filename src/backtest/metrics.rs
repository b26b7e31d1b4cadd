//! Performance metrics over an equity curve and trade log — `spec.md` §4.5.

use crate::backtest::types::{PerformanceMetrics, TradeAction, TradeRecord};
use chrono::{Datelike, NaiveDate};
use std::collections::VecDeque;

pub fn compute(
    equity: &[(NaiveDate, f64)],
    trades: &[TradeRecord],
    v0: f64,
) -> PerformanceMetrics {
    let vf = equity.last().map(|(_, v)| *v).unwrap_or(0.0);
    let total_return = (vf - v0) / v0;

    let first_date = equity[0].0;
    let last_date = equity[equity.len() - 1].0;
    let years = (last_date - first_date).num_days() as f64 / 365.25;
    let cagr = if years > 0.0 {
        (vf / v0).powf(1.0 / years) - 1.0
    } else {
        0.0
    };

    let log_returns = daily_log_returns(equity);
    let std_daily = sample_std(&log_returns);
    let mean_daily = if log_returns.is_empty() {
        0.0
    } else {
        log_returns.iter().sum::<f64>() / log_returns.len() as f64
    };
    let volatility = std_daily * 252.0_f64.sqrt();
    let sharpe = if std_daily > 1e-12 {
        mean_daily / std_daily * 252.0_f64.sqrt()
    } else {
        0.0
    };

    let (max_drawdown, trough_index) = max_drawdown_and_trough(equity);
    let calmar = if max_drawdown.abs() > 1e-9 {
        cagr / max_drawdown.abs()
    } else {
        0.0
    };

    let (best_year, worst_year) = year_end_changes(equity);
    let recovery_days = recovery_days(equity, trough_index);
    let time_in_market = time_in_market(equity, trades);
    let (win_rate, profit_factor) = win_rate_and_profit_factor(trades);

    PerformanceMetrics {
        total_return,
        cagr,
        volatility,
        sharpe,
        max_drawdown,
        calmar,
        best_year,
        worst_year,
        recovery_days,
        time_in_market,
        win_rate,
        profit_factor,
    }
}

fn daily_log_returns(equity: &[(NaiveDate, f64)]) -> Vec<f64> {
    let mut out = Vec::with_capacity(equity.len().saturating_sub(1));
    for w in equity.windows(2) {
        let (_, prev) = w[0];
        let (_, curr) = w[1];
        if prev > 0.0 && curr > 0.0 {
            let r = (curr / prev).ln();
            if r.is_finite() {
                out.push(r);
            }
        }
    }
    out
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    variance.sqrt()
}

/// Returns `(max_drawdown, index_of_trough)`.
fn max_drawdown_and_trough(equity: &[(NaiveDate, f64)]) -> (f64, usize) {
    let mut peak = equity[0].1;
    let mut worst = 0.0_f64;
    let mut trough_index = 0usize;
    for (i, (_, value)) in equity.iter().enumerate() {
        if *value > peak {
            peak = *value;
        }
        if peak > 0.0 {
            let drawdown = (value - peak) / peak;
            if drawdown < worst {
                worst = drawdown;
                trough_index = i;
            }
        }
    }
    (worst, trough_index)
}

/// Days from the max-drawdown trough to the first later date the curve
/// reclaims the peak that preceded the trough. `None` if never recovered.
fn recovery_days(equity: &[(NaiveDate, f64)], trough_index: usize) -> Option<i64> {
    let mut peak_at_trough = equity[0].1;
    for (_, value) in &equity[..=trough_index] {
        if *value > peak_at_trough {
            peak_at_trough = *value;
        }
    }
    let trough_date = equity[trough_index].0;
    for (date, value) in &equity[trough_index + 1..] {
        if *value >= peak_at_trough {
            return Some((*date - trough_date).num_days());
        }
    }
    None
}

/// Last equity value on or before each calendar year's Dec 31, then percent
/// changes between consecutive year-end points. `None`/`None` if fewer than
/// two such points exist.
fn year_end_changes(equity: &[(NaiveDate, f64)]) -> (Option<f64>, Option<f64>) {
    let mut year_ends: Vec<f64> = Vec::new();
    let mut current_year = equity[0].0.year();
    let mut last_value_this_year = equity[0].1;

    for (date, value) in equity {
        if date.year() != current_year {
            year_ends.push(last_value_this_year);
            current_year = date.year();
        }
        last_value_this_year = *value;
    }
    year_ends.push(last_value_this_year);

    if year_ends.len() < 2 {
        return (None, None);
    }

    let changes: Vec<f64> = year_ends
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();

    let best = changes.iter().cloned().fold(f64::MIN, f64::max);
    let worst = changes.iter().cloned().fold(f64::MAX, f64::min);
    (Some(best), Some(worst))
}

/// Flip an in-market flag true on each BUY date and false on each SELL date;
/// fraction of equity dates where the flag is true.
fn time_in_market(equity: &[(NaiveDate, f64)], trades: &[TradeRecord]) -> f64 {
    if !trades.iter().any(|t| t.action == TradeAction::Buy) {
        return 0.0;
    }

    let mut in_market = false;
    let mut days_in_market = 0usize;
    for (date, _) in equity {
        for trade in trades {
            if trade.date == *date {
                match trade.action {
                    TradeAction::Buy => in_market = true,
                    TradeAction::Sell => in_market = false,
                }
            }
        }
        if in_market {
            days_in_market += 1;
        }
    }
    days_in_market as f64 / equity.len() as f64
}

/// FIFO pairing of BUY/SELL trades into closed round-trips.
fn win_rate_and_profit_factor(trades: &[TradeRecord]) -> (Option<f64>, Option<f64>) {
    let mut open: VecDeque<(f64, f64)> = VecDeque::new();
    let mut gross_profit = 0.0_f64;
    let mut gross_loss = 0.0_f64;
    let mut wins = 0usize;
    let mut closed = 0usize;

    for trade in trades {
        match trade.action {
            TradeAction::Buy => open.push_back((trade.price, trade.shares)),
            TradeAction::Sell => {
                if let Some((bought_price, bought_shares)) = open.pop_front() {
                    let pnl = (trade.price - bought_price) * trade.shares.min(bought_shares);
                    closed += 1;
                    if pnl > 0.0 {
                        wins += 1;
                        gross_profit += pnl;
                    } else {
                        gross_loss += pnl.abs();
                    }
                }
            }
        }
    }

    if closed == 0 {
        return (None, None);
    }

    let win_rate = wins as f64 / closed as f64;
    let profit_factor = if gross_loss > 1e-9 {
        Some(gross_profit / gross_loss)
    } else {
        None
    };
    (Some(win_rate), profit_factor)
}
