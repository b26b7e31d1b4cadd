use super::{dates_only, wilder_ema};
use crate::backtest::types::{RsiParams, StrategyOutcome, TradeAction, TradeRecord};
use chrono::NaiveDate;

/// Wilder mean-reversion: buy when RSI dips below `oversold`, sell when it
/// rises above `overbought`. All-in / all-out, one position at a time.
pub fn run(
    series: &[(NaiveDate, f64)],
    initial_capital: f64,
    params: &RsiParams,
) -> StrategyOutcome {
    let dates = dates_only(series);
    let prices: Vec<f64> = series.iter().map(|(_, p)| *p).collect();
    let rsi_by_bar = rsi_series(&prices, params.rsi_period);

    let mut cash = initial_capital;
    let mut shares = 0.0_f64;
    let mut in_market = false;
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(series.len());

    for i in 0..series.len() {
        let price = prices[i];

        if let Some(rsi) = rsi_by_bar[i] {
            if !in_market && rsi < params.oversold && cash > 0.0 {
                let new_shares = cash / price;
                shares = new_shares;
                cash = 0.0;
                in_market = true;
                trades.push(TradeRecord {
                    date: dates[i],
                    action: TradeAction::Buy,
                    price,
                    shares,
                    cash_after: cash,
                    portfolio_value_after: shares * price,
                });
            } else if in_market && rsi > params.overbought && shares > 0.0 {
                cash = shares * price;
                let sold_shares = shares;
                shares = 0.0;
                in_market = false;
                trades.push(TradeRecord {
                    date: dates[i],
                    action: TradeAction::Sell,
                    price,
                    shares: sold_shares,
                    cash_after: cash,
                    portfolio_value_after: cash,
                });
            }
        }

        equity.push((dates[i], cash + shares * price));
    }

    StrategyOutcome {
        equity,
        trades,
        total_invested: initial_capital,
    }
}

/// RSI per bar via Wilder's EMA over gains/losses of `adj_close.diff()`.
/// The first bar has no prior diff and is `None`; every bar after that is
/// defined, per `adjust=false` EWM semantics (`spec.md` §9).
fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if prices.len() < 2 {
        return out;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for w in prices.windows(2) {
        let diff = w[1] - w[0];
        gains.push(diff.max(0.0));
        losses.push((-diff).max(0.0));
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = wilder_ema(&gains, alpha);
    let avg_loss = wilder_ema(&losses, alpha);

    for i in 0..gains.len() {
        let rsi = if avg_loss[i] > 0.0 {
            100.0 - 100.0 / (1.0 + avg_gain[i] / avg_loss[i])
        } else if avg_gain[i] > 0.0 {
            100.0
        } else {
            50.0
        };
        out[i + 1] = Some(rsi);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decline_then_recovery_buys_low_sells_high() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut prices = Vec::new();
        for i in 0..10 {
            prices.push(100.0 - 10.0 * i as f64);
        }
        for i in 0..15 {
            prices.push(0.0 + 10.0 * i as f64);
        }
        let series: Vec<(NaiveDate, f64)> = prices
            .into_iter()
            .enumerate()
            .map(|(i, p)| (start + chrono::Duration::days(i as i64), p))
            .collect();
        let params = RsiParams {
            rsi_period: 5,
            oversold: 30.0,
            overbought: 70.0,
        };
        let outcome = run(&series, 10_000.0, &params);
        assert_eq!(outcome.trades[0].action, TradeAction::Buy);
        assert_eq!(outcome.trades[1].action, TradeAction::Sell);
        assert!(outcome.trades[1].price > outcome.trades[0].price);
    }
}
