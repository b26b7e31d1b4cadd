use super::{dates_only, simple_moving_average};
use crate::backtest::types::{MaCrossoverParams, StrategyOutcome, TradeAction, TradeRecord};
use chrono::NaiveDate;

/// Golden/death cross: buy all cash on an upward crossing of the short MA
/// through the long MA, sell all shares on the downward crossing.
pub fn run(
    series: &[(NaiveDate, f64)],
    initial_capital: f64,
    params: &MaCrossoverParams,
) -> StrategyOutcome {
    let dates = dates_only(series);
    let prices: Vec<f64> = series.iter().map(|(_, p)| *p).collect();
    let short_ma = simple_moving_average(&prices, params.short_window);
    let long_ma = simple_moving_average(&prices, params.long_window);

    let mut cash = initial_capital;
    let mut shares = 0.0_f64;
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(series.len());
    let mut prev_above: Option<bool> = None;

    for i in 0..series.len() {
        let price = prices[i];

        if let (Some(s), Some(l)) = (short_ma[i], long_ma[i]) {
            let above = s > l;

            if let Some(prev) = prev_above {
                if above && !prev && cash > 0.0 {
                    let new_shares = cash / price;
                    shares += new_shares;
                    cash = 0.0;
                    trades.push(TradeRecord {
                        date: dates[i],
                        action: TradeAction::Buy,
                        price,
                        shares: new_shares,
                        cash_after: cash,
                        portfolio_value_after: shares * price,
                    });
                } else if !above && prev && shares > 0.0 {
                    let old_shares = shares;
                    cash += shares * price;
                    shares = 0.0;
                    trades.push(TradeRecord {
                        date: dates[i],
                        action: TradeAction::Sell,
                        price,
                        shares: old_shares,
                        cash_after: cash,
                        portfolio_value_after: cash,
                    });
                }
            }
            prev_above = Some(above);
        }

        equity.push((dates[i], cash + shares * price));
    }

    StrategyOutcome {
        equity,
        trades,
        total_invested: initial_capital,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_prices_produce_zero_trades() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let series: Vec<(NaiveDate, f64)> = (0..40)
            .map(|i| (start + chrono::Duration::days(i), 100.0))
            .collect();
        let params = MaCrossoverParams {
            short_window: 5,
            long_window: 20,
        };
        let outcome = run(&series, 10_000.0, &params);
        assert!(outcome.trades.is_empty());
    }

    #[test]
    fn golden_then_death_cross_trades_in_order() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut prices = Vec::new();
        prices.extend(std::iter::repeat(10.0).take(20));
        prices.extend(std::iter::repeat(100.0).take(5));
        prices.extend(std::iter::repeat(1.0).take(10));
        let series: Vec<(NaiveDate, f64)> = prices
            .into_iter()
            .enumerate()
            .map(|(i, p)| (start + chrono::Duration::days(i as i64), p))
            .collect();
        let params = MaCrossoverParams {
            short_window: 5,
            long_window: 20,
        };
        let outcome = run(&series, 10_000.0, &params);
        assert_eq!(outcome.trades[0].action, TradeAction::Buy);
        assert_eq!(outcome.trades.last().unwrap().action, TradeAction::Sell);
        let buy = &outcome.trades[0];
        let sell = outcome.trades.last().unwrap();
        assert_eq!(sell.cash_after, buy.shares * sell.price);
    }
}
