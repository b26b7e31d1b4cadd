use super::{dates_only, rolling_std, simple_moving_average};
use crate::backtest::types::{BollingerParams, StrategyOutcome, TradeAction, TradeRecord};
use chrono::NaiveDate;

/// Buy when price drops below the lower band, sell when it rises above the
/// upper band. All-in / all-out, one position at a time.
pub fn run(
    series: &[(NaiveDate, f64)],
    initial_capital: f64,
    params: &BollingerParams,
) -> StrategyOutcome {
    let dates = dates_only(series);
    let prices: Vec<f64> = series.iter().map(|(_, p)| *p).collect();
    let mean = simple_moving_average(&prices, params.bb_window);
    let std = rolling_std(&prices, params.bb_window);

    let mut cash = initial_capital;
    let mut shares = 0.0_f64;
    let mut in_market = false;
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(series.len());

    for i in 0..series.len() {
        let price = prices[i];

        if let (Some(mu), Some(sigma)) = (mean[i], std[i]) {
            let upper = mu + params.bb_std * sigma;
            let lower = mu - params.bb_std * sigma;

            if !in_market && price < lower && cash > 0.0 {
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
            } else if in_market && price > upper && shares > 0.0 {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_prices_never_breach_bands() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let series: Vec<(NaiveDate, f64)> = (0..60)
            .map(|i| (start + chrono::Duration::days(i), 50.0))
            .collect();
        let params = BollingerParams {
            bb_window: 20,
            bb_std: 2.0,
        };
        let outcome = run(&series, 10_000.0, &params);
        assert!(outcome.trades.is_empty());
    }

    #[test]
    fn sharp_dip_triggers_a_buy() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut prices = vec![50.0; 25];
        prices.push(1.0);
        prices.extend(std::iter::repeat(50.0).take(10));
        let series: Vec<(NaiveDate, f64)> = prices
            .into_iter()
            .enumerate()
            .map(|(i, p)| (start + chrono::Duration::days(i as i64), p))
            .collect();
        let params = BollingerParams {
            bb_window: 20,
            bb_std: 2.0,
        };
        let outcome = run(&series, 10_000.0, &params);
        assert!(!outcome.trades.is_empty());
        assert_eq!(outcome.trades[0].action, TradeAction::Buy);
    }
}
