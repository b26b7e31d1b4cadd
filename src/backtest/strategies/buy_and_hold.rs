use crate::backtest::types::{StrategyOutcome, TradeAction, TradeRecord};
use chrono::NaiveDate;

/// Deploy all capital into shares at the first bar. Emit one BUY, never sell.
pub fn run(series: &[(NaiveDate, f64)], initial_capital: f64) -> StrategyOutcome {
    let (first_date, first_price) = series[0];
    let shares = initial_capital / first_price;

    let trades = vec![TradeRecord {
        date: first_date,
        action: TradeAction::Buy,
        price: first_price,
        shares,
        cash_after: 0.0,
        portfolio_value_after: shares * first_price,
    }];

    let equity = series
        .iter()
        .map(|(date, price)| (*date, shares * price))
        .collect();

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
    fn doubling_prices_double_equity() {
        let series = vec![
            (NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 10.0),
            (NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), 12.0),
            (NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(), 15.0),
            (NaiveDate::from_ymd_opt(2020, 1, 4).unwrap(), 20.0),
        ];
        let outcome = run(&series, 10_000.0);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].shares, 1_000.0);
        assert_eq!(outcome.equity.last().unwrap().1, 20_000.0);
        assert_eq!(outcome.total_invested, 10_000.0);
    }
}
