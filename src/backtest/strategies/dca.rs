use crate::backtest::types::{DcaParams, StrategyOutcome, TradeAction, TradeRecord};
use chrono::NaiveDate;

/// Inject fresh capital at each interval boundary and immediately buy. No
/// cash float, no sells — contributions are always new money.
pub fn run(series: &[(NaiveDate, f64)], params: &DcaParams) -> StrategyOutcome {
    let spacing = params.interval.spacing_days();

    let mut shares = 0.0_f64;
    let mut total_invested = 0.0_f64;
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(series.len());
    let mut last_invest_date: Option<NaiveDate> = None;

    for (date, price) in series {
        let invest_now = match last_invest_date {
            None => true,
            Some(last) => (*date - last).num_days() >= spacing,
        };

        if invest_now {
            let new_shares = params.amount / price;
            shares += new_shares;
            total_invested += params.amount;
            last_invest_date = Some(*date);
            trades.push(TradeRecord {
                date: *date,
                action: TradeAction::Buy,
                price: *price,
                shares: new_shares,
                cash_after: 0.0,
                portfolio_value_after: shares * price,
            });
        }

        equity.push((*date, shares * price));
    }

    StrategyOutcome {
        equity,
        trades,
        total_invested,
    }
}
