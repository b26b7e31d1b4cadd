//! Portfolio Orchestrator (PO) — `spec.md` §4.6: runs the Backtest Engine
//! per holding, aligns on the strict date intersection, and optionally
//! rebalances at monthly/quarterly boundaries.

use crate::backtest::engine::dispatch_strategy;
use crate::backtest::types::{
    round2, EquityPoint, Holding, HoldingResult, PortfolioRequest, PortfolioResult,
    RebalanceInterval, StrategyOutcome, TradeRecord,
};
use crate::backtest::{metrics, series};
use crate::error::ApiError;
use crate::store::PriceStore;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

pub fn run(prices: &PriceStore, request: &PortfolioRequest) -> Result<PortfolioResult, ApiError> {
    validate(&request.holdings)?;
    if request.date_from >= request.date_to {
        return Err(ApiError::Unprocessable(
            "date_from must be before date_to".to_string(),
        ));
    }

    let mut per_holding_series = Vec::with_capacity(request.holdings.len());
    for holding in &request.holdings {
        let prepared =
            series::prepare_series(prices, &holding.symbol, request.date_from, request.date_to)?;
        per_holding_series.push(prepared);
    }

    let intersection = date_intersection(&per_holding_series);
    if intersection.len() < 2 {
        return Err(ApiError::Unprocessable(
            "holdings share fewer than 2 overlapping dates".to_string(),
        ));
    }

    let restricted: Vec<Vec<(NaiveDate, f64)>> = per_holding_series
        .iter()
        .map(|s| {
            s.iter()
                .filter(|(d, _)| intersection.contains(d))
                .cloned()
                .collect()
        })
        .collect();

    let effective_from = *intersection.iter().next().unwrap();
    let effective_to = *intersection.iter().next_back().unwrap();

    let outcomes: Vec<StrategyOutcome> = match &request.rebalance {
        None => run_no_rebalance(&restricted, request)?,
        Some(rebalance) => run_with_rebalance(&restricted, request, rebalance.rebalance_interval)?,
    };

    let mut holdings_results = Vec::with_capacity(outcomes.len());
    let mut portfolio_equity: Vec<(NaiveDate, f64)> = Vec::new();
    let mut portfolio_total_invested = 0.0_f64;

    for (i, outcome) in outcomes.into_iter().enumerate() {
        let holding = &request.holdings[i];
        let symbol_upper = holding.symbol.to_uppercase();
        let security_name =
            prices.find_first_security_name(&symbol_upper, request.date_from, request.date_to);
        let holding_metrics = metrics::compute(&outcome.equity, &outcome.trades, outcome.total_invested);
        let final_value = outcome.equity.last().map(|(_, v)| *v).unwrap_or(0.0);

        if portfolio_equity.is_empty() {
            portfolio_equity = outcome.equity.clone();
        } else {
            for (slot, (_, value)) in portfolio_equity.iter_mut().zip(outcome.equity.iter()) {
                slot.1 += value.1;
            }
        }
        portfolio_total_invested += outcome.total_invested;

        holdings_results.push(HoldingResult {
            symbol: symbol_upper,
            security_name,
            weight: holding.weight,
            total_invested: round2(outcome.total_invested),
            final_value: round2(final_value),
            equity_curve: outcome
                .equity
                .iter()
                .map(|(date, value)| EquityPoint {
                    date: *date,
                    value: round2(*value),
                })
                .collect(),
            trades: outcome.trades,
            metrics: holding_metrics,
        });
    }

    let portfolio_metrics = metrics::compute(&portfolio_equity, &[], portfolio_total_invested);
    let portfolio_final_value = portfolio_equity.last().map(|(_, v)| *v).unwrap_or(0.0);

    Ok(PortfolioResult {
        strategy: request.strategy.name().to_string(),
        date_from: effective_from,
        date_to: effective_to,
        initial_capital: request.initial_capital,
        total_invested: round2(portfolio_total_invested),
        final_value: round2(portfolio_final_value),
        equity_curve: portfolio_equity
            .iter()
            .map(|(date, value)| EquityPoint {
                date: *date,
                value: round2(*value),
            })
            .collect(),
        metrics: portfolio_metrics,
        holdings: holdings_results,
    })
}

fn validate(holdings: &[Holding]) -> Result<(), ApiError> {
    if !(2..=5).contains(&holdings.len()) {
        return Err(ApiError::Unprocessable(
            "portfolio requires between 2 and 5 holdings".to_string(),
        ));
    }
    let weight_sum: f64 = holdings.iter().map(|h| h.weight).sum();
    if (weight_sum - 1.0).abs() > 0.01 {
        return Err(ApiError::Unprocessable(format!(
            "holding weights must sum to 1.0 (got {weight_sum})"
        )));
    }
    Ok(())
}

fn date_intersection(series_list: &[Vec<(NaiveDate, f64)>]) -> BTreeSet<NaiveDate> {
    let mut sets = series_list
        .iter()
        .map(|s| s.iter().map(|(d, _)| *d).collect::<BTreeSet<_>>());
    let first = sets.next().unwrap_or_default();
    sets.fold(first, |acc, next| acc.intersection(&next).cloned().collect())
}

fn run_no_rebalance(
    restricted: &[Vec<(NaiveDate, f64)>],
    request: &PortfolioRequest,
) -> Result<Vec<StrategyOutcome>, ApiError> {
    restricted
        .iter()
        .zip(&request.holdings)
        .map(|(series, holding)| {
            let capital = request.initial_capital * holding.weight;
            dispatch_strategy(series, capital, &request.strategy)
        })
        .collect()
}

fn run_with_rebalance(
    restricted: &[Vec<(NaiveDate, f64)>],
    request: &PortfolioRequest,
    interval: RebalanceInterval,
) -> Result<Vec<StrategyOutcome>, ApiError> {
    let dates: Vec<NaiveDate> = restricted[0].iter().map(|(d, _)| *d).collect();
    let boundaries = sub_period_starts(&dates, interval);

    let n_holdings = request.holdings.len();
    let mut capitals: Vec<f64> = request
        .holdings
        .iter()
        .map(|h| request.initial_capital * h.weight)
        .collect();
    let mut equities: Vec<Vec<(NaiveDate, f64)>> = vec![Vec::new(); n_holdings];
    let mut trades: Vec<Vec<TradeRecord>> = vec![Vec::new(); n_holdings];
    let mut total_invested = vec![0.0_f64; n_holdings];

    for period_idx in 0..boundaries.len() {
        let start = boundaries[period_idx];
        let end = boundaries.get(period_idx + 1).copied();

        let mut period_end_values = vec![0.0_f64; n_holdings];

        for h in 0..n_holdings {
            let slice: Vec<(NaiveDate, f64)> = restricted[h]
                .iter()
                .filter(|(d, _)| *d >= start && end.map(|e| *d < e).unwrap_or(true))
                .cloned()
                .collect();
            if slice.len() < 2 {
                // A degenerate sub-period (e.g. the aligned intersection's
                // last date falling on its own boundary) still needs to
                // contribute its date(s) to the equity curve, flat at the
                // holding's current capital, so no date is ever dropped.
                for (date, _) in &slice {
                    equities[h].push((*date, capitals[h]));
                }
                period_end_values[h] = capitals[h];
                continue;
            }
            let outcome = dispatch_strategy(&slice, capitals[h], &request.strategy)?;
            period_end_values[h] = outcome.equity.last().map(|(_, v)| *v).unwrap_or(capitals[h]);
            total_invested[h] += outcome.total_invested;
            equities[h].extend(outcome.equity);
            trades[h].extend(outcome.trades);
        }

        if end.is_some() {
            let pooled: f64 = period_end_values.iter().sum();
            for h in 0..n_holdings {
                capitals[h] = pooled * request.holdings[h].weight;
            }
        }
    }

    Ok(equities
        .into_iter()
        .zip(trades)
        .zip(total_invested)
        .map(|((equity, trades), total_invested)| StrategyOutcome {
            equity,
            trades,
            total_invested,
        })
        .collect())
}

/// Sub-period start dates: the first intersection date, plus every later
/// date that is a month-start (monthly) or quarter-start (quarterly).
fn sub_period_starts(dates: &[NaiveDate], interval: RebalanceInterval) -> Vec<NaiveDate> {
    let mut starts = vec![dates[0]];
    for date in &dates[1..] {
        let is_boundary = match interval {
            RebalanceInterval::Monthly => date.day() == 1,
            RebalanceInterval::Quarterly => date.day() == 1 && matches!(date.month(), 1 | 4 | 7 | 10),
        };
        if is_boundary {
            starts.push(*date);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::types::StrategyRequest;
    use crate::models::PriceRecord;
    use crate::store::Db;

    fn seed(prices: &PriceStore, symbol: &str, values: &[f64]) {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let records: Vec<PriceRecord> = values
            .iter()
            .enumerate()
            .map(|(i, v)| PriceRecord {
                symbol: symbol.to_string(),
                security_name: format!("{symbol} Inc"),
                date: start + chrono::Duration::days(i as i64),
                open: *v,
                high: *v,
                low: *v,
                close: *v,
                adj_close: *v,
                volume: 0,
                import_id: "imp1".to_string(),
            })
            .collect();
        prices.insert_many(&records).unwrap();
    }

    #[test]
    fn equal_weight_no_rebalance_sums_pointwise() {
        let prices = PriceStore::new(Db::open_in_memory().unwrap());
        let values: Vec<f64> = (0..60).map(|i| 10.0 + i as f64).collect();
        seed(&prices, "AAA", &values);
        seed(&prices, "BBB", &values);

        let request = PortfolioRequest {
            holdings: vec![
                Holding {
                    symbol: "AAA".to_string(),
                    weight: 0.5,
                },
                Holding {
                    symbol: "BBB".to_string(),
                    weight: 0.5,
                },
            ],
            date_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2020, 2, 28).unwrap(),
            initial_capital: 10_000.0,
            strategy: StrategyRequest::BuyAndHold,
            rebalance: None,
        };

        let result = run(&prices, &request).unwrap();
        assert_eq!(result.holdings.len(), 2);
        let expected_first = result.holdings[0].equity_curve[0].value
            + result.holdings[1].equity_curve[0].value;
        assert!((result.equity_curve[0].value - expected_first).abs() < 0.01);
        assert!(result.metrics.win_rate.is_none());
    }

    #[test]
    fn rebalance_keeps_a_single_day_final_sub_period_in_the_equity_curve() {
        let prices = PriceStore::new(Db::open_in_memory().unwrap());
        // 2020-01-01 .. 2020-02-01 inclusive: a monthly boundary falls on
        // the very last date, so the final sub-period is one day long.
        let values: Vec<f64> = (0..32).map(|i| 10.0 + i as f64).collect();
        seed(&prices, "AAA", &values);
        seed(&prices, "BBB", &values);

        let request = PortfolioRequest {
            holdings: vec![
                Holding {
                    symbol: "AAA".to_string(),
                    weight: 0.5,
                },
                Holding {
                    symbol: "BBB".to_string(),
                    weight: 0.5,
                },
            ],
            date_from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
            initial_capital: 10_000.0,
            strategy: StrategyRequest::BuyAndHold,
            rebalance: Some(crate::backtest::types::RebalanceRequest {
                rebalance_interval: RebalanceInterval::Monthly,
            }),
        };

        let result = run(&prices, &request).unwrap();
        assert_eq!(
            result.equity_curve.last().unwrap().date,
            NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()
        );
        assert_eq!(result.equity_curve.len(), 32);
        for holding in &result.holdings {
            assert_eq!(holding.equity_curve.len(), 32);
        }
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let holdings = vec![
            Holding {
                symbol: "AAA".to_string(),
                weight: 0.5,
            },
            Holding {
                symbol: "BBB".to_string(),
                weight: 0.6,
            },
        ];
        assert!(validate(&holdings).is_err());
    }
}
