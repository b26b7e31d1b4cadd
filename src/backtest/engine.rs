//! Backtest Engine (BE) — `spec.md` §4.5: dispatch, minimum-data guards, and
//! the single-symbol `/api/backtest` entry point.

use crate::backtest::types::{
    round2, BacktestRequest, BacktestResult, CompareRequest, EquityPoint, StrategyOutcome,
    StrategyRequest,
};
use crate::backtest::{metrics, series, strategies};
use crate::error::ApiError;
use crate::store::PriceStore;
use chrono::NaiveDate;

/// Validate a strategy's own parameters against `spec.md` §4.5's bounds,
/// independent of how much price data is available.
fn validate_params(strategy: &StrategyRequest) -> Result<(), ApiError> {
    let err = |msg: String| Err(ApiError::Unprocessable(msg));
    match strategy {
        StrategyRequest::BuyAndHold => Ok(()),
        StrategyRequest::Dca(params) => {
            if params.amount <= 0.0 {
                return err(format!(
                    "dca amount must be positive, got {}",
                    params.amount
                ));
            }
            Ok(())
        }
        StrategyRequest::MaCrossover(params) => {
            if !(5..=200).contains(&params.short_window) {
                return err(format!(
                    "short_window must be in [5, 200], got {}",
                    params.short_window
                ));
            }
            if !(20..=500).contains(&params.long_window) {
                return err(format!(
                    "long_window must be in [20, 500], got {}",
                    params.long_window
                ));
            }
            if params.short_window >= params.long_window {
                return err(format!(
                    "short_window ({}) must be less than long_window ({})",
                    params.short_window, params.long_window
                ));
            }
            Ok(())
        }
        StrategyRequest::Rsi(params) => {
            if params.rsi_period < 2 {
                return err(format!(
                    "rsi_period must be at least 2, got {}",
                    params.rsi_period
                ));
            }
            if !(5.0..=49.0).contains(&params.oversold) {
                return err(format!(
                    "oversold must be in [5, 49], got {}",
                    params.oversold
                ));
            }
            if !(51.0..=95.0).contains(&params.overbought) {
                return err(format!(
                    "overbought must be in [51, 95], got {}",
                    params.overbought
                ));
            }
            if params.oversold >= params.overbought {
                return err(format!(
                    "oversold ({}) must be less than overbought ({})",
                    params.oversold, params.overbought
                ));
            }
            Ok(())
        }
        StrategyRequest::Bollinger(params) => {
            if !(5..=200).contains(&params.bb_window) {
                return err(format!(
                    "bb_window must be in [5, 200], got {}",
                    params.bb_window
                ));
            }
            if !(0.5..=4.0).contains(&params.bb_std) {
                return err(format!(
                    "bb_std must be in [0.5, 4.0], got {}",
                    params.bb_std
                ));
            }
            Ok(())
        }
    }
}

/// Run the chosen strategy against a prepared series, enforcing parameter
/// bounds and each strategy's minimum-data guard first.
pub(super) fn dispatch_strategy(
    series: &[(NaiveDate, f64)],
    capital: f64,
    strategy: &StrategyRequest,
) -> Result<StrategyOutcome, ApiError> {
    validate_params(strategy)?;
    match strategy {
        StrategyRequest::BuyAndHold => Ok(strategies::buy_and_hold(series, capital)),
        StrategyRequest::Dca(params) => Ok(strategies::dca(series, params)),
        StrategyRequest::MaCrossover(params) => {
            if series.len() < params.long_window {
                return Err(ApiError::Unprocessable(format!(
                    "not enough data for a {}-day long MA: only {} data points available",
                    params.long_window,
                    series.len()
                )));
            }
            Ok(strategies::ma_crossover(series, capital, params))
        }
        StrategyRequest::Rsi(params) => {
            let required = 3 * params.rsi_period;
            if series.len() < required {
                return Err(ApiError::Unprocessable(format!(
                    "not enough data for a {}-day RSI: only {} data points available",
                    params.rsi_period,
                    series.len()
                )));
            }
            Ok(strategies::rsi(series, capital, params))
        }
        StrategyRequest::Bollinger(params) => {
            let required = 2 * params.bb_window;
            if series.len() < required {
                return Err(ApiError::Unprocessable(format!(
                    "not enough data for a {}-day Bollinger window: only {} data points available",
                    params.bb_window,
                    series.len()
                )));
            }
            Ok(strategies::bollinger(series, capital, params))
        }
    }
}

pub fn run(prices: &PriceStore, request: &BacktestRequest) -> Result<BacktestResult, ApiError> {
    if request.date_from >= request.date_to {
        return Err(ApiError::Unprocessable(
            "date_from must be before date_to".to_string(),
        ));
    }

    let prepared = series::prepare_series(
        prices,
        &request.symbol,
        request.date_from,
        request.date_to,
    )?;
    let symbol_upper = request.symbol.to_uppercase();
    let security_name =
        prices.find_first_security_name(&symbol_upper, request.date_from, request.date_to);

    let outcome = dispatch_strategy(&prepared, request.initial_capital, &request.strategy)?;
    let computed_metrics = metrics::compute(&outcome.equity, &outcome.trades, outcome.total_invested);

    let equity_curve = outcome
        .equity
        .iter()
        .map(|(date, value)| EquityPoint {
            date: *date,
            value: round2(*value),
        })
        .collect();

    let final_value = outcome.equity.last().map(|(_, v)| *v).unwrap_or(0.0);

    Ok(BacktestResult {
        symbol: symbol_upper,
        security_name,
        strategy: request.strategy.name().to_string(),
        date_from: request.date_from,
        date_to: request.date_to,
        initial_capital: request.initial_capital,
        total_invested: round2(outcome.total_invested),
        final_value: round2(final_value),
        equity_curve,
        trades: outcome.trades,
        metrics: computed_metrics,
    })
}

/// Run 2–5 strategies against the same symbol and date range.
pub fn compare(
    prices: &PriceStore,
    request: &CompareRequest,
) -> Result<Vec<BacktestResult>, ApiError> {
    if !(2..=5).contains(&request.strategies.len()) {
        return Err(ApiError::Unprocessable(
            "compare requires between 2 and 5 strategies".to_string(),
        ));
    }

    request
        .strategies
        .iter()
        .map(|strategy| {
            run(
                prices,
                &BacktestRequest {
                    symbol: request.symbol.clone(),
                    date_from: request.date_from,
                    date_to: request.date_to,
                    initial_capital: request.initial_capital,
                    strategy: strategy.clone(),
                },
            )
        })
        .collect()
}
