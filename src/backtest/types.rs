//! Request/response shapes for the Backtest Engine and Portfolio Orchestrator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DcaInterval {
    Weekly,
    Monthly,
    Quarterly,
}

impl DcaInterval {
    pub fn spacing_days(self) -> i64 {
        match self {
            DcaInterval::Weekly => 7,
            DcaInterval::Monthly => 30,
            DcaInterval::Quarterly => 91,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceInterval {
    Monthly,
    Quarterly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DcaParams {
    pub interval: DcaInterval,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaCrossoverParams {
    pub short_window: usize,
    pub long_window: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiParams {
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BollingerParams {
    pub bb_window: usize,
    pub bb_std: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", content = "params", rename_all = "snake_case")]
pub enum StrategyRequest {
    BuyAndHold,
    Dca(DcaParams),
    MaCrossover(MaCrossoverParams),
    Rsi(RsiParams),
    Bollinger(BollingerParams),
}

impl StrategyRequest {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyRequest::BuyAndHold => "buy_and_hold",
            StrategyRequest::Dca(_) => "dca",
            StrategyRequest::MaCrossover(_) => "ma_crossover",
            StrategyRequest::Rsi(_) => "rsi",
            StrategyRequest::Bollinger(_) => "bollinger",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub initial_capital: f64,
    #[serde(flatten)]
    pub strategy: StrategyRequest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub action: TradeAction,
    pub price: f64,
    pub shares: f64,
    pub cash_after: f64,
    pub portfolio_value_after: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
    pub best_year: Option<f64>,
    pub worst_year: Option<f64>,
    pub recovery_days: Option<i64>,
    pub time_in_market: f64,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
}

/// What a strategy produces, before metrics are computed on top of it.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub equity: Vec<(NaiveDate, f64)>,
    pub trades: Vec<TradeRecord>,
    pub total_invested: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub security_name: Option<String>,
    pub strategy: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub initial_capital: f64,
    pub total_invested: f64,
    pub final_value: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
    pub symbol: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub initial_capital: f64,
    pub strategies: Vec<StrategyRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceRequest {
    pub rebalance_interval: RebalanceInterval,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioRequest {
    pub holdings: Vec<Holding>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub initial_capital: f64,
    #[serde(flatten)]
    pub strategy: StrategyRequest,
    pub rebalance: Option<RebalanceRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldingResult {
    pub symbol: String,
    pub security_name: Option<String>,
    pub weight: f64,
    pub total_invested: f64,
    pub final_value: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioResult {
    pub strategy: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub initial_capital: f64,
    pub total_invested: f64,
    pub final_value: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub holdings: Vec<HoldingResult>,
}

/// Round to cents for display in a response body. Never applied before
/// metrics are computed on the underlying equity series.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
