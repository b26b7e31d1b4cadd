//! The five strategies of `spec.md` §4.5. Each operates on a dense,
//! forward-filled `(date, adj_close)` series and returns a [`StrategyOutcome`].

mod bollinger;
mod buy_and_hold;
mod dca;
mod ma_crossover;
mod rsi;

pub use bollinger::run as bollinger;
pub use buy_and_hold::run as buy_and_hold;
pub use dca::run as dca;
pub use ma_crossover::run as ma_crossover;
pub use rsi::run as rsi;

use chrono::NaiveDate;

/// Simple moving average as a windowed sum — `spec.md` §9.
pub(super) fn simple_moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }
    out
}

/// Rolling sample standard deviation (ddof = 1) over `window`.
pub(super) fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window < 2 || values.len() < window {
        return out;
    }
    for end in window..=values.len() {
        let slice = &values[end - window..end];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let variance =
            slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window as f64 - 1.0);
        out[end - 1] = Some(variance.sqrt());
    }
    out
}

/// Wilder's EMA, `adjust=false` semantics: seeded by the first value, then
/// `avg[t] = avg[t-1] * (1 - alpha) + value[t] * alpha`.
pub(super) fn wilder_ema(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    let mut avg = values[0];
    out.push(avg);
    for &v in &values[1..] {
        avg = avg * (1.0 - alpha) + v * alpha;
        out.push(avg);
    }
    out
}

pub(super) fn dates_only(series: &[(NaiveDate, f64)]) -> Vec<NaiveDate> {
    series.iter().map(|(d, _)| *d).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_matches_manual_window_average() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let sma = simple_moving_average(&values, 3);
        assert_eq!(sma, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn wilder_ema_seeds_on_first_value() {
        let values = vec![10.0, 0.0, 0.0];
        let ema = wilder_ema(&values, 0.5);
        assert_eq!(ema[0], 10.0);
        assert_eq!(ema[1], 5.0);
        assert_eq!(ema[2], 2.5);
    }
}
