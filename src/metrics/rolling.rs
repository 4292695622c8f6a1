//! Trailing-window versions of the ratio metrics.
//!
//! A window longer than the sample yields an empty series, never an error.

use rust_decimal::Decimal;
use tracing::info;

use super::ratios::{beta, calmar, jensens_alpha, sharpe, sortino};
use super::stats::std_dev;
use super::{align, MetricCell, Series};

/// Windows for std-based metrics need at least two observations
pub fn effective_window(window: usize) -> usize {
    window.max(2)
}

/// Apply `metric` to each trailing window, dated at the window's last observation.
///
/// Windows whose metric has no value are skipped.
pub fn rolling_apply<F>(series: &Series, window: usize, metric: F) -> Series
where
    F: Fn(&[Decimal]) -> MetricCell,
{
    let window = effective_window(window);
    if window > series.len() {
        info!(
            "Rolling window of {} exceeds the {} available observations",
            window,
            series.len()
        );
        return Series::default();
    }

    let (dates, values) = (window..=series.len())
        .filter_map(|end| {
            let value = metric(&series.values[end - window..end]).ok()?;
            Some((series.dates[end - 1], value))
        })
        .unzip();
    Series::new(dates, values)
}

/// Like [`rolling_apply`] over two aligned series
pub fn rolling_apply_pair<F>(a: &Series, b: &Series, window: usize, metric: F) -> Series
where
    F: Fn(&[Decimal], &[Decimal]) -> MetricCell,
{
    let (a, b) = align(a, b);
    let window = effective_window(window);
    if window > a.len() {
        info!(
            "Rolling window of {} exceeds the {} available observations",
            window,
            a.len()
        );
        return Series::default();
    }

    let (dates, values) = (window..=a.len())
        .filter_map(|end| {
            let range = end - window..end;
            let value = metric(&a.values[range.clone()], &b.values[range]).ok()?;
            Some((a.dates[end - 1], value))
        })
        .unzip();
    Series::new(dates, values)
}

pub fn rolling_volatility(series: &Series, window: usize) -> Series {
    rolling_apply(series, window, std_dev)
}

pub fn rolling_sharpe(series: &Series, window: usize, risk_free: Decimal) -> Series {
    rolling_apply(series, window, |w| sharpe(w, risk_free))
}

pub fn rolling_sortino(series: &Series, window: usize, risk_free: Decimal) -> Series {
    rolling_apply(series, window, |w| sortino(w, risk_free))
}

pub fn rolling_calmar(series: &Series, window: usize) -> Series {
    rolling_apply(series, window, calmar)
}

pub fn rolling_beta(portfolio: &Series, benchmark: &Series, window: usize) -> Series {
    rolling_apply_pair(portfolio, benchmark, window, beta)
}

pub fn rolling_alpha(portfolio: &Series, benchmark: &Series, window: usize, risk_free: Decimal) -> Series {
    rolling_apply_pair(portfolio, benchmark, window, |p, b| jensens_alpha(p, b, risk_free))
}
