//! Risk and performance ratios over return slices.
//!
//! Every function returns a [`MetricCell`]; empty input and zero
//! denominators come back as [`InsufficientData`] instead of panicking.

use rust_decimal::Decimal;
use tracing::warn;

use super::returns::{annualized_return, compound};
use super::stats::{covariance, mean, quantile, ratio, std_dev, variance};
use super::{MetricCell, Series};
use crate::error::InsufficientData;

fn warn_zero(metric: &str, cell: MetricCell) -> MetricCell {
    if cell == Err(InsufficientData::ZeroDenominator) {
        warn!("{}: zero denominator, reporting no value", metric);
    }
    cell
}

pub fn sharpe(values: &[Decimal], risk_free: Decimal) -> MetricCell {
    let excess = mean(values)? - risk_free;
    warn_zero("Sharpe ratio", ratio(excess, std_dev(values)?))
}

/// Like Sharpe, but only downside deviation counts as risk
pub fn sortino(values: &[Decimal], risk_free: Decimal) -> MetricCell {
    let excess = mean(values)? - risk_free;
    let downside: Vec<Decimal> = values.iter().copied().filter(|r| r.is_sign_negative() && !r.is_zero()).collect();
    warn_zero("Sortino ratio", ratio(excess, std_dev(&downside)?))
}

fn drawdowns(values: &[Decimal]) -> Vec<Decimal> {
    let mut wealth = Decimal::ONE;
    let mut peak: Option<Decimal> = None;
    values
        .iter()
        .map(|r| {
            wealth *= Decimal::ONE + r;
            let top = peak.map_or(wealth, |p| p.max(wealth));
            peak = Some(top);
            if top.is_zero() {
                Decimal::ZERO
            } else {
                wealth / top - Decimal::ONE
            }
        })
        .collect()
}

/// Drawdown from the running peak of the compounded wealth index
pub fn drawdown_series(series: &Series) -> Series {
    Series::new(series.dates.clone(), drawdowns(&series.values))
}

/// Deepest drawdown; always zero or negative
pub fn max_drawdown(values: &[Decimal]) -> MetricCell {
    drawdowns(values)
        .into_iter()
        .min()
        .map(|dd| dd.min(Decimal::ZERO))
        .ok_or(InsufficientData::EmptyPeriod)
}

/// Sensitivity of portfolio returns to benchmark returns
pub fn beta(portfolio: &[Decimal], benchmark: &[Decimal]) -> MetricCell {
    let n = portfolio.len().min(benchmark.len());
    warn_zero(
        "Beta",
        ratio(
            covariance(&portfolio[..n], &benchmark[..n])?,
            variance(&benchmark[..n])?,
        ),
    )
}

/// Standard deviation of the active return
pub fn tracking_error(portfolio: &[Decimal], benchmark: &[Decimal]) -> MetricCell {
    let active: Vec<Decimal> = portfolio.iter().zip(benchmark).map(|(p, b)| p - b).collect();
    std_dev(&active)
}

pub fn information_ratio(portfolio_total: Decimal, benchmark_total: Decimal, tracking_error: Decimal) -> MetricCell {
    warn_zero(
        "Information ratio",
        ratio(portfolio_total - benchmark_total, tracking_error),
    )
}

/// 95th percentile over the absolute 5th percentile
pub fn tail_ratio(values: &[Decimal]) -> MetricCell {
    let right = quantile(values, Decimal::new(95, 2))?;
    let left = quantile(values, Decimal::new(5, 2))?;
    warn_zero("Tail ratio", ratio(right, left.abs()))
}

pub fn gain_to_pain(values: &[Decimal]) -> MetricCell {
    let drawdown = max_drawdown(values)?;
    warn_zero("Gain-to-pain ratio", ratio(compound(values), drawdown.abs()))
}

pub fn common_sense_ratio(values: &[Decimal]) -> MetricCell {
    Ok(tail_ratio(values)? * gain_to_pain(values)?)
}

/// Return in excess of what beta exposure to the benchmark explains
pub fn jensens_alpha(portfolio: &[Decimal], benchmark: &[Decimal], risk_free: Decimal) -> MetricCell {
    let beta = beta(portfolio, benchmark)?;
    let portfolio_return = compound(portfolio);
    let benchmark_return = compound(benchmark);
    Ok(portfolio_return - (risk_free + beta * (benchmark_return - risk_free)))
}

/// Annualized return over the absolute maximum drawdown
pub fn calmar(values: &[Decimal]) -> MetricCell {
    let annual = annualized_return(values)?;
    let drawdown = max_drawdown(values)?;
    warn_zero("Calmar ratio", ratio(annual, drawdown.abs()))
}

fn wins_and_losses(trade_returns: &[Decimal]) -> (Vec<Decimal>, Vec<Decimal>) {
    let wins = trade_returns.iter().copied().filter(|r| *r > Decimal::ZERO).collect();
    let losses = trade_returns.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
    (wins, losses)
}

/// Average winning trade over the absolute average losing trade
pub fn payoff_ratio(trade_returns: &[Decimal]) -> MetricCell {
    if trade_returns.is_empty() {
        return Err(InsufficientData::EmptyPeriod);
    }
    let (wins, losses) = wins_and_losses(trade_returns);
    if losses.is_empty() {
        return Err(InsufficientData::ZeroDenominator);
    }
    let avg_win = if wins.is_empty() { Decimal::ZERO } else { mean(&wins)? };
    ratio(avg_win, mean(&losses)?.abs())
}

/// Gross profit over absolute gross loss
pub fn profit_factor(trade_returns: &[Decimal]) -> MetricCell {
    if trade_returns.is_empty() {
        return Err(InsufficientData::EmptyPeriod);
    }
    let (wins, losses) = wins_and_losses(trade_returns);
    let gross_loss: Decimal = losses.iter().sum();
    ratio(wins.iter().sum(), gross_loss.abs())
}

/// Kelly fraction `w - (1 - w) / R` with `w` the win rate and `R` the payoff ratio
pub fn kelly_criterion(trade_returns: &[Decimal]) -> MetricCell {
    let payoff = payoff_ratio(trade_returns)?;
    let (wins, _) = wins_and_losses(trade_returns);
    let win_rate = ratio(Decimal::from(wins.len()), Decimal::from(trade_returns.len()))?;
    Ok(win_rate - ratio(Decimal::ONE - win_rate, payoff)?)
}
