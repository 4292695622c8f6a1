use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::*;
use serde::Serialize;
use std::str::FromStr;

use super::stats::{ratio, sqrt, std_dev};
use super::{MetricCell, Period, Series};
use crate::error::InsufficientData;
use crate::portfolio::{BenchmarkSide, HistoricalTradeData};

/// Trading days in a year, used to annualize
pub const TRADING_DAYS: u32 = 252;

/// Bucket size for aggregated returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Frequency {
    Daily,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "d" | "daily" => Ok(Frequency::Daily),
            "m" | "monthly" => Ok(Frequency::Monthly),
            "y" | "yearly" => Ok(Frequency::Yearly),
            other => Err(format!("unknown frequency '{}' (daily, monthly, yearly)", other)),
        }
    }
}

/// Product of `(1 + r)` minus one
pub fn compound(values: &[Decimal]) -> Decimal {
    values.iter().fold(Decimal::ONE, |acc, r| acc * (Decimal::ONE + r)) - Decimal::ONE
}

/// Running compounded return
pub fn cumulative_returns(series: &Series) -> Series {
    let mut growth = Decimal::ONE;
    let values = series
        .values
        .iter()
        .map(|r| {
            growth *= Decimal::ONE + r;
            growth - Decimal::ONE
        })
        .collect();
    Series::new(series.dates.clone(), values)
}

/// Compounded returns per calendar bucket, dated at the bucket's last observation
pub fn aggregate_returns(series: &Series, frequency: Frequency) -> Series {
    if frequency == Frequency::Daily {
        return series.clone();
    }
    let bucket = |date: NaiveDate| match frequency {
        Frequency::Monthly => (date.year(), date.month()),
        _ => (date.year(), 1),
    };

    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut values: Vec<Decimal> = Vec::new();
    let mut growth = Decimal::ONE;
    for (i, (date, r)) in series.dates.iter().zip(&series.values).enumerate() {
        growth *= Decimal::ONE + r;
        let closes_bucket = series
            .dates
            .get(i + 1)
            .map_or(true, |next| bucket(*next) != bucket(*date));
        if closes_bucket {
            dates.push(*date);
            values.push(growth - Decimal::ONE);
            growth = Decimal::ONE;
        }
    }
    Series::new(dates, values)
}

/// Compounded return scaled to one year of trading days
pub fn annualized_return(values: &[Decimal]) -> MetricCell {
    if values.is_empty() {
        return Err(InsufficientData::EmptyPeriod);
    }
    let growth = Decimal::ONE + compound(values);
    if growth <= Decimal::ZERO {
        return Ok(Decimal::NEGATIVE_ONE);
    }
    let exponent = ratio(Decimal::from(TRADING_DAYS), Decimal::from(values.len()))?;
    growth
        .checked_powd(exponent)
        .map(|g| g - Decimal::ONE)
        .ok_or(InsufficientData::OutOfRange)
}

/// Standard deviation scaled by the square root of the period's day count
pub fn volatility(values: &[Decimal], period: Period) -> MetricCell {
    Ok(std_dev(values)? * sqrt(Decimal::from(period.days()))?)
}

/// Rows of `data` inside the period, as a first..=last index range
fn period_bounds(dates: &[NaiveDate], period: Period, as_of: NaiveDate) -> Option<(usize, usize)> {
    let first = dates.iter().position(|d| period.contains(*d, as_of))?;
    let last = dates.iter().rposition(|d| period.contains(*d, as_of))?;
    Some((first, last))
}

/// Portfolio total return over a period, net of cash added or removed
pub fn portfolio_period_return(data: &HistoricalTradeData, period: Period, as_of: NaiveDate) -> MetricCell {
    let (first, last) = period_bounds(&data.dates, period, as_of).ok_or(InsufficientData::EmptyPeriod)?;
    let end_value = data.end_value.total()[last];
    let invested = data.investment.total();
    let base = data.initial_value.total()[first] + invested[last] - invested[first];
    Ok(ratio(end_value, base)? - Decimal::ONE)
}

/// Benchmark total return over a period.
///
/// Uses the replayed trades when any fall inside the period, otherwise
/// compounds the daily returns.
pub fn benchmark_period_return(
    benchmark: &BenchmarkSide,
    returns: &Series,
    period: Period,
    as_of: NaiveDate,
) -> MetricCell {
    let trades: Vec<_> = benchmark
        .trades
        .iter()
        .filter(|t| period.contains(t.date, as_of))
        .collect();

    if !trades.is_empty() {
        let value: Decimal = trades.iter().map(|t| t.benchmark_value).sum();
        let invested: Decimal = trades.iter().map(|t| t.benchmark_investment).sum();
        return Ok(ratio(value, invested)? - Decimal::ONE);
    }

    let window = returns.in_period(period, as_of);
    if window.is_empty() {
        return Err(InsufficientData::EmptyPeriod);
    }
    Ok(compound(&window.values))
}
