//! Day-by-day state tables built from trades and closes.
//!
//! Each metric is a [`MetricFrame`] holding one column per instrument plus a
//! `Total` column, all sharing the date index of [`HistoricalTradeData`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Name of the aggregate column
pub const TOTAL: &str = "Total";

/// One aggregated movement fed to the state builder
#[derive(Debug, Clone, PartialEq)]
pub struct StateTrade {
    pub date: NaiveDate,
    pub ticker: String,
    pub quantity: Decimal,
    pub investment: Decimal,
}

/// One metric over time: a column per instrument plus the total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricFrame {
    tickers: Vec<String>,
    columns: Vec<Vec<Decimal>>,
    total: Vec<Decimal>,
}

impl MetricFrame {
    fn new(tickers: &[String], rows: usize) -> Self {
        Self {
            tickers: tickers.to_vec(),
            columns: vec![vec![Decimal::ZERO; rows]; tickers.len()],
            total: vec![Decimal::ZERO; rows],
        }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Values of one instrument column, or of `Total`
    pub fn column(&self, name: &str) -> Option<&[Decimal]> {
        if name == TOTAL {
            return Some(&self.total);
        }
        self.tickers
            .iter()
            .position(|t| t == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// The aggregate column; empty for the close frame
    pub fn total(&self) -> &[Decimal] {
        &self.total
    }

    /// Value of every instrument on the last row
    pub fn last_row(&self) -> Vec<(&str, Decimal)> {
        self.tickers
            .iter()
            .zip(&self.columns)
            .filter_map(|(ticker, col)| col.last().map(|v| (ticker.as_str(), *v)))
            .collect()
    }

    fn sum_columns(&mut self) {
        for (row, total) in self.total.iter_mut().enumerate() {
            *total = self.columns.iter().map(|col| col[row]).sum();
        }
    }

    fn all_columns(&self) -> impl Iterator<Item = &Vec<Decimal>> {
        self.columns.iter().chain(std::iter::once(&self.total))
    }

    fn columns_mut(&mut self) -> impl Iterator<Item = &mut Vec<Decimal>> {
        self.columns.iter_mut().chain(std::iter::once(&mut self.total))
    }
}

/// Struct-of-arrays state table joined by a shared date index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalTradeData {
    pub dates: Vec<NaiveDate>,
    pub quantity: MetricFrame,
    pub investment: MetricFrame,
    pub investment_delta: MetricFrame,
    pub close: MetricFrame,
    pub initial_value: MetricFrame,
    pub end_value: MetricFrame,
    pub cash_inflow: MetricFrame,
    pub cash_outflow: MetricFrame,
    pub abs_return: MetricFrame,
    pub pct_return: MetricFrame,
}

impl HistoricalTradeData {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Position of the first row dated on or after `date`
    pub fn index_from(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }
}

/// Union of trade dates and price dates, restricted to dates on or after inception
pub fn calendar(
    trades: &[StateTrade],
    closes: &BTreeMap<String, Vec<(NaiveDate, Decimal)>>,
) -> Vec<NaiveDate> {
    let Some(inception) = trades.iter().map(|t| t.date).min() else {
        return Vec::new();
    };
    let mut dates: BTreeSet<NaiveDate> = trades.iter().map(|t| t.date).collect();
    dates.extend(
        closes
            .values()
            .flat_map(|series| series.iter().map(|(d, _)| *d))
            .filter(|d| *d >= inception),
    );
    dates.into_iter().collect()
}

/// Closes for every calendar date, carrying the last known close forward.
///
/// Dates before the first known close get zero.
pub fn reindex_ffill(series: &[(NaiveDate, Decimal)], calendar: &[NaiveDate]) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(calendar.len());
    let mut idx = 0;
    let mut last = Decimal::ZERO;
    for date in calendar {
        while idx < series.len() && series[idx].0 <= *date {
            last = series[idx].1;
            idx += 1;
        }
        out.push(last);
    }
    out
}

/// Build the full state table.
///
/// `closes` must be sorted by date. Trades dated outside `calendar` are
/// counted on the next calendar date.
pub fn build_state(
    trades: &[StateTrade],
    tickers: &[String],
    closes: &BTreeMap<String, Vec<(NaiveDate, Decimal)>>,
    calendar: &[NaiveDate],
) -> HistoricalTradeData {
    let rows = calendar.len();
    let mut data = HistoricalTradeData {
        dates: calendar.to_vec(),
        quantity: MetricFrame::new(tickers, rows),
        investment: MetricFrame::new(tickers, rows),
        investment_delta: MetricFrame::new(tickers, rows),
        close: MetricFrame::new(tickers, rows),
        initial_value: MetricFrame::new(tickers, rows),
        end_value: MetricFrame::new(tickers, rows),
        cash_inflow: MetricFrame::new(tickers, rows),
        cash_outflow: MetricFrame::new(tickers, rows),
        abs_return: MetricFrame::new(tickers, rows),
        pct_return: MetricFrame::new(tickers, rows),
    };
    data.close.total.clear();
    if rows == 0 {
        return data;
    }

    // Per-date movements, then running sums
    for trade in trades {
        let Some(col) = tickers.iter().position(|t| *t == trade.ticker) else {
            continue;
        };
        let row = calendar.partition_point(|d| *d < trade.date);
        if row >= rows {
            continue;
        }
        data.quantity.columns[col][row] += trade.quantity;
        data.investment.columns[col][row] += trade.investment;
    }
    for col in 0..tickers.len() {
        for row in 1..rows {
            let prev_qty = data.quantity.columns[col][row - 1];
            let prev_inv = data.investment.columns[col][row - 1];
            data.quantity.columns[col][row] += prev_qty;
            data.investment.columns[col][row] += prev_inv;
        }
    }
    data.quantity.sum_columns();
    data.investment.sum_columns();

    for (col, ticker) in tickers.iter().enumerate() {
        if let Some(series) = closes.get(ticker) {
            data.close.columns[col] = reindex_ffill(series, calendar);
        }
        for row in 0..rows {
            data.end_value.columns[col][row] =
                data.quantity.columns[col][row] * data.close.columns[col][row];
        }
    }
    data.end_value.sum_columns();

    // Investment delta, seeded with the first period's investment
    let investments: Vec<Vec<Decimal>> = data.investment.all_columns().cloned().collect();
    for (delta, invested) in data.investment_delta.columns_mut().zip(&investments) {
        for row in 0..rows {
            delta[row] = if row == 0 {
                invested[0]
            } else {
                invested[row] - invested[row - 1]
            };
        }
    }

    let deltas: Vec<Vec<Decimal>> = data.investment_delta.all_columns().cloned().collect();
    let end_values: Vec<Vec<Decimal>> = data.end_value.all_columns().cloned().collect();

    let frames = data
        .initial_value
        .columns_mut()
        .zip(data.cash_inflow.columns_mut())
        .zip(data.cash_outflow.columns_mut())
        .zip(data.abs_return.columns_mut())
        .zip(data.pct_return.columns_mut())
        .zip(deltas.iter().zip(&end_values).zip(&investments));

    for (((((initial, inflow), outflow), abs), pct), ((delta, end), invested)) in frames {
        for row in 0..rows {
            inflow[row] = -delta[row].min(Decimal::ZERO);
            outflow[row] = delta[row].max(Decimal::ZERO);

            if row == 0 {
                initial[row] = invested[0];
                continue;
            }
            initial[row] = end[row - 1] + delta[row];

            let current = end[row] + inflow[row];
            let base = end[row - 1] + outflow[row];
            abs[row] = current - base;
            pct[row] = if base.is_zero() {
                Decimal::ZERO
            } else {
                current / base - Decimal::ONE
            };
        }
    }

    data
}
