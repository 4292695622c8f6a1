// Metrics module - returns, risk ratios and rolling statistics

pub mod catalog;
pub mod periods;
pub mod ratios;
pub mod returns;
pub mod rolling;
pub mod stats;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::error::InsufficientData;

pub use catalog::{compute_metric, MetricKind, MetricOptions, MetricOutput};
pub use periods::{Period, ALL_PERIODS};

/// A computed value, or why it could not be computed
pub type MetricCell = Result<Decimal, InsufficientData>;

/// Dated values, typically daily returns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Decimal>,
}

impl Series {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<Decimal>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        Self { dates, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn filter<F: Fn(NaiveDate) -> bool>(&self, keep: F) -> Series {
        let (dates, values) = self
            .dates
            .iter()
            .zip(&self.values)
            .filter(|(date, _)| keep(**date))
            .map(|(d, v)| (*d, *v))
            .unzip();
        Series { dates, values }
    }

    /// Observations inside `period` ending at `as_of`
    pub fn in_period(&self, period: Period, as_of: NaiveDate) -> Series {
        self.filter(|date| period.contains(date, as_of))
    }

    /// The last `n` observations
    pub fn tail(&self, n: usize) -> Series {
        let start = self.len().saturating_sub(n);
        Series {
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }
}

/// Truncate two series to their common trailing length
pub fn align(a: &Series, b: &Series) -> (Series, Series) {
    let n = a.len().min(b.len());
    (a.tail(n), b.tail(n))
}

/// A labelled row of metric cells
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub label: String,
    #[serde(serialize_with = "serialize_cells")]
    pub cells: Vec<MetricCell>,
}

/// Rows (usually periods) by columns (usually Portfolio / Benchmark)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<MetricRow>,
}

impl MetricTable {
    pub fn new(title: &str, columns: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, cells: Vec<MetricCell>) {
        self.rows.push(MetricRow {
            label: label.into(),
            cells,
        });
    }

    pub fn row(&self, label: &str) -> Option<&MetricRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    /// Cell at (`label`, `column`)
    pub fn cell(&self, label: &str, column: &str) -> Option<&MetricCell> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.row(label)?.cells.get(col)
    }
}

/// Errors serialize as `null`
fn serialize_cells<S: Serializer>(cells: &[MetricCell], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(cells.len()))?;
    for cell in cells {
        seq.serialize_element(&cell.as_ref().ok())?;
    }
    seq.end()
}
