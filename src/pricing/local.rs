//! Offline market data read from a directory of CSV files.
//!
//! Layout:
//! - `<SYMBOL>.csv` with `Date,Close,Adj Close` (Adj Close optional)
//! - `splits.csv` with `Ticker,Date,Ratio`
//! - `profiles.csv` with `Ticker,Sector,Industry,Country`
//! - `funds.csv` with `Fund,Kind,Name,Weight` where Kind is `sector` or `holding`
//! - `isin.csv` with `ISIN,Ticker`

use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{CompanyProfile, FundHolding, FundProfile, MarketData, PricePoint};
use crate::error::PricingError;
use crate::importers::parse_date_text;
use crate::ledger::SplitEvent;

const PROVIDER: &str = "local";

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Close")]
    close: Decimal,
    #[serde(rename = "Adj Close", default)]
    adj_close: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct SplitRow {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Ratio")]
    ratio: Decimal,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Sector", default)]
    sector: Option<String>,
    #[serde(rename = "Industry", default)]
    industry: Option<String>,
    #[serde(rename = "Country", default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FundRow {
    #[serde(rename = "Fund")]
    fund: String,
    #[serde(rename = "Kind")]
    kind: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Weight")]
    weight: Decimal,
}

#[derive(Debug, Deserialize)]
struct IsinRow {
    #[serde(rename = "ISIN")]
    isin: String,
    #[serde(rename = "Ticker")]
    ticker: String,
}

/// Market data served from CSV files on disk
#[derive(Debug, Clone)]
pub struct LocalProvider {
    dir: PathBuf,
}

impl LocalProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rows of an optional side file; a missing file reads as empty
    fn read_rows<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>, PricingError> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_csv(&path)
    }
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PricingError> {
    let content = std::fs::read_to_string(path)?;
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping row {} of {:?}: {}", idx + 1, path, e),
        }
    }
    Ok(rows)
}

fn no_data(symbol: &str) -> PricingError {
    PricingError::NoData {
        provider: PROVIDER,
        symbol: symbol.to_string(),
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl MarketData for LocalProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, PricingError> {
        let path = self.dir.join(format!("{}.csv", symbol));
        if !path.exists() {
            debug!("No local price file for {} at {:?}", symbol, path);
            return Err(no_data(symbol));
        }

        let mut points: Vec<PricePoint> = read_csv::<PriceRow>(&path)?
            .into_iter()
            .filter_map(|row| {
                let date = parse_date_text(&row.date).ok()?;
                Some(PricePoint {
                    date,
                    close: row.close,
                    adj_close: row.adj_close.unwrap_or(row.close),
                })
            })
            .filter(|p| p.date >= from && p.date <= to)
            .collect();
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);

        if points.is_empty() {
            return Err(no_data(symbol));
        }
        Ok(points)
    }

    async fn splits(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SplitEvent>, PricingError> {
        let mut splits: Vec<SplitEvent> = self
            .read_rows::<SplitRow>("splits.csv")?
            .into_iter()
            .filter(|row| row.ticker.eq_ignore_ascii_case(symbol))
            .filter_map(|row| {
                Some(SplitEvent {
                    date: parse_date_text(&row.date).ok()?,
                    ratio: row.ratio,
                })
            })
            .filter(|s| s.date >= from && s.date <= to)
            .collect();
        splits.sort_by_key(|s| s.date);
        Ok(splits)
    }

    async fn resolve_isin(&self, isin: &str) -> Result<Option<String>, PricingError> {
        Ok(self
            .read_rows::<IsinRow>("isin.csv")?
            .into_iter()
            .find(|row| row.isin.eq_ignore_ascii_case(isin))
            .map(|row| row.ticker.to_uppercase()))
    }

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, PricingError> {
        self.read_rows::<ProfileRow>("profiles.csv")?
            .into_iter()
            .find(|row| row.ticker.eq_ignore_ascii_case(symbol))
            .map(|row| CompanyProfile {
                sector: blank_to_none(row.sector),
                industry: blank_to_none(row.industry),
                country: blank_to_none(row.country),
            })
            .ok_or_else(|| no_data(symbol))
    }

    async fn fund_profile(&self, symbol: &str) -> Result<FundProfile, PricingError> {
        let rows: Vec<FundRow> = self
            .read_rows::<FundRow>("funds.csv")?
            .into_iter()
            .filter(|row| row.fund.eq_ignore_ascii_case(symbol))
            .collect();
        if rows.is_empty() {
            return Err(no_data(symbol));
        }

        let mut fund = FundProfile::default();
        for row in rows {
            match row.kind.to_lowercase().as_str() {
                "sector" => fund.sector_weights.push((row.name, row.weight)),
                "holding" => fund.holdings.push(FundHolding {
                    symbol: row.name.to_uppercase(),
                    name: None,
                    weight: row.weight,
                }),
                other => warn!("Unknown fund row kind '{}' for {}", other, symbol),
            }
        }
        Ok(fund)
    }
}
