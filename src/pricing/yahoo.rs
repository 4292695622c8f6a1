use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{CompanyProfile, FundHolding, FundProfile, MarketData, PricePoint, RetryPolicy};
use crate::error::PricingError;
use crate::ledger::SplitEvent;

const PROVIDER: &str = "yahoo";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Yahoo Finance chart response
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<Events>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct Events {
    splits: Option<HashMap<String, Split>>,
}

#[derive(Debug, Deserialize)]
struct Split {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    quote_summary: SummaryData,
}

#[derive(Debug, Deserialize)]
struct SummaryData {
    result: Option<Vec<SummaryResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    asset_profile: Option<AssetProfile>,
    top_holdings: Option<TopHoldings>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopHoldings {
    #[serde(default)]
    holdings: Vec<Holding>,
    #[serde(default)]
    sector_weightings: Vec<HashMap<String, RawValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Holding {
    symbol: String,
    holding_name: Option<String>,
    holding_percent: RawValue,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

/// Yahoo Finance market data provider
pub struct YahooProvider {
    client: Client,
    retry: RetryPolicy,
}

impl YahooProvider {
    pub fn new(retry: RetryPolicy) -> Result<Self, PricingError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; PerfanaBot/1.0)")
            .timeout(retry.timeout)
            .build()
            .map_err(request_error)?;
        Ok(Self { client, retry })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PricingError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(request_error)?;

        if !response.status().is_success() {
            return Err(PricingError::Request {
                provider: PROVIDER,
                message: format!("HTTP status {}", response.status()),
            });
        }

        response.json::<T>().await.map_err(request_error)
    }

    async fn chart(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<ChartResult, PricingError> {
        let from_timestamp = from.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp());
        let to_timestamp = to.and_hms_opt(23, 59, 59).map(|d| d.and_utc().timestamp());
        let (Some(period1), Some(period2)) = (from_timestamp, to_timestamp) else {
            return Err(PricingError::NoData {
                provider: PROVIDER,
                symbol: symbol.to_string(),
            });
        };

        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d&events=split",
            CHART_URL, symbol, period1, period2
        );
        let data: ChartResponse = self.get_json(&url).await?;
        chart_result(data, symbol)
    }
}

fn request_error(err: reqwest::Error) -> PricingError {
    PricingError::Request {
        provider: PROVIDER,
        message: err.to_string(),
    }
}

fn no_data(symbol: &str) -> PricingError {
    PricingError::NoData {
        provider: PROVIDER,
        symbol: symbol.to_string(),
    }
}

/// Convert a JSON float to a decimal with a bounded scale
fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(value).map(|d| d.round_dp(8).normalize())
}

fn chart_result(data: ChartResponse, symbol: &str) -> Result<ChartResult, PricingError> {
    if let Some(error) = data.chart.error {
        debug!("Yahoo chart error for {}: {} - {}", symbol, error.code, error.description);
        return Err(no_data(symbol));
    }
    data.chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| no_data(symbol))
}

/// Daily bars from a chart result; days without a close are skipped
fn price_points(result: &ChartResult) -> Vec<PricePoint> {
    let timestamps = result.timestamp.as_deref().unwrap_or_default();
    let closes = result
        .indicators
        .quote
        .first()
        .and_then(|q| q.close.as_deref())
        .unwrap_or_default();
    let adj_closes = result
        .indicators
        .adjclose
        .as_ref()
        .and_then(|a| a.first())
        .and_then(|a| a.adjclose.as_deref())
        .unwrap_or_default();

    let mut points: Vec<PricePoint> = Vec::with_capacity(timestamps.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        let Some(date) = chrono::DateTime::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
        else {
            continue;
        };
        let Some(close) = closes.get(i).copied().flatten().and_then(to_decimal) else {
            continue;
        };
        let adj_close = adj_closes
            .get(i)
            .copied()
            .flatten()
            .and_then(to_decimal)
            .unwrap_or(close);

        // Intraday bars for the current session share a date with the last close
        if points.last().is_some_and(|p| p.date == date) {
            points.pop();
        }
        points.push(PricePoint {
            date,
            close,
            adj_close,
        });
    }
    points
}

fn split_events(result: &ChartResult) -> Vec<SplitEvent> {
    let mut splits: Vec<SplitEvent> = result
        .events
        .as_ref()
        .and_then(|e| e.splits.as_ref())
        .map(|splits| {
            splits
                .values()
                .filter(|s| s.denominator != 0.0)
                .filter_map(|s| {
                    let date = chrono::DateTime::from_timestamp(s.date, 0)?.date_naive();
                    let ratio = to_decimal(s.numerator / s.denominator)?;
                    Some(SplitEvent { date, ratio })
                })
                .collect()
        })
        .unwrap_or_default();
    splits.sort_by_key(|s| s.date);
    splits
}

/// Yahoo reports sector weights with keys like `consumer_cyclical`
fn sector_label(key: &str) -> String {
    match key {
        "realestate" => "Real Estate".to_string(),
        "financial_services" => "Financial Services".to_string(),
        "communication_services" => "Communication Services".to_string(),
        other => other
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn fund_profile_from(holdings: TopHoldings) -> FundProfile {
    let sector_weights = holdings
        .sector_weightings
        .into_iter()
        .flat_map(|entry| entry.into_iter())
        .filter_map(|(key, value)| Some((sector_label(&key), to_decimal(value.raw?)?)))
        .collect();

    let holdings = holdings
        .holdings
        .into_iter()
        .filter_map(|h| {
            Some(FundHolding {
                symbol: h.symbol,
                name: h.holding_name,
                weight: to_decimal(h.holding_percent.raw?)?,
            })
        })
        .collect();

    FundProfile {
        sector_weights,
        holdings,
    }
}

impl YahooProvider {
    async fn summary(&self, symbol: &str, modules: &str) -> Result<SummaryResult, PricingError> {
        let url = format!("{}/{}?modules={}", SUMMARY_URL, symbol, modules);
        let data: SummaryResponse = self.get_json(&url).await?;
        if let Some(error) = data.quote_summary.error {
            debug!("Yahoo summary error for {}: {} - {}", symbol, error.code, error.description);
            return Err(no_data(symbol));
        }
        data.quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| no_data(symbol))
    }
}

impl MarketData for YahooProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, PricingError> {
        info!("Fetching historical prices for {} from {} to {}", symbol, from, to);
        let result = self
            .retry
            .run(symbol, move || self.chart(symbol, from, to))
            .await?;
        let points = price_points(&result);
        if points.is_empty() {
            return Err(no_data(symbol));
        }
        debug!("Fetched {} historical prices for {}", points.len(), symbol);
        Ok(points)
    }

    async fn splits(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SplitEvent>, PricingError> {
        let result = self
            .retry
            .run(symbol, move || self.chart(symbol, from, to))
            .await?;
        Ok(split_events(&result))
    }

    async fn resolve_isin(&self, isin: &str) -> Result<Option<String>, PricingError> {
        let url = format!("{}?q={}&quotesCount=1&newsCount=0", SEARCH_URL, isin);
        let url = url.as_str();
        let data: SearchResponse = self
            .retry
            .run(isin, move || self.get_json::<SearchResponse>(url))
            .await?;
        Ok(data.quotes.into_iter().next().map(|q| q.symbol))
    }

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, PricingError> {
        let result = self
            .retry
            .run(symbol, move || self.summary(symbol, "assetProfile"))
            .await?;
        let profile = result.asset_profile.ok_or_else(|| no_data(symbol))?;
        Ok(CompanyProfile {
            sector: profile.sector,
            industry: profile.industry,
            country: profile.country,
        })
    }

    async fn fund_profile(&self, symbol: &str) -> Result<FundProfile, PricingError> {
        let result = self
            .retry
            .run(symbol, move || self.summary(symbol, "topHoldings"))
            .await?;
        let holdings = result.top_holdings.ok_or_else(|| no_data(symbol))?;
        Ok(fund_profile_from(holdings))
    }
}
