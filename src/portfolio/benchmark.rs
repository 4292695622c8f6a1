//! Replays the portfolio's cash flows against a single benchmark instrument.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::state::{build_state, HistoricalTradeData, StateTrade};
use super::PortfolioSnapshot;
use crate::error::EngineError;
use crate::metrics::{align, Series};
use crate::pricing::{MarketData, PricePoint};

/// An asset transaction mirrored into the benchmark
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkTrade {
    pub date: NaiveDate,
    pub ticker: String,
    pub investment: Decimal,
    pub benchmark_close: Decimal,
    pub benchmark_quantity: Decimal,
    pub benchmark_investment: Decimal,
    pub benchmark_value: Decimal,
    pub abs_return: Decimal,
    pub pct_return: Decimal,
    /// Investment not replicated because of whole-share rounding
    pub investment_delta: Decimal,
}

/// The benchmark replay of a portfolio
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkSide {
    pub symbol: String,
    pub prices: Vec<PricePoint>,
    pub trades: Vec<BenchmarkTrade>,
    pub state: HistoricalTradeData,
    pub full_shares: bool,
}

/// Portfolio and benchmark state with return series of equal length
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkedSnapshot {
    pub portfolio: PortfolioSnapshot,
    pub benchmark: BenchmarkSide,
    pub portfolio_returns: Series,
    pub benchmark_returns: Series,
}

impl BenchmarkedSnapshot {
    /// Default evaluation date for period filters
    pub fn as_of(&self) -> Option<NaiveDate> {
        self.portfolio_returns.last_date()
    }

    /// Note shown to the user when benchmark quantities were rounded down
    pub fn parity_disclosure(&self) -> Option<String> {
        if !self.benchmark.full_shares {
            return None;
        }
        let unreplicated: Decimal = self.benchmark.trades.iter().map(|t| t.investment_delta).sum();
        Some(format!(
            "Benchmark holds whole shares of {} only; investment parity is no longer exact ({} not replicated)",
            self.benchmark.symbol,
            unreplicated.round_dp(2)
        ))
    }
}

/// Close on `date`, carrying the last close forward; dates before the series use its first close
fn close_on(prices: &[PricePoint], date: NaiveDate) -> Decimal {
    let idx = prices.partition_point(|p| p.date <= date);
    match idx {
        0 => prices.first().map(|p| p.adj_close).unwrap_or(Decimal::ZERO),
        i => prices[i - 1].adj_close,
    }
}

/// Mirror every asset transaction of the portfolio into the benchmark
pub fn build_benchmark_trades(
    snapshot: &PortfolioSnapshot,
    prices: &[PricePoint],
    full_shares: bool,
) -> Vec<BenchmarkTrade> {
    let last_close = prices.last().map(|p| p.adj_close).unwrap_or(Decimal::ZERO);

    snapshot
        .ledger
        .asset_transactions()
        .map(|tx| {
            let close = close_on(prices, tx.date);
            let mut quantity = if close.is_zero() {
                Decimal::ZERO
            } else {
                tx.investment / close
            };
            if full_shares {
                quantity = quantity.floor();
            }
            let benchmark_investment = close * quantity;
            let benchmark_value = quantity * last_close;
            let abs_return = benchmark_value - benchmark_investment;
            let pct_return = if benchmark_investment.is_zero() {
                Decimal::ZERO
            } else {
                abs_return / benchmark_investment.abs()
            };

            BenchmarkTrade {
                date: tx.date,
                ticker: tx.ticker.clone(),
                investment: tx.investment,
                benchmark_close: close,
                benchmark_quantity: quantity,
                benchmark_investment,
                benchmark_value,
                abs_return,
                pct_return,
                investment_delta: tx.investment - benchmark_investment,
            }
        })
        .collect()
}

/// Attach an already downloaded benchmark price history to a snapshot
pub fn apply_benchmark(
    snapshot: PortfolioSnapshot,
    symbol: &str,
    mut prices: Vec<PricePoint>,
    full_shares: bool,
) -> Result<BenchmarkedSnapshot, EngineError> {
    if prices.is_empty() {
        return Err(EngineError::BenchmarkNotFound(symbol.to_string()));
    }
    prices.sort_by_key(|p| p.date);

    let trades = build_benchmark_trades(&snapshot, &prices, full_shares);
    if full_shares {
        warn!("Benchmark quantities rounded down to whole shares; investment parity is approximate");
    }

    let movements: Vec<StateTrade> = trades
        .iter()
        .map(|t| StateTrade {
            date: t.date,
            ticker: symbol.to_string(),
            quantity: t.benchmark_quantity,
            investment: t.benchmark_investment,
        })
        .collect();

    let mut closes = BTreeMap::new();
    closes.insert(
        symbol.to_string(),
        prices.iter().map(|p| (p.date, p.adj_close)).collect::<Vec<_>>(),
    );

    // Same calendar as the portfolio so the two return series line up
    let state = build_state(
        &movements,
        &[symbol.to_string()],
        &closes,
        &snapshot.trade_data.dates,
    );
    let benchmark_returns = Series::new(state.dates.clone(), state.pct_return.total().to_vec());
    let (portfolio_returns, benchmark_returns) = align(&snapshot.returns, &benchmark_returns);

    info!("Benchmark {} replayed over {} days", symbol, state.len());

    Ok(BenchmarkedSnapshot {
        portfolio: snapshot,
        benchmark: BenchmarkSide {
            symbol: symbol.to_string(),
            prices,
            trades,
            state,
            full_shares,
        },
        portfolio_returns,
        benchmark_returns,
    })
}

/// Download `symbol` and replay the portfolio's cash flows against it
pub async fn set_benchmark<P: MarketData>(
    snapshot: PortfolioSnapshot,
    symbol: &str,
    full_shares: bool,
    provider: &P,
) -> Result<BenchmarkedSnapshot, EngineError> {
    let symbol = symbol.trim().to_uppercase();
    let (Some(inception), Some(last)) = (snapshot.inception_date(), snapshot.last_date()) else {
        return Err(EngineError::EmptyLedger);
    };
    let from = inception - Duration::days(1);

    let prices = match provider.history(&symbol, from, last).await {
        Ok(prices) => prices,
        Err(e) => {
            warn!("Benchmark {} could not be loaded: {}", symbol, e);
            Vec::new()
        }
    };
    apply_benchmark(snapshot, &symbol, prices, full_shares)
}
