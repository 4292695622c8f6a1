// Portfolio module - state reconstruction, benchmark replay and allocation

pub mod allocation;
pub mod benchmark;
pub mod state;
pub mod trades;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::metrics::Series;
use crate::pricing::{history_window, valuation_price, MarketData, PricePoint};

pub use allocation::{AllocationCache, AllocationTable, Category};
pub use benchmark::{set_benchmark, BenchmarkSide, BenchmarkTrade, BenchmarkedSnapshot};
pub use state::{HistoricalTradeData, MetricFrame, StateTrade, TOTAL};
pub use trades::PortfolioTrade;

/// Daily bars per provider symbol
pub type PriceTable = BTreeMap<String, Vec<PricePoint>>;

/// Portfolio state rebuilt from a ledger and its price history
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub ledger: Ledger,
    pub prices: PriceTable,
    pub trade_data: HistoricalTradeData,
    pub trades: Vec<PortfolioTrade>,
    /// Daily percentage return of the Total column
    pub returns: Series,
}

impl PortfolioSnapshot {
    pub fn inception_date(&self) -> Option<NaiveDate> {
        self.ledger.inception_date()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.trade_data.dates.last().copied()
    }

    /// Last end value per priced ticker
    pub fn holdings(&self) -> Vec<(&str, Decimal)> {
        self.trade_data.end_value.last_row()
    }
}

/// Download history for every priced ticker of `ledger`
pub async fn load_prices<P: MarketData>(
    ledger: &Ledger,
    provider: &P,
    to: NaiveDate,
) -> Result<PriceTable, EngineError> {
    let inception = ledger.inception_date().ok_or(EngineError::EmptyLedger)?;
    let (from, to) = history_window(inception, to);

    let mut prices = PriceTable::new();
    for ticker in ledger.tickers_list() {
        match provider.history(ticker, from, to).await {
            Ok(points) => {
                debug!("Loaded {} prices for {}", points.len(), ticker);
                prices.insert(ticker.clone(), points);
            }
            Err(e) => {
                warn!("No price history for {}: {}", ticker, e);
                return Err(EngineError::MissingPrices(ticker.clone()));
            }
        }
    }
    Ok(prices)
}

/// Valuation closes per ticker: close for crypto, adjusted close otherwise
fn valuation_closes(ledger: &Ledger, prices: &PriceTable) -> BTreeMap<String, Vec<(NaiveDate, Decimal)>> {
    prices
        .iter()
        .map(|(ticker, points)| {
            let adjusted = ledger
                .instrument_type_of(ticker)
                .map(|kind| kind.uses_adjusted_close())
                .unwrap_or(true);
            let series = points
                .iter()
                .map(|p| (p.date, valuation_price(p, adjusted)))
                .collect();
            (ticker.clone(), series)
        })
        .collect()
}

/// Rebuild the portfolio state tables from a ledger and its prices.
///
/// Deterministic: identical inputs give equal snapshots.
pub fn generate_portfolio_data(ledger: Ledger, prices: PriceTable) -> Result<PortfolioSnapshot, EngineError> {
    if ledger.asset_transactions().next().is_none() {
        return Err(EngineError::EmptyLedger);
    }
    for ticker in ledger.tickers_list() {
        if prices.get(ticker).map_or(true, |p| p.is_empty()) {
            return Err(EngineError::MissingPrices(ticker.clone()));
        }
    }

    let closes = valuation_closes(&ledger, &prices);
    let movements: Vec<StateTrade> = ledger
        .asset_transactions()
        .map(|tx| StateTrade {
            date: tx.date,
            ticker: tx.ticker.clone(),
            quantity: tx.quantity,
            investment: tx.investment,
        })
        .collect();

    let calendar = state::calendar(&movements, &closes);
    let trade_data = state::build_state(&movements, ledger.tickers_list(), &closes, &calendar);

    let last_closes: BTreeMap<String, Decimal> = closes
        .iter()
        .filter_map(|(ticker, series)| series.last().map(|(_, close)| (ticker.clone(), *close)))
        .collect();
    let trades = trades::build_trade_table(&ledger, &last_closes);

    let returns = Series::new(trade_data.dates.clone(), trade_data.pct_return.total().to_vec());
    info!(
        "Portfolio state built: {} tickers over {} days",
        ledger.tickers_list().len(),
        trade_data.len()
    );

    Ok(PortfolioSnapshot {
        ledger,
        prices,
        trade_data,
        trades,
        returns,
    })
}

/// Load prices and build the snapshot in one step
pub async fn build_portfolio<P: MarketData>(
    ledger: Ledger,
    provider: &P,
    to: NaiveDate,
) -> Result<PortfolioSnapshot, EngineError> {
    let prices = load_prices(&ledger, provider, to).await?;
    generate_portfolio_data(ledger, prices)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::ledger::{InstrumentType, Side, Transaction};
    use rust_decimal_macros::dec;

    fn aapl_snapshot() -> PortfolioSnapshot {
        let ledger = Ledger::new(vec![
            trade(2, "AAPL", dec!(10), dec!(100)),
            trade(4, "AAPL", dec!(-4), dec!(104)),
            trade(5, "AAPL", dec!(2), dec!(110)),
        ]);
        let mut prices = PriceTable::new();
        prices.insert(
            "AAPL".to_string(),
            bars(&[(1, dec!(99)), (2, dec!(100)), (3, dec!(102)), (4, dec!(100)), (5, dec!(110))]),
        );
        generate_portfolio_data(ledger, prices).unwrap()
    }

    #[test]
    fn test_cumulative_quantity_and_returns() {
        let snapshot = aapl_snapshot();
        let data = &snapshot.trade_data;

        assert_eq!(data.dates, vec![day(2), day(3), day(4), day(5)]);
        assert_eq!(data.quantity.total(), &[dec!(10), dec!(10), dec!(6), dec!(8)]);
        assert_eq!(snapshot.returns.values[0], Decimal::ZERO);
        assert_eq!(snapshot.returns.values[1], dec!(0.02));
        // Buying on day 5 adds the 220 outflow to the base
        assert_eq!(snapshot.returns.values[3], dec!(880) / dec!(820) - Decimal::ONE);
    }

    #[test]
    fn test_generation_is_idempotent() {
        assert_eq!(aapl_snapshot(), aapl_snapshot());
    }

    #[test]
    fn test_cash_rows_do_not_enter_state() {
        let mut cash = trade(2, "USD", dec!(1000), dec!(1));
        cash.instrument_type = InstrumentType::Cash;
        cash.side = Side::Deposit;
        let ledger = Ledger::new(vec![cash, trade(2, "AAPL", dec!(1), dec!(100))]);
        let mut prices = PriceTable::new();
        prices.insert("AAPL".to_string(), bars(&[(2, dec!(100))]));

        let snapshot = generate_portfolio_data(ledger, prices).unwrap();
        assert_eq!(snapshot.trade_data.quantity.tickers(), &["AAPL".to_string()]);
        assert_eq!(snapshot.trades.len(), 1);
    }

    #[test]
    fn test_missing_prices_and_empty_ledger() {
        let ledger = Ledger::new(vec![trade(2, "AAPL", dec!(1), dec!(100))]);
        let err = generate_portfolio_data(ledger, PriceTable::new()).unwrap_err();
        assert!(matches!(err, EngineError::MissingPrices(t) if t == "AAPL"));

        let empty: Vec<Transaction> = Vec::new();
        let err = generate_portfolio_data(Ledger::new(empty), PriceTable::new()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyLedger));
    }

    #[test]
    fn test_crypto_uses_plain_close() {
        let mut btc = trade(2, "BTC-USD", dec!(1), dec!(100));
        btc.instrument_type = InstrumentType::Crypto;
        let ledger = Ledger::new(vec![btc]);
        let mut prices = PriceTable::new();
        prices.insert(
            "BTC-USD".to_string(),
            vec![PricePoint { date: day(2), close: dec!(100), adj_close: dec!(1) }],
        );
        let snapshot = generate_portfolio_data(ledger, prices).unwrap();
        assert_eq!(snapshot.trade_data.end_value.total(), &[dec!(100)]);
    }
}
