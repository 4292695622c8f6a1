// Ledger module - normalized transactions and their preprocessing

pub mod preprocess;
pub mod regions;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub use preprocess::{
    preprocess, preprocess_imported, DropReason, DroppedRow, EnrichmentData, PreprocessOutcome,
    SplitEvent,
};

/// Placeholder used when a categorical field cannot be determined
pub const UNKNOWN_CATEGORY: &str = "-";

/// Instrument types supported by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentType {
    Stock,
    Etf,
    Crypto,
    Cash,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Stock => "STOCK",
            InstrumentType::Etf => "ETF",
            InstrumentType::Crypto => "CRYPTO",
            InstrumentType::Cash => "CASH",
        }
    }

    /// Instruments that carry a price series and enter the state tables
    pub fn is_priced(&self) -> bool {
        !matches!(self, InstrumentType::Cash)
    }

    /// Crypto trades around the clock and has no adjusted close
    pub fn uses_adjusted_close(&self) -> bool {
        !matches!(self, InstrumentType::Crypto)
    }
}

impl FromStr for InstrumentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" | "EQUITY" => Ok(InstrumentType::Stock),
            "ETF" => Ok(InstrumentType::Etf),
            "CRYPTO" => Ok(InstrumentType::Crypto),
            "CASH" => Ok(InstrumentType::Cash),
            _ => Err(()),
        }
    }
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
    Deposit,
    Withdrawal,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Deposit => "DEPOSIT",
            Side::Withdrawal => "WITHDRAWAL",
        }
    }

    /// Multiplier applied to the absolute quantity: +1 for money/units in, -1 for out
    pub fn signal(&self) -> Decimal {
        match self {
            Side::Buy | Side::Deposit => Decimal::ONE,
            Side::Sell | Side::Withdrawal => Decimal::NEGATIVE_ONE,
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            "DEPOSIT" => Ok(Side::Deposit),
            "WITHDRAWAL" => Ok(Side::Withdrawal),
            _ => Err(()),
        }
    }
}

/// A preprocessed ledger entry.
///
/// `quantity` is signed according to `side` and already adjusted for every
/// split that happened after `date`. `investment` is `quantity * price + fees`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub instrument_type: InstrumentType,
    pub ticker: String,
    pub isin: Option<String>,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub investment: Decimal,
    pub currency: String,
    pub premium: Option<Decimal>,
    pub sector: String,
    pub industry: String,
    pub country: String,
    pub region: String,
}

/// Cleaned, immutable transaction ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    tickers: BTreeMap<InstrumentType, Vec<String>>,
    tickers_list: Vec<String>,
}

impl Ledger {
    /// Build a ledger from transactions already sorted by date
    pub fn new(transactions: Vec<Transaction>) -> Self {
        let mut tickers: BTreeMap<InstrumentType, Vec<String>> = BTreeMap::new();
        for tx in &transactions {
            let entry = tickers.entry(tx.instrument_type).or_default();
            if !entry.contains(&tx.ticker) {
                entry.push(tx.ticker.clone());
            }
        }

        let tickers_list = tickers
            .iter()
            .filter(|(kind, _)| kind.is_priced())
            .flat_map(|(_, list)| list.iter().cloned())
            .collect();

        Self {
            transactions,
            tickers,
            tickers_list,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Date of the earliest transaction
    pub fn inception_date(&self) -> Option<NaiveDate> {
        self.transactions.first().map(|tx| tx.date)
    }

    /// Distinct tickers grouped by instrument type (cash included)
    pub fn tickers(&self) -> &BTreeMap<InstrumentType, Vec<String>> {
        &self.tickers
    }

    /// Distinct priced tickers, cash excluded
    pub fn tickers_list(&self) -> &[String] {
        &self.tickers_list
    }

    /// Trades of priced instruments, in date order
    pub fn asset_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.instrument_type.is_priced())
    }

    pub fn instrument_type_of(&self, ticker: &str) -> Option<InstrumentType> {
        self.transactions
            .iter()
            .find(|tx| tx.ticker == ticker)
            .map(|tx| tx.instrument_type)
    }

    /// First transaction recorded for a ticker, used for categorical metadata
    pub fn first_transaction_of(&self, ticker: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.ticker == ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(ticker: &str, kind: InstrumentType, side: Side, qty: Decimal) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            instrument_type: kind,
            ticker: ticker.to_string(),
            isin: None,
            side,
            quantity: qty,
            price: dec!(1),
            fees: Decimal::ZERO,
            investment: qty,
            currency: "USD".to_string(),
            premium: None,
            sector: UNKNOWN_CATEGORY.to_string(),
            industry: UNKNOWN_CATEGORY.to_string(),
            country: UNKNOWN_CATEGORY.to_string(),
            region: UNKNOWN_CATEGORY.to_string(),
        }
    }

    #[test]
    fn test_side_parsing_is_case_insensitive() {
        assert_eq!(Side::from_str("buy"), Ok(Side::Buy));
        assert_eq!(Side::from_str(" Withdrawal "), Ok(Side::Withdrawal));
        assert!(Side::from_str("transfer").is_err());
    }

    #[test]
    fn test_signal_matches_side() {
        assert_eq!(Side::Buy.signal(), Decimal::ONE);
        assert_eq!(Side::Deposit.signal(), Decimal::ONE);
        assert_eq!(Side::Sell.signal(), Decimal::NEGATIVE_ONE);
        assert_eq!(Side::Withdrawal.signal(), Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn test_tickers_list_excludes_cash() {
        let ledger = Ledger::new(vec![
            tx("USD", InstrumentType::Cash, Side::Deposit, dec!(1000)),
            tx("AAPL", InstrumentType::Stock, Side::Buy, dec!(5)),
            tx("BTC-USD", InstrumentType::Crypto, Side::Buy, dec!(0.1)),
            tx("AAPL", InstrumentType::Stock, Side::Sell, dec!(-2)),
        ]);

        assert_eq!(ledger.tickers_list(), &["AAPL".to_string(), "BTC-USD".to_string()]);
        assert_eq!(ledger.tickers()[&InstrumentType::Cash], vec!["USD".to_string()]);
        assert_eq!(ledger.tickers()[&InstrumentType::Stock], vec!["AAPL".to_string()]);
        assert_eq!(ledger.asset_transactions().count(), 3);
    }
}
