//! Pure transformation from raw ledger rows to a cleaned [`Ledger`].
//!
//! Everything that needs the network (split tables, ISIN resolution, ticker
//! validation, company profiles) is gathered beforehand by the enrichment
//! phase and passed in as [`EnrichmentData`], so this step is deterministic.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::{debug, warn};

use super::regions::region_of;
use super::{InstrumentType, Ledger, Side, Transaction, UNKNOWN_CATEGORY};
use crate::importers::{ImportedLedger, RawTransaction};
use crate::pricing::CompanyProfile;

/// Literal used for every categorical field of crypto assets
pub const CRYPTO_CATEGORY: &str = "Crypto";

/// A stock split effective on `date`; `ratio` is new shares per old share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitEvent {
    pub date: NaiveDate,
    pub ratio: Decimal,
}

/// Lookups collected by the enrichment phase, keyed by provider symbol
#[derive(Debug, Clone, Default)]
pub struct EnrichmentData {
    /// ISIN -> provider-native ticker
    pub isin_symbols: HashMap<String, String>,
    /// Provider symbols confirmed to have price history
    pub supported: HashSet<String>,
    pub splits: HashMap<String, Vec<SplitEvent>>,
    pub profiles: HashMap<String, CompanyProfile>,
}

/// Why a row did not make it into the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    UnknownSide(String),
    UnsupportedType(String),
    UnsupportedTicker,
    /// The importer could not parse the row
    Unreadable(String),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::UnknownSide(side) => write!(f, "unknown side '{}'", side),
            DropReason::UnsupportedType(kind) => write!(f, "unsupported instrument type '{}'", kind),
            DropReason::UnsupportedTicker => write!(f, "ticker not found at price provider"),
            DropReason::Unreadable(detail) => write!(f, "unreadable row: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    /// Row number in the import file (1-indexed, header excluded)
    pub row: usize,
    pub ticker: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone)]
pub struct PreprocessOutcome {
    pub ledger: Ledger,
    pub dropped: Vec<DroppedRow>,
}

/// Row classification that needs no lookups: parsed side and type, or the reason to drop it
pub fn classify_row(raw: &RawTransaction) -> Result<(InstrumentType, Side), DropReason> {
    let kind = InstrumentType::from_str(&raw.instrument_type)
        .map_err(|_| DropReason::UnsupportedType(raw.instrument_type.trim().to_uppercase()))?;
    let side = Side::from_str(&raw.side)
        .map_err(|_| DropReason::UnknownSide(raw.side.trim().to_lowercase()))?;
    Ok((kind, side))
}

/// Symbol the market data provider knows this row by, before validation.
///
/// Crypto becomes `SYMBOL-CURRENCY`; equities prefer the ISIN resolution when
/// one is available; cash keeps its ticker.
pub fn provider_symbol(
    raw: &RawTransaction,
    kind: InstrumentType,
    isin_symbols: &HashMap<String, String>,
) -> String {
    let ticker = raw.ticker.trim().to_uppercase();
    match kind {
        InstrumentType::Crypto => {
            let currency = raw.currency.trim().to_uppercase();
            if ticker.contains('-') || currency.is_empty() {
                ticker
            } else {
                format!("{}-{}", ticker, currency)
            }
        }
        InstrumentType::Stock | InstrumentType::Etf => raw
            .isin
            .as_deref()
            .map(|isin| isin.trim().to_uppercase())
            .and_then(|isin| isin_symbols.get(&isin).cloned())
            .unwrap_or(ticker),
        InstrumentType::Cash => ticker,
    }
}

/// Clean, sign, split-adjust and back-fill raw rows into a [`Ledger`]
pub fn preprocess(raw: &[RawTransaction], enrichment: &EnrichmentData) -> PreprocessOutcome {
    let mut dropped = Vec::new();
    let mut transactions = Vec::new();

    for row in raw {
        let (kind, side) = match classify_row(row) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!("Dropping row {} ({}): {}", row.row, row.ticker, reason);
                dropped.push(DroppedRow {
                    row: row.row,
                    ticker: row.ticker.trim().to_uppercase(),
                    reason,
                });
                continue;
            }
        };

        let ticker = provider_symbol(row, kind, &enrichment.isin_symbols);
        if kind.is_priced() && !enrichment.supported.contains(&ticker) {
            warn!("Dropping row {}: {} is not supported by the price provider", row.row, ticker);
            dropped.push(DroppedRow {
                row: row.row,
                ticker,
                reason: DropReason::UnsupportedTicker,
            });
            continue;
        }

        let mut quantity = row.quantity.abs() * side.signal();
        let mut price = row.price;
        if let Some(splits) = enrichment.splits.get(&ticker) {
            for split in splits.iter().filter(|s| row.date < s.date) {
                if split.ratio.is_zero() {
                    continue;
                }
                debug!("Adjusting {} on {} for split {} on {}", ticker, row.date, split.ratio, split.date);
                quantity *= split.ratio;
                price /= split.ratio;
            }
        }

        transactions.push(Transaction {
            date: row.date,
            instrument_type: kind,
            ticker,
            isin: row.isin.as_ref().map(|s| s.trim().to_uppercase()),
            side,
            quantity,
            price,
            fees: row.fees,
            investment: quantity * price + row.fees,
            currency: row.currency.trim().to_uppercase(),
            premium: row.premium,
            sector: clean_category(row.sector.as_deref()),
            industry: clean_category(row.industry.as_deref()),
            country: clean_category(row.country.as_deref()),
            region: clean_category(row.region.as_deref()),
        });
    }

    transactions.sort_by_key(|tx| tx.date);
    backfill_categories(&mut transactions, &enrichment.profiles);

    PreprocessOutcome {
        ledger: Ledger::new(transactions),
        dropped,
    }
}

/// [`preprocess`] over an imported file, reporting rows the importer skipped as dropped
pub fn preprocess_imported(imported: &ImportedLedger, enrichment: &EnrichmentData) -> PreprocessOutcome {
    let mut outcome = preprocess(&imported.rows, enrichment);
    outcome.dropped.extend(imported.skipped.iter().map(|skipped| DroppedRow {
        row: skipped.row,
        ticker: skipped.ticker.to_uppercase(),
        reason: DropReason::Unreadable(skipped.reason.clone()),
    }));
    outcome.dropped.sort_by_key(|d| d.row);
    outcome
}

fn clean_category(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN_CATEGORY.to_string(),
    }
}

fn is_unknown(value: &str) -> bool {
    value == UNKNOWN_CATEGORY
}

/// Fill sector/industry/country/region per ticker.
///
/// A value supplied on any row of the ticker wins; otherwise stocks use the
/// company profile, crypto uses [`CRYPTO_CATEGORY`] and the rest keep `-`.
fn backfill_categories(
    transactions: &mut [Transaction],
    profiles: &HashMap<String, CompanyProfile>,
) {
    #[derive(Default, Clone)]
    struct Categories {
        sector: Option<String>,
        industry: Option<String>,
        country: Option<String>,
        region: Option<String>,
    }

    let mut known: HashMap<String, Categories> = HashMap::new();
    for tx in transactions.iter() {
        let entry = known.entry(tx.ticker.clone()).or_default();
        for (slot, value) in [
            (&mut entry.sector, &tx.sector),
            (&mut entry.industry, &tx.industry),
            (&mut entry.country, &tx.country),
            (&mut entry.region, &tx.region),
        ] {
            if slot.is_none() && !is_unknown(value) {
                *slot = Some(value.clone());
            }
        }
    }

    for tx in transactions.iter_mut() {
        let supplied = known.get(&tx.ticker).cloned().unwrap_or_default();
        let (sector, industry, country) = match tx.instrument_type {
            InstrumentType::Crypto => (
                CRYPTO_CATEGORY.to_string(),
                CRYPTO_CATEGORY.to_string(),
                CRYPTO_CATEGORY.to_string(),
            ),
            InstrumentType::Stock => {
                let profile = profiles.get(&tx.ticker);
                let pick = |supplied: Option<String>, looked_up: Option<&String>| {
                    supplied
                        .or_else(|| looked_up.cloned())
                        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
                };
                (
                    pick(supplied.sector.clone(), profile.and_then(|p| p.sector.as_ref())),
                    pick(supplied.industry.clone(), profile.and_then(|p| p.industry.as_ref())),
                    pick(supplied.country.clone(), profile.and_then(|p| p.country.as_ref())),
                )
            }
            InstrumentType::Etf | InstrumentType::Cash => (
                supplied.sector.clone().unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
                supplied.industry.clone().unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
                supplied.country.clone().unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
            ),
        };

        let region = match (tx.instrument_type, supplied.region) {
            (InstrumentType::Crypto, _) => CRYPTO_CATEGORY.to_string(),
            (_, Some(region)) => region,
            (_, None) => region_of(&country).to_string(),
        };

        tx.sector = sector;
        tx.industry = industry;
        tx.country = country;
        tx.region = region;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(row: usize, date: (i32, u32, u32), kind: &str, ticker: &str, side: &str, qty: Decimal, price: Decimal) -> RawTransaction {
        RawTransaction {
            row,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            instrument_type: kind.to_string(),
            ticker: ticker.to_string(),
            isin: None,
            side: side.to_string(),
            quantity: qty,
            price,
            fees: Decimal::ZERO,
            currency: "usd".to_string(),
            premium: None,
            sector: None,
            industry: None,
            country: None,
            region: None,
        }
    }

    fn supported(symbols: &[&str]) -> EnrichmentData {
        EnrichmentData {
            supported: symbols.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_signed_quantity_follows_side() {
        let rows = vec![
            raw(1, (2024, 1, 2), "stock", "aapl", "buy", dec!(10), dec!(100)),
            raw(2, (2024, 1, 3), "stock", "aapl", "sell", dec!(4), dec!(110)),
            raw(3, (2024, 1, 4), "stock", "aapl", "Sell", dec!(-2), dec!(110)),
            raw(4, (2024, 1, 5), "cash", "usd", "withdrawal", dec!(50), dec!(1)),
            raw(5, (2024, 1, 6), "cash", "usd", "deposit", dec!(-50), dec!(1)),
        ];
        let outcome = preprocess(&rows, &supported(&["AAPL"]));
        let qty: Vec<Decimal> = outcome.ledger.transactions().iter().map(|t| t.quantity).collect();
        assert_eq!(qty, vec![dec!(10), dec!(-4), dec!(-2), dec!(-50), dec!(50)]);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_signal_property_over_generated_rows() {
        let sides = ["buy", "sell", "deposit", "withdrawal"];
        let quantities = [dec!(-7.5), dec!(-1), dec!(0.25), dec!(3), dec!(1000)];
        let mut rows = Vec::new();
        for (i, side) in sides.iter().enumerate() {
            for (j, qty) in quantities.iter().enumerate() {
                rows.push(raw(i * 10 + j, (2024, 2, 1), "cash", "usd", side, *qty, dec!(1)));
            }
        }
        let outcome = preprocess(&rows, &EnrichmentData::default());
        for tx in outcome.ledger.transactions() {
            match tx.side {
                Side::Buy | Side::Deposit => assert!(tx.quantity > Decimal::ZERO),
                Side::Sell | Side::Withdrawal => assert!(tx.quantity < Decimal::ZERO),
            }
        }
        assert_eq!(outcome.ledger.transactions().len(), 20);
    }

    #[test]
    fn test_unknown_side_is_rejected() {
        let rows = vec![
            raw(1, (2024, 1, 2), "stock", "AAPL", "buy", dec!(10), dec!(100)),
            raw(2, (2024, 1, 3), "stock", "AAPL", "transfer", dec!(4), dec!(110)),
        ];
        let outcome = preprocess(&rows, &supported(&["AAPL"]));
        assert_eq!(outcome.ledger.transactions().len(), 1);
        assert_eq!(
            outcome.dropped,
            vec![DroppedRow {
                row: 2,
                ticker: "AAPL".to_string(),
                reason: DropReason::UnknownSide("transfer".to_string()),
            }]
        );
    }

    #[test]
    fn test_unsupported_type_and_ticker_are_dropped() {
        let rows = vec![
            raw(1, (2024, 1, 2), "bond", "XYZ", "buy", dec!(1), dec!(100)),
            raw(2, (2024, 1, 2), "stock", "NOPE", "buy", dec!(1), dec!(100)),
            raw(3, (2024, 1, 2), "stock", "MSFT", "buy", dec!(1), dec!(100)),
        ];
        let outcome = preprocess(&rows, &supported(&["MSFT"]));
        assert_eq!(outcome.ledger.tickers_list(), &["MSFT".to_string()]);
        assert_eq!(outcome.dropped.len(), 2);
        assert_eq!(outcome.dropped[0].reason, DropReason::UnsupportedType("BOND".to_string()));
        assert_eq!(outcome.dropped[1].reason, DropReason::UnsupportedTicker);
    }

    #[test]
    fn test_unreadable_rows_are_reported_in_row_order() {
        let imported = ImportedLedger {
            rows: vec![
                raw(1, (2024, 1, 2), "stock", "MSFT", "buy", dec!(1), dec!(100)),
                raw(3, (2024, 1, 4), "bond", "XYZ", "buy", dec!(1), dec!(100)),
            ],
            skipped: vec![crate::importers::SkippedRow {
                row: 2,
                ticker: "aapl".to_string(),
                reason: "malformed thousands grouping in '2,5'".to_string(),
            }],
        };
        let outcome = preprocess_imported(&imported, &supported(&["MSFT"]));
        assert_eq!(outcome.ledger.transactions().len(), 1);
        let rows: Vec<usize> = outcome.dropped.iter().map(|d| d.row).collect();
        assert_eq!(rows, vec![2, 3]);
        assert_eq!(outcome.dropped[0].ticker, "AAPL");
        assert_eq!(
            outcome.dropped[0].reason.to_string(),
            "unreadable row: malformed thousands grouping in '2,5'"
        );
    }

    #[test]
    fn test_split_adjusts_only_earlier_transactions() {
        let rows = vec![
            raw(1, (2020, 1, 2), "stock", "AAPL", "buy", dec!(10), dec!(300)),
            raw(2, (2020, 8, 31), "stock", "AAPL", "buy", dec!(4), dec!(125)),
        ];
        let mut enrichment = supported(&["AAPL"]);
        enrichment.splits.insert(
            "AAPL".to_string(),
            vec![SplitEvent {
                date: NaiveDate::from_ymd_opt(2020, 8, 31).unwrap(),
                ratio: dec!(4),
            }],
        );

        let outcome = preprocess(&rows, &enrichment);
        let txs = outcome.ledger.transactions();
        assert_eq!(txs[0].quantity, dec!(40));
        assert_eq!(txs[0].price, dec!(75));
        assert_eq!(txs[0].investment, dec!(3000));
        assert_eq!(txs[1].quantity, dec!(4));
        assert_eq!(txs[1].price, dec!(125));
    }

    #[test]
    fn test_investment_includes_fees_and_is_negative_for_sales() {
        let mut sale = raw(1, (2024, 1, 2), "stock", "AAPL", "sell", dec!(5), dec!(110));
        sale.fees = dec!(1.5);
        let outcome = preprocess(&[sale], &supported(&["AAPL"]));
        assert_eq!(outcome.ledger.transactions()[0].investment, dec!(-548.5));
    }

    #[test]
    fn test_crypto_symbol_and_categories() {
        let rows = vec![raw(1, (2024, 1, 2), "crypto", "btc", "buy", dec!(0.5), dec!(40000))];
        let outcome = preprocess(&rows, &supported(&["BTC-USD"]));
        let tx = &outcome.ledger.transactions()[0];
        assert_eq!(tx.ticker, "BTC-USD");
        assert_eq!(tx.sector, "Crypto");
        assert_eq!(tx.region, "Crypto");
    }

    #[test]
    fn test_isin_resolution_replaces_ticker() {
        let mut row = raw(1, (2024, 1, 2), "etf", "iwda", "buy", dec!(3), dec!(80));
        row.isin = Some("ie00b4l5y983".to_string());
        let mut enrichment = supported(&["IWDA.AS"]);
        enrichment
            .isin_symbols
            .insert("IE00B4L5Y983".to_string(), "IWDA.AS".to_string());

        let outcome = preprocess(&[row], &enrichment);
        let tx = &outcome.ledger.transactions()[0];
        assert_eq!(tx.ticker, "IWDA.AS");
        assert_eq!(tx.isin.as_deref(), Some("IE00B4L5Y983"));
        assert_eq!(tx.sector, "-");
    }

    #[test]
    fn test_stock_categories_backfilled_from_profile() {
        let mut first = raw(1, (2024, 1, 2), "stock", "AAPL", "buy", dec!(1), dec!(100));
        first.industry = Some("Consumer Electronics".to_string());
        let second = raw(2, (2024, 1, 3), "stock", "AAPL", "buy", dec!(1), dec!(100));

        let mut enrichment = supported(&["AAPL"]);
        enrichment.profiles.insert(
            "AAPL".to_string(),
            CompanyProfile {
                sector: Some("Technology".to_string()),
                industry: Some("Hardware".to_string()),
                country: Some("United States".to_string()),
            },
        );

        let outcome = preprocess(&[second, first], &enrichment);
        for tx in outcome.ledger.transactions() {
            assert_eq!(tx.sector, "Technology");
            assert_eq!(tx.industry, "Consumer Electronics");
            assert_eq!(tx.country, "United States");
            assert_eq!(tx.region, "North America");
        }
        assert_eq!(
            outcome.ledger.inception_date(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }
}
