//! Network phase that runs before preprocessing.
//!
//! Collects every outside lookup the ledger needs (ISIN resolution, ticker
//! validation, split tables, company profiles) into an [`EnrichmentData`]
//! value. Individual lookup failures are logged and degrade to "no data".

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::importers::RawTransaction;
use crate::ledger::preprocess::{classify_row, provider_symbol};
use crate::ledger::{EnrichmentData, InstrumentType};
use crate::pricing::{history_window, MarketData};

static ISIN_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").ok());

/// Two-letter country code, nine alphanumerics, one check digit
pub fn is_isin(text: &str) -> bool {
    ISIN_PATTERN.as_ref().is_some_and(|re| re.is_match(text))
}

/// Progress of the enrichment phase, for UI rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentEvent {
    ResolvedIsin { isin: String, symbol: Option<String> },
    Validated { symbol: String, supported: bool, done: usize, total: usize },
    Finished { supported: usize, total: usize },
}

/// Look up everything preprocessing needs for `raw`, up to `to`
pub async fn gather<P, F>(
    raw: &[RawTransaction],
    provider: &P,
    to: NaiveDate,
    progress: &mut F,
) -> EnrichmentData
where
    P: MarketData,
    F: FnMut(&EnrichmentEvent),
{
    let mut data = EnrichmentData::default();

    let classified: Vec<(&RawTransaction, InstrumentType)> = raw
        .iter()
        .filter_map(|row| classify_row(row).ok().map(|(kind, _)| (row, kind)))
        .collect();

    let Some(inception) = classified.iter().map(|(row, _)| row.date).min() else {
        return data;
    };
    let (from, to) = history_window(inception, to);

    // ISIN resolution for equities
    let isins: BTreeSet<String> = classified
        .iter()
        .filter(|(_, kind)| matches!(kind, InstrumentType::Stock | InstrumentType::Etf))
        .filter_map(|(row, _)| row.isin.as_ref().map(|isin| isin.trim().to_uppercase()))
        .filter(|isin| {
            let valid = is_isin(isin);
            if !valid && !isin.is_empty() {
                warn!("Ignoring malformed ISIN {}", isin);
            }
            valid
        })
        .collect();

    for isin in isins {
        let symbol = match provider.resolve_isin(&isin).await {
            Ok(symbol) => symbol.map(|s| s.to_uppercase()),
            Err(e) => {
                warn!("Could not resolve ISIN {}: {}", isin, e);
                None
            }
        };
        progress(&EnrichmentEvent::ResolvedIsin {
            isin: isin.clone(),
            symbol: symbol.clone(),
        });
        if let Some(symbol) = symbol {
            data.isin_symbols.insert(isin, symbol);
        }
    }

    // Provider symbols, keyed to whether category metadata is still missing
    let mut symbols: BTreeMap<String, (InstrumentType, bool)> = BTreeMap::new();
    for (row, kind) in &classified {
        if !kind.is_priced() {
            continue;
        }
        let symbol = provider_symbol(row, *kind, &data.isin_symbols);
        let missing_metadata = row.sector.is_none() || row.industry.is_none() || row.country.is_none();
        let entry = symbols.entry(symbol).or_insert((*kind, false));
        entry.1 |= missing_metadata;
    }

    let total = symbols.len();
    for (done, (symbol, (kind, missing_metadata))) in symbols.iter().enumerate() {
        let supported = match provider.history(symbol, from, to).await {
            Ok(points) => !points.is_empty(),
            Err(e) => {
                warn!("{} has no price history at {}: {}", symbol, provider.name(), e);
                false
            }
        };
        progress(&EnrichmentEvent::Validated {
            symbol: symbol.clone(),
            supported,
            done: done + 1,
            total,
        });
        if !supported {
            continue;
        }
        data.supported.insert(symbol.clone());

        if matches!(kind, InstrumentType::Stock | InstrumentType::Etf) {
            match provider.splits(symbol, from, to).await {
                Ok(splits) if !splits.is_empty() => {
                    debug!("{} has {} split(s)", symbol, splits.len());
                    data.splits.insert(symbol.clone(), splits);
                }
                Ok(_) => {}
                Err(e) => warn!("Could not load splits for {}: {}", symbol, e),
            }
        }

        if *kind == InstrumentType::Stock && *missing_metadata {
            match provider.profile(symbol).await {
                Ok(profile) => {
                    data.profiles.insert(symbol.clone(), profile);
                }
                Err(e) => warn!("Could not load profile for {}: {}", symbol, e),
            }
        }
    }

    info!("{} of {} symbols supported by {}", data.supported.len(), total, provider.name());
    progress(&EnrichmentEvent::Finished {
        supported: data.supported.len(),
        total,
    });
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SplitEvent;
    use crate::pricing::testing::StaticProvider;
    use crate::pricing::CompanyProfile;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn raw(kind: &str, ticker: &str, isin: Option<&str>) -> RawTransaction {
        RawTransaction {
            row: 1,
            date: day(8),
            instrument_type: kind.to_string(),
            ticker: ticker.to_string(),
            isin: isin.map(str::to_string),
            side: "buy".to_string(),
            quantity: dec!(1),
            price: dec!(10),
            fees: Decimal::ZERO,
            currency: "USD".to_string(),
            premium: None,
            sector: None,
            industry: None,
            country: None,
            region: None,
        }
    }

    #[tokio::test]
    async fn test_gather_collects_lookups() {
        let mut provider = StaticProvider::default()
            .with_closes("AAPL", &[(day(8), dec!(100))])
            .with_closes("BTC-USD", &[(day(8), dec!(40000))]);
        provider.isins.insert("US0378331005".to_string(), "AAPL".to_string());
        provider.splits.insert(
            "AAPL".to_string(),
            vec![SplitEvent { date: day(20), ratio: dec!(4) }],
        );
        provider.profiles.insert(
            "AAPL".to_string(),
            CompanyProfile {
                sector: Some("Technology".to_string()),
                ..Default::default()
            },
        );

        let rows = vec![
            raw("STOCK", "APPLE", Some("us0378331005")),
            raw("CRYPTO", "BTC", None),
            raw("STOCK", "GONE", None),
            raw("CASH", "USD", None),
            raw("BOND", "XYZ", None),
        ];

        let mut events = Vec::new();
        let data = gather(&rows, &provider, day(31), &mut |e: &EnrichmentEvent| events.push(e.clone())).await;

        assert_eq!(data.isin_symbols.get("US0378331005").map(String::as_str), Some("AAPL"));
        assert!(data.supported.contains("AAPL"));
        assert!(data.supported.contains("BTC-USD"));
        assert!(!data.supported.contains("GONE"));
        assert_eq!(data.splits["AAPL"].len(), 1);
        assert!(data.profiles.contains_key("AAPL"));
        assert_eq!(events.last(), Some(&EnrichmentEvent::Finished { supported: 2, total: 3 }));
    }

    #[tokio::test]
    async fn test_gather_on_empty_input() {
        let provider = StaticProvider::default();
        let data = gather(&[], &provider, day(31), &mut |_: &EnrichmentEvent| {}).await;
        assert!(data.supported.is_empty());
    }

    #[test]
    fn test_isin_shape() {
        assert!(is_isin("US0378331005"));
        assert!(is_isin("IE00B4L5Y983"));
        assert!(!is_isin("US037833100"));
        assert!(!is_isin("us0378331005"));
        assert!(!is_isin("AAPL"));
    }
}
