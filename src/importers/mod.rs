// Import module - transaction ledger parsers (CSV and Excel)

pub mod ledger_csv;
pub mod ledger_excel;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Raw ledger row as read from the file, before any cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    /// Row number in the file (1-indexed, header excluded)
    pub row: usize,
    pub date: NaiveDate,
    pub instrument_type: String, // "STOCK", "ETF", "CRYPTO", "CASH"
    pub ticker: String,
    pub isin: Option<String>,
    pub side: String, // "buy", "sell", "deposit", "withdrawal"
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub currency: String,
    pub premium: Option<Decimal>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
}

/// A data row the parser could not read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Row number in the file (1-indexed, header excluded)
    pub row: usize,
    pub ticker: String,
    pub reason: String,
}

/// Everything read from a ledger file: parsed rows and the rows that failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedLedger {
    pub rows: Vec<RawTransaction>,
    pub skipped: Vec<SkippedRow>,
}

/// Column positions resolved from a header row
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnMapping {
    pub date: Option<usize>,
    pub instrument_type: Option<usize>,
    pub ticker: Option<usize>,
    pub side: Option<usize>,
    pub price: Option<usize>,
    pub quantity: Option<usize>,
    pub fees: Option<usize>,
    pub currency: Option<usize>,
    pub isin: Option<usize>,
    pub sector: Option<usize>,
    pub industry: Option<usize>,
    pub country: Option<usize>,
    pub region: Option<usize>,
    pub premium: Option<usize>,
}

impl ColumnMapping {
    /// Create column mapping by scanning header names (case-insensitive)
    pub(crate) fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut mapping = ColumnMapping::default();

        for (idx, header) in headers.into_iter().enumerate() {
            let text = header.trim().to_lowercase();
            let slot = match text.as_str() {
                "date" | "trade date" => &mut mapping.date,
                "type" | "asset type" | "instrument type" => &mut mapping.instrument_type,
                "ticker" | "symbol" => &mut mapping.ticker,
                "side" | "action" => &mut mapping.side,
                "price" | "unit price" => &mut mapping.price,
                "quantity" | "qty" | "shares" => &mut mapping.quantity,
                "fees" | "fee" | "commission" => &mut mapping.fees,
                "currency" => &mut mapping.currency,
                "isin" => &mut mapping.isin,
                "sector" => &mut mapping.sector,
                "industry" => &mut mapping.industry,
                "country" => &mut mapping.country,
                "region" => &mut mapping.region,
                "premium" => &mut mapping.premium,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(idx);
            }
        }

        mapping
    }

    /// Names of required columns that were not found
    pub(crate) fn missing_required(&self) -> Vec<&'static str> {
        [
            ("Date", self.date),
            ("Type", self.instrument_type),
            ("Ticker", self.ticker),
            ("Side", self.side),
            ("Price", self.price),
            ("Quantity", self.quantity),
        ]
        .into_iter()
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub(crate) fn ensure_valid(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Missing required columns: {}", missing.join(", ")))
        }
    }
}

/// Import a transaction ledger (auto-detects Excel vs CSV from the extension)
pub fn import_file<P: AsRef<Path>>(file_path: P) -> Result<ImportedLedger> {
    let path = file_path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("File has no extension"))?
        .to_lowercase();

    info!("Importing ledger file: {:?} (type: {})", path, extension);

    match extension.as_str() {
        "xlsx" | "xls" => ledger_excel::parse_ledger_excel(path),
        "csv" | "txt" => ledger_csv::parse_ledger_csv(path),
        _ => Err(anyhow!(
            "Unsupported file format: {}. Supported formats: .xlsx, .xls, .csv",
            extension
        )),
    }
}

/// Parse the date formats found in broker exports
pub(crate) fn parse_date_text(date_str: &str) -> Result<NaiveDate> {
    let text = date_str.trim();
    // Timestamps such as "2024-01-02 00:00:00" keep only the date part
    let text = text.split_whitespace().next().unwrap_or(text);

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date);
        }
    }

    Err(anyhow!("Could not parse date: {}", date_str))
}

/// How `,` and `.` are read in numeric text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumberFormat {
    /// `1,234.56`; comma-delimited files
    DecimalPoint,
    /// `1.234,56`; semicolon-delimited files
    DecimalComma,
    /// Spreadsheet text cells, where the file gives no hint
    Unknown,
}

static COMMA_GROUPED: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").ok());
static DOT_GROUPED: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(\.\d{3})+(,\d+)?$").ok());
static COMMA_GROUPS_ONLY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+$").ok());
static DOT_GROUPS_ONLY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(\.\d{3})+$").ok());

fn is_match(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// `text` with thousands separators removed and `.` as the decimal mark
fn normalize_separators(text: &str, format: NumberFormat) -> Result<String> {
    let comma = text.rfind(',');
    let dot = text.rfind('.');

    let comma_decimal = match (format, comma, dot) {
        (NumberFormat::DecimalComma, None, Some(_)) if is_match(&DOT_GROUPS_ONLY, text) => {
            bail!("ambiguous number '{}': thousands separator or decimal point", text);
        }
        (_, None, _) => return Ok(text.to_string()),
        (NumberFormat::DecimalPoint, Some(_), _) => false,
        (NumberFormat::DecimalComma, Some(_), _) => true,
        (NumberFormat::Unknown, Some(c), Some(d)) => c > d,
        (NumberFormat::Unknown, Some(_), None) => {
            if is_match(&COMMA_GROUPS_ONLY, text) {
                bail!("ambiguous number '{}': thousands separator or decimal comma", text);
            }
            true
        }
    };

    if comma_decimal {
        if dot.is_none() {
            if text.matches(',').count() > 1 {
                bail!("malformed number '{}'", text);
            }
            return Ok(text.replace(',', "."));
        }
        if !is_match(&DOT_GROUPED, text) {
            bail!("malformed thousands grouping in '{}'", text);
        }
        Ok(text.replace('.', "").replace(',', "."))
    } else {
        if !is_match(&COMMA_GROUPED, text) {
            bail!("malformed thousands grouping in '{}'", text);
        }
        Ok(text.replace(',', ""))
    }
}

/// Parse a numeric cell, tolerating currency symbols and thousands separators.
///
/// Groupings that do not fit `format` are rejected rather than reinterpreted.
pub(crate) fn parse_decimal_text(text: &str, format: NumberFormat) -> Result<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ' ' | '\u{a0}'))
        .collect();
    let normalized = normalize_separators(&cleaned, format)?;

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .with_context(|| format!("Failed to parse decimal: '{}'", text))
}

/// Empty cells become `None`
pub(crate) fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_column_mapping_case_insensitive() {
        let mapping = ColumnMapping::from_headers(
            ["Date", "TYPE", "ticker", "Side", "Price", "Quantity", "Fees", "Currency", "ISIN"]
                .into_iter(),
        );
        assert_eq!(mapping.date, Some(0));
        assert_eq!(mapping.instrument_type, Some(1));
        assert_eq!(mapping.isin, Some(8));
        assert!(mapping.sector.is_none());
        assert!(mapping.ensure_valid().is_ok());
    }

    #[test]
    fn test_missing_required_columns_reported() {
        let mapping = ColumnMapping::from_headers(["Date", "Ticker", "Price"].into_iter());
        let err = mapping.ensure_valid().unwrap_err().to_string();
        assert!(err.contains("Type"));
        assert!(err.contains("Side"));
        assert!(err.contains("Quantity"));
    }

    #[test]
    fn test_parse_decimal_point_format() {
        let point = NumberFormat::DecimalPoint;
        assert_eq!(parse_decimal_text("1,234.56", point).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal_text("1,000", point).unwrap(), dec!(1000));
        assert_eq!(parse_decimal_text("1,234,567", point).unwrap(), dec!(1234567));
        assert_eq!(parse_decimal_text("$ 10.50", point).unwrap(), dec!(10.50));
        assert_eq!(parse_decimal_text("-3", point).unwrap(), dec!(-3));
        assert!(parse_decimal_text("0,5", point).is_err());
        assert!(parse_decimal_text("12,34", point).is_err());
        assert!(parse_decimal_text("abc", point).is_err());
    }

    #[test]
    fn test_parse_decimal_comma_format() {
        let comma = NumberFormat::DecimalComma;
        assert_eq!(parse_decimal_text("0,5", comma).unwrap(), dec!(0.5));
        assert_eq!(parse_decimal_text("1.234,56", comma).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal_text("80.5", comma).unwrap(), dec!(80.5));
        assert!(parse_decimal_text("1.000", comma).is_err());
        assert!(parse_decimal_text("1,2,3", comma).is_err());
    }

    #[test]
    fn test_parse_decimal_unknown_format_rejects_ambiguous_groups() {
        let unknown = NumberFormat::Unknown;
        assert_eq!(parse_decimal_text("1,234.56", unknown).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal_text("1.234,56", unknown).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal_text("0,5", unknown).unwrap(), dec!(0.5));
        assert_eq!(parse_decimal_text("1000", unknown).unwrap(), dec!(1000));
        let err = parse_decimal_text("1,000", unknown).unwrap_err().to_string();
        assert!(err.contains("ambiguous"));
        assert!(parse_decimal_text("1,234,567", unknown).is_err());
    }

    #[test]
    fn test_parse_date_text() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        assert_eq!(parse_date_text("2025-03-15").unwrap(), expected);
        assert_eq!(parse_date_text("15/03/2025").unwrap(), expected);
        assert_eq!(parse_date_text("2025-03-15 00:00:00").unwrap(), expected);
        assert!(parse_date_text("March 15").is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = import_file("ledger.pdf").unwrap_err().to_string();
        assert!(err.contains("Unsupported file format"));
    }
}
