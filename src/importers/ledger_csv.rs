use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{
    non_empty, parse_date_text, parse_decimal_text, ColumnMapping, ImportedLedger, NumberFormat,
    RawTransaction, SkippedRow,
};

/// Parse a CSV transaction ledger
pub fn parse_ledger_csv<P: AsRef<Path>>(file_path: P) -> Result<ImportedLedger> {
    let path = file_path.as_ref();
    info!("Parsing ledger CSV file: {:?}", path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open CSV file {:?}", path))?;
    parse_ledger_csv_str(&content)
}

/// Parse CSV ledger content; the delimiter (`,` or `;`) is detected from the header.
///
/// Comma-delimited files use `.` as the decimal mark and `,` for thousands;
/// semicolon-delimited files use `,` as the decimal mark.
pub fn parse_ledger_csv_str(content: &str) -> Result<ImportedLedger> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = detect_delimiter(content);
    let format = if delimiter == b';' {
        NumberFormat::DecimalComma
    } else {
        NumberFormat::DecimalPoint
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true) // Allow variable number of columns
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    debug!("CSV headers: {:?}", headers);

    let mapping = ColumnMapping::from_headers(headers.iter());
    mapping.ensure_valid()?;
    debug!("Column mapping: {:?}", mapping);

    let mut imported = ImportedLedger::default();

    for (idx, result) in reader.records().enumerate() {
        let record = result.context("Failed to read CSV record")?;
        let row_num = idx + 1;

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        match parse_csv_row(&record, &mapping, row_num, format) {
            Ok(transaction) => imported.rows.push(transaction),
            Err(e) => {
                warn!("Skipping row {}: {:#}", row_num, e);
                imported.skipped.push(SkippedRow {
                    row: row_num,
                    ticker: cell(&record, mapping.ticker).trim().to_string(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "Successfully parsed {} transactions from CSV ({} skipped)",
        imported.rows.len(),
        imported.skipped.len()
    );
    Ok(imported)
}

fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn parse_csv_row(
    record: &csv::StringRecord,
    mapping: &ColumnMapping,
    row_num: usize,
    format: NumberFormat,
) -> Result<RawTransaction> {
    let field = |idx: Option<usize>| cell(record, idx);
    let required = |idx: Option<usize>, name: &'static str| required_cell(record, idx, name, row_num);

    let date = parse_date_text(required(mapping.date, "date")?)?;
    let quantity = parse_decimal_text(required(mapping.quantity, "quantity")?, format)?;
    let price = parse_decimal_text(required(mapping.price, "price")?, format)?;

    let fees = non_empty(field(mapping.fees))
        .map(|s| parse_decimal_text(&s, format))
        .transpose()?
        .unwrap_or(Decimal::ZERO);

    let premium = non_empty(field(mapping.premium))
        .map(|s| parse_decimal_text(&s, format))
        .transpose()?;

    Ok(RawTransaction {
        row: row_num,
        date,
        instrument_type: required(mapping.instrument_type, "type")?.to_string(),
        ticker: required(mapping.ticker, "ticker")?.to_string(),
        isin: non_empty(field(mapping.isin)),
        side: required(mapping.side, "side")?.to_string(),
        quantity,
        price,
        fees,
        currency: non_empty(field(mapping.currency)).unwrap_or_else(|| "USD".to_string()),
        premium,
        sector: non_empty(field(mapping.sector)),
        industry: non_empty(field(mapping.industry)),
        country: non_empty(field(mapping.country)),
        region: non_empty(field(mapping.region)),
    })
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> &str {
    idx.and_then(|i| record.get(i)).unwrap_or("")
}

fn required_cell<'r>(
    record: &'r csv::StringRecord,
    idx: Option<usize>,
    name: &str,
    row_num: usize,
) -> Result<&'r str> {
    let text = cell(record, idx).trim();
    if text.is_empty() {
        Err(anyhow!("Missing {} at row {}", name, row_num))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_comma_delimited_ledger() {
        let csv = "Date,Type,Ticker,Side,Price,Quantity,Fees,Currency\n\
                   2024-01-02,STOCK,AAPL,Buy,100,10,0,USD\n\
                   2024-01-08,Stock,AAPL,Sell,110,5,1.25,USD\n";
        let rows = parse_ledger_csv_str(csv).unwrap().rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[1].fees, dec!(1.25));
        assert_eq!(rows[1].side, "Sell");
        assert_eq!(rows[1].row, 2);
        assert!(rows[0].isin.is_none());
    }

    #[test]
    fn test_parse_semicolon_delimited_ledger_with_optional_columns() {
        let csv = "Date;Type;Ticker;Side;Price;Quantity;Fees;Currency;ISIN;Sector\n\
                   02/01/2024;ETF;IWDA;buy;80,5;3;;EUR;IE00B4L5Y983;\n";
        let rows = parse_ledger_csv_str(csv).unwrap().rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, dec!(80.5));
        assert_eq!(rows[0].fees, Decimal::ZERO);
        assert_eq!(rows[0].isin.as_deref(), Some("IE00B4L5Y983"));
        assert!(rows[0].sector.is_none());
        assert_eq!(rows[0].currency, "EUR");
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let csv = "Date,Type,Ticker,Side,Price,Quantity\n\
                   not-a-date,STOCK,AAPL,Buy,100,10\n\
                   ,,,,,\n\
                   2024-01-03,STOCK,MSFT,Buy,300,1\n";
        let imported = parse_ledger_csv_str(csv).unwrap();
        assert_eq!(imported.rows.len(), 1);
        assert_eq!(imported.rows[0].ticker, "MSFT");
        assert_eq!(imported.rows[0].row, 3);

        // The blank row is ignored, the unreadable one is reported
        assert_eq!(imported.skipped.len(), 1);
        assert_eq!(imported.skipped[0].row, 1);
        assert_eq!(imported.skipped[0].ticker, "AAPL");
        assert!(imported.skipped[0].reason.contains("not-a-date"));
    }

    #[test]
    fn test_comma_file_reads_thousands_separators() {
        let csv = "Date,Type,Ticker,Side,Price,Quantity\n\
                   2024-01-02,STOCK,AAPL,buy,100,\"1,000\"\n\
                   2024-01-03,STOCK,MSFT,buy,\"1,234.50\",\"1,234,567\"\n";
        let imported = parse_ledger_csv_str(csv).unwrap();
        assert!(imported.skipped.is_empty());
        assert_eq!(imported.rows[0].quantity, dec!(1000));
        assert_eq!(imported.rows[1].quantity, dec!(1234567));
        assert_eq!(imported.rows[1].price, dec!(1234.50));
    }

    #[test]
    fn test_comma_file_rejects_decimal_comma() {
        let csv = "Date,Type,Ticker,Side,Price,Quantity\n\
                   2024-01-02,STOCK,AAPL,buy,100,\"2,5\"\n";
        let imported = parse_ledger_csv_str(csv).unwrap();
        assert!(imported.rows.is_empty());
        assert_eq!(imported.skipped.len(), 1);
        assert!(imported.skipped[0].reason.contains("2,5"));
    }

    #[test]
    fn test_semicolon_file_rejects_ambiguous_dot_groups() {
        let csv = "Date;Type;Ticker;Side;Price;Quantity\n\
                   02/01/2024;STOCK;AAPL;buy;1.234,5;2\n\
                   03/01/2024;STOCK;AAPL;buy;100;1.000\n";
        let imported = parse_ledger_csv_str(csv).unwrap();
        assert_eq!(imported.rows.len(), 1);
        assert_eq!(imported.rows[0].price, dec!(1234.5));
        assert_eq!(imported.skipped.len(), 1);
        assert_eq!(imported.skipped[0].row, 2);
        assert!(imported.skipped[0].reason.contains("ambiguous"));
    }

    #[test]
    fn test_missing_columns_fail_fast() {
        let csv = "Date,Ticker,Price\n2024-01-02,AAPL,100\n";
        assert!(parse_ledger_csv_str(csv).is_err());
    }
}
