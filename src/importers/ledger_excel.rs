use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{
    non_empty, parse_date_text, parse_decimal_text, ColumnMapping, ImportedLedger, NumberFormat,
    RawTransaction, SkippedRow,
};

/// Parse an Excel transaction ledger
pub fn parse_ledger_excel<P: AsRef<Path>>(file_path: P) -> Result<ImportedLedger> {
    let path = file_path.as_ref();
    info!("Parsing ledger Excel file: {:?}", path);

    let mut workbook: Xlsx<_> = open_workbook(path).context("Failed to open Excel file")?;

    let sheet_name = find_ledger_sheet(&workbook.sheet_names())?;
    info!("Found ledger sheet: {}", sheet_name);

    let range = workbook
        .worksheet_range(&sheet_name)
        .context("Failed to read worksheet")?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| anyhow!("Sheet '{}' is empty", sheet_name))?;
    let header_text: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();
    let mapping = ColumnMapping::from_headers(header_text.iter().map(String::as_str));
    mapping.ensure_valid()?;
    debug!("Column mapping: {:?}", mapping);

    let mut imported = ImportedLedger::default();
    for (idx, row) in rows.enumerate() {
        let row_num = idx + 1;

        // Skip empty rows
        if row.iter().all(|cell| cell.to_string().trim().is_empty()) {
            continue;
        }

        match parse_row(row, &mapping, row_num) {
            Ok(transaction) => imported.rows.push(transaction),
            Err(e) => {
                warn!("Skipping row {}: {:#}", row_num, e);
                imported.skipped.push(SkippedRow {
                    row: row_num,
                    ticker: cell_text(row, mapping.ticker).trim().to_string(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "Successfully parsed {} transactions ({} skipped)",
        imported.rows.len(),
        imported.skipped.len()
    );
    Ok(imported)
}

/// Prefer a sheet named like a ledger, otherwise the first sheet
fn find_ledger_sheet(sheet_names: &[String]) -> Result<String> {
    let patterns = ["transaction", "ledger", "trades", "orders"];

    for pattern in &patterns {
        for name in sheet_names {
            if name.to_lowercase().contains(pattern) {
                return Ok(name.clone());
            }
        }
    }

    sheet_names
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("No sheets found in workbook"))
}

fn cell_text(row: &[Data], idx: Option<usize>) -> String {
    idx.and_then(|i| row.get(i))
        .map(|cell| cell.to_string())
        .unwrap_or_default()
}

fn parse_row(row: &[Data], mapping: &ColumnMapping, row_num: usize) -> Result<RawTransaction> {
    let required_text = |idx: Option<usize>, name: &str| -> Result<String> {
        non_empty(&cell_text(row, idx)).ok_or_else(|| anyhow!("Missing {} at row {}", name, row_num))
    };
    let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i));

    let date = match cell(mapping.date) {
        Some(cell) => parse_date(cell)?,
        None => return Err(anyhow!("Missing date at row {}", row_num)),
    };
    let quantity = parse_decimal(cell(mapping.quantity), "quantity", row_num)?;
    let price = parse_decimal(cell(mapping.price), "price", row_num)?;

    let fees = match cell(mapping.fees) {
        Some(c) if !is_blank(c) => parse_decimal(Some(c), "fees", row_num)?,
        _ => Decimal::ZERO,
    };
    let premium = match cell(mapping.premium) {
        Some(c) if !is_blank(c) => Some(parse_decimal(Some(c), "premium", row_num)?),
        _ => None,
    };

    Ok(RawTransaction {
        row: row_num,
        date,
        instrument_type: required_text(mapping.instrument_type, "type")?,
        ticker: required_text(mapping.ticker, "ticker")?,
        isin: non_empty(&cell_text(row, mapping.isin)),
        side: required_text(mapping.side, "side")?,
        quantity,
        price,
        fees,
        currency: non_empty(&cell_text(row, mapping.currency)).unwrap_or_else(|| "USD".to_string()),
        premium,
        sector: non_empty(&cell_text(row, mapping.sector)),
        industry: non_empty(&cell_text(row, mapping.industry)),
        country: non_empty(&cell_text(row, mapping.country)),
        region: non_empty(&cell_text(row, mapping.region)),
    })
}

fn is_blank(cell: &Data) -> bool {
    matches!(cell, Data::Empty) || cell.to_string().trim().is_empty()
}

/// Parse date from an Excel serial date or a text cell
fn parse_date(cell: &Data) -> Result<NaiveDate> {
    match cell {
        Data::DateTime(dt) => {
            let days_since_epoch = dt.as_f64().floor() as i64;
            let excel_epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
                .ok_or_else(|| anyhow!("Invalid Excel epoch"))?;
            excel_epoch
                .checked_add_signed(chrono::Duration::days(days_since_epoch))
                .ok_or_else(|| anyhow!("Date overflow"))
        }
        Data::DateTimeIso(text) => parse_date_text(text),
        _ => parse_date_text(&cell.to_string()),
    }
}

/// Parse decimal from a numeric or text cell.
///
/// Text cells carry no locale, so ambiguous groupings such as `1,000` are rejected.
fn parse_decimal(cell: Option<&Data>, name: &str, row_num: usize) -> Result<Decimal> {
    match cell {
        Some(Data::Int(i)) => Ok(Decimal::from(*i)),
        Some(Data::Float(f)) => {
            // Round-trip through the shortest text form so 0.1 stays 0.1
            parse_decimal_text(&f.to_string(), NumberFormat::DecimalPoint)
        }
        Some(other) if !is_blank(other) => {
            parse_decimal_text(&other.to_string(), NumberFormat::Unknown)
        }
        _ => Err(anyhow!("Missing {} at row {}", name, row_num)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_find_ledger_sheet_prefers_named_sheet() {
        let names = vec!["Summary".to_string(), "My Transactions".to_string()];
        assert_eq!(find_ledger_sheet(&names).unwrap(), "My Transactions");

        let names = vec!["Sheet1".to_string()];
        assert_eq!(find_ledger_sheet(&names).unwrap(), "Sheet1");

        assert!(find_ledger_sheet(&[]).is_err());
    }

    #[test]
    fn test_parse_decimal_float_cell_keeps_short_form() {
        let value = parse_decimal(Some(&Data::Float(0.1)), "price", 1).unwrap();
        assert_eq!(value, dec!(0.1));
        let value = parse_decimal(Some(&Data::Int(7)), "quantity", 1).unwrap();
        assert_eq!(value, dec!(7));
        assert!(parse_decimal(Some(&Data::Empty), "price", 1).is_err());
    }

    #[test]
    fn test_parse_decimal_text_cell() {
        let value = parse_decimal(Some(&Data::String("1.234,5".to_string())), "price", 1).unwrap();
        assert_eq!(value, dec!(1234.5));
        let value = parse_decimal(Some(&Data::String("0,25".to_string())), "quantity", 1).unwrap();
        assert_eq!(value, dec!(0.25));
        assert!(parse_decimal(Some(&Data::String("1,000".to_string())), "quantity", 1).is_err());
    }

    #[test]
    fn test_parse_date_text_cell() {
        let result = parse_date(&Data::String("2025-03-15".to_string())).unwrap();
        assert_eq!(result, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }
}
