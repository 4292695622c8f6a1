use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

use super::{print_json, Session};
use crate::cli::formatters::{
    format_dropped_rows, format_empty_ledger, format_ledger_table, format_raw_preview,
    format_skipped_rows,
};
use perfana::importers::import_file;

const PREVIEW_ROWS: usize = 20;

pub async fn dispatch_load(session: &Session, file: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        let imported = import_file(file).with_context(|| format!("Failed to import {:?}", file))?;
        if session.json {
            let rows: Vec<_> = imported
                .rows
                .iter()
                .map(|r| {
                    json!({
                        "row": r.row,
                        "date": r.date,
                        "type": r.instrument_type,
                        "ticker": r.ticker,
                        "side": r.side,
                        "quantity": r.quantity,
                        "price": r.price,
                        "fees": r.fees,
                    })
                })
                .collect();
            let skipped: Vec<_> = imported
                .skipped
                .iter()
                .map(|s| json!({ "row": s.row, "ticker": s.ticker, "reason": s.reason }))
                .collect();
            return print_json(&json!({ "rows": rows, "skipped": skipped }));
        }
        print!("{}", format_raw_preview(&imported.rows, PREVIEW_ROWS));
        print!("{}", format_skipped_rows(&imported.skipped));
        println!("\n{} Dry run - no price lookups performed", "ℹ".blue().bold());
        return Ok(());
    }

    let outcome = session.load_ledger(file).await?;

    if session.json {
        let dropped: Vec<_> = outcome
            .dropped
            .iter()
            .map(|d| json!({ "row": d.row, "ticker": d.ticker, "reason": d.reason.to_string() }))
            .collect();
        return print_json(&json!({
            "transactions": outcome.ledger.transactions(),
            "dropped": dropped,
        }));
    }

    if outcome.ledger.is_empty() {
        print!("{}", format_empty_ledger());
    } else {
        print!("{}", format_ledger_table(&outcome.ledger, PREVIEW_ROWS));
    }
    print!("{}", format_dropped_rows(&outcome.dropped));
    Ok(())
}
