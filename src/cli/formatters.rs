//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use chrono::NaiveDate;
use colored::Colorize;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use perfana::importers::{RawTransaction, SkippedRow};
use perfana::ledger::{DroppedRow, Ledger};
use perfana::metrics::{MetricTable, Series};
use perfana::portfolio::{AllocationTable, BenchmarkedSnapshot, PortfolioSnapshot};
use perfana::utils::{format_amount, format_cell, format_percent, format_ratio, NO_VALUE};

/// Summary rows that hold fractions rather than ratios
const PERCENT_ROWS: &[&str] = &["Total return", "Volatility", "Maximum drawdown", "Tracking error"];

fn signed_percent(value: Decimal) -> String {
    let text = format_percent(value);
    if value >= Decimal::ZERO {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

fn finish(mut table: Table, first_numeric: usize) -> String {
    table.with(Style::modern());
    table.modify(Columns::new(first_numeric..), Alignment::right());
    table.to_string()
}

/// First rows of a file as read, before cleaning
pub fn format_raw_preview(rows: &[RawTransaction], limit: usize) -> String {
    #[derive(Tabled)]
    struct RawRow {
        #[tabled(rename = "Row")]
        row: usize,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Side")]
        side: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Fees")]
        fees: String,
    }

    let preview: Vec<RawRow> = rows
        .iter()
        .take(limit)
        .map(|r| RawRow {
            row: r.row,
            date: r.date.to_string(),
            kind: r.instrument_type.clone(),
            ticker: r.ticker.clone(),
            side: r.side.clone(),
            quantity: r.quantity.normalize().to_string(),
            price: format_amount(r.price),
            fees: format_amount(r.fees),
        })
        .collect();

    let mut output = format!("\n{} Found {} rows\n\n", "✓".green().bold(), rows.len());
    output.push_str(&finish(Table::new(preview), 5));
    if rows.len() > limit {
        output.push_str(&format!("\n... and {} more rows", rows.len() - limit));
    }
    output.push('\n');
    output
}

/// Cleaned transactions
pub fn format_ledger_table(ledger: &Ledger, limit: usize) -> String {
    #[derive(Tabled)]
    struct LedgerRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Side")]
        side: String,
        #[tabled(rename = "Sector")]
        sector: String,
        #[tabled(rename = "Country")]
        country: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Investment")]
        investment: String,
    }

    let rows: Vec<LedgerRow> = ledger
        .transactions()
        .iter()
        .take(limit)
        .map(|tx| LedgerRow {
            date: tx.date.to_string(),
            kind: tx.instrument_type.as_str().to_string(),
            ticker: tx.ticker.clone(),
            side: tx.side.as_str().to_string(),
            sector: tx.sector.clone(),
            country: tx.country.clone(),
            quantity: tx.quantity.normalize().to_string(),
            price: format_amount(tx.price),
            investment: format_amount(tx.investment),
        })
        .collect();

    let mut output = format!(
        "\n{} Ledger: {} transactions\n\n",
        "📒".cyan().bold(),
        ledger.transactions().len()
    );
    output.push_str(&finish(Table::new(rows), 6));
    if ledger.transactions().len() > limit {
        output.push_str(&format!(
            "\n... and {} more transactions",
            ledger.transactions().len() - limit
        ));
    }
    output.push('\n');
    output
}

/// Rows removed during preprocessing, with the reason
pub fn format_dropped_rows(dropped: &[DroppedRow]) -> String {
    if dropped.is_empty() {
        return String::new();
    }
    let mut output = format!(
        "\n{} {} rows dropped\n",
        "⚠".yellow().bold(),
        dropped.len()
    );
    for d in dropped {
        output.push_str(&format!("  row {:>4}  {:<12} {}\n", d.row, d.ticker, d.reason));
    }
    output
}

/// Rows the importer could not read
pub fn format_skipped_rows(skipped: &[SkippedRow]) -> String {
    if skipped.is_empty() {
        return String::new();
    }
    let mut output = format!(
        "\n{} {} rows could not be read\n",
        "⚠".yellow().bold(),
        skipped.len()
    );
    for s in skipped {
        output.push_str(&format!("  row {:>4}  {:<12} {}\n", s.row, s.ticker, s.reason));
    }
    output
}

/// Holdings on the last day of the snapshot
pub fn format_holdings(snapshot: &PortfolioSnapshot) -> String {
    #[derive(Tabled)]
    struct HoldingRow {
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Close")]
        close: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Invested")]
        invested: String,
        #[tabled(rename = "Weight")]
        weight: String,
    }

    let data = &snapshot.trade_data;
    let last = |frame: &perfana::portfolio::MetricFrame, ticker: &str| {
        frame
            .column(ticker)
            .and_then(|col| col.last().copied())
            .unwrap_or(Decimal::ZERO)
    };
    let total_value = data.end_value.total().last().copied().unwrap_or(Decimal::ZERO);

    let rows: Vec<HoldingRow> = snapshot
        .holdings()
        .into_iter()
        .map(|(ticker, value)| HoldingRow {
            ticker: ticker.to_string(),
            quantity: last(&data.quantity, ticker).normalize().to_string(),
            close: format_amount(last(&data.close, ticker)),
            value: format_amount(value),
            invested: format_amount(last(&data.investment, ticker)),
            weight: if total_value.is_zero() {
                NO_VALUE.to_string()
            } else {
                format_percent(value / total_value)
            },
        })
        .collect();

    let as_of = snapshot
        .last_date()
        .map(|d| d.to_string())
        .unwrap_or_else(|| NO_VALUE.to_string());
    let mut output = format!("\n{} Holdings as of {}\n\n", "📊".cyan().bold(), as_of);
    output.push_str(&finish(Table::new(rows), 1));

    let invested = data.investment.total().last().copied().unwrap_or(Decimal::ZERO);
    output.push_str(&format!("\n\n{:<16} {}", "Total Value:".bold(), format_amount(total_value)));
    output.push_str(&format!("\n{:<16} {}", "Net Invested:".bold(), format_amount(invested)));
    if !invested.is_zero() {
        output.push_str(&format!(
            "\n{:<16} {}",
            "Gain:".bold(),
            signed_percent(total_value / invested - Decimal::ONE)
        ));
    }
    output.push('\n');
    output
}

/// A metric table; `percent` formats every cell as a percentage
pub fn format_metric_table(table: &MetricTable, percent: bool) -> String {
    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    header.extend(table.columns.iter().cloned());
    builder.push_record(header);

    for row in &table.rows {
        let as_percent = percent || PERCENT_ROWS.contains(&row.label.as_str());
        let mut record = vec![row.label.clone()];
        record.extend(row.cells.iter().map(|c| format_cell(c, as_percent)));
        builder.push_record(record);
    }

    format!(
        "\n{}\n{}\n",
        table.title.bold(),
        finish(builder.build(), 1)
    )
}

/// Dated series side by side, one column per series
pub fn format_series(title: &str, series: &[(String, Series)], percent: bool) -> String {
    let mut by_date: BTreeMap<NaiveDate, Vec<Option<Decimal>>> = BTreeMap::new();
    for (i, (_, s)) in series.iter().enumerate() {
        for (date, value) in s.dates.iter().zip(&s.values) {
            by_date.entry(*date).or_insert_with(|| vec![None; series.len()])[i] = Some(*value);
        }
    }

    if by_date.is_empty() {
        return format!(
            "\n{}\n{} Not enough observations for this window\n",
            title.bold(),
            "ℹ".blue().bold()
        );
    }

    let mut builder = Builder::default();
    let mut header = vec!["Date".to_string()];
    header.extend(series.iter().map(|(name, _)| name.clone()));
    builder.push_record(header);
    for (date, values) in by_date {
        let mut record = vec![date.to_string()];
        record.extend(values.into_iter().map(|v| match v {
            Some(v) if percent => format_percent(v),
            Some(v) => format_ratio(v),
            None => NO_VALUE.to_string(),
        }));
        builder.push_record(record);
    }

    format!("\n{}\n{}\n", title.bold(), finish(builder.build(), 1))
}

/// Portfolio against benchmark weights
pub fn format_allocation(table: &AllocationTable) -> String {
    #[derive(Tabled)]
    struct AllocationLine {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Portfolio")]
        portfolio: String,
        #[tabled(rename = "Benchmark")]
        benchmark: String,
        #[tabled(rename = "Difference")]
        difference: String,
    }

    let rows: Vec<AllocationLine> = table
        .rows
        .iter()
        .map(|r| AllocationLine {
            name: r.name.clone(),
            portfolio: format_percent(r.portfolio),
            benchmark: format_percent(r.benchmark),
            difference: signed_percent(r.portfolio - r.benchmark),
        })
        .collect();

    let mut output = format!(
        "\n{} Allocation by {} (benchmark {})\n\n",
        "🧭".cyan().bold(),
        table.category,
        table.benchmark
    );
    output.push_str(&finish(Table::new(rows), 1));
    output.push('\n');
    output
}

/// Every asset trade next to its benchmark counterpart
pub fn format_trades(snapshot: &BenchmarkedSnapshot) -> String {
    #[derive(Tabled)]
    struct TradeLine {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Investment")]
        investment: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Return")]
        pct_return: String,
        #[tabled(rename = "Benchmark Qty")]
        benchmark_quantity: String,
        #[tabled(rename = "Benchmark Value")]
        benchmark_value: String,
        #[tabled(rename = "Benchmark Return")]
        benchmark_return: String,
    }

    let rows: Vec<TradeLine> = snapshot
        .portfolio
        .trades
        .iter()
        .zip(&snapshot.benchmark.trades)
        .map(|(p, b)| TradeLine {
            date: p.date.to_string(),
            ticker: p.ticker.clone(),
            investment: format_amount(p.investment),
            value: format_amount(p.value),
            pct_return: signed_percent(p.pct_return),
            benchmark_quantity: b.benchmark_quantity.round_dp(4).normalize().to_string(),
            benchmark_value: format_amount(b.benchmark_value),
            benchmark_return: signed_percent(b.pct_return),
        })
        .collect();

    let mut output = format!("\n{}\n", "Trades".bold());
    output.push_str(&finish(Table::new(rows), 2));
    output.push('\n');
    output
}

/// Message shown when nothing is left after preprocessing
pub fn format_empty_ledger() -> String {
    format!(
        "{} No usable transactions\nCheck the file with: {} load <file> --dry-run\n",
        "ℹ".blue().bold(),
        "perfana".bold()
    )
}
