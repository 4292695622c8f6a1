//! Performance command dispatcher implementation

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

use super::{print_json, Session};
use crate::cli::formatters::{format_metric_table, format_series, format_trades};
use crate::cli::BenchmarkArgs;
use perfana::metrics::returns::{aggregate_returns, Frequency};
use perfana::metrics::{compute_metric, MetricKind, MetricOptions, MetricOutput, Period};

fn options(session: &Session) -> Result<MetricOptions> {
    Ok(MetricOptions {
        risk_free: session.config.risk_free_rate,
        window: session.config.rolling_period()?,
        calmar_window: session.config.calmar_period()?,
        ..MetricOptions::default()
    })
}

fn render(output: &MetricOutput, percent: bool) -> String {
    match output {
        MetricOutput::Table(table) => format_metric_table(table, percent),
        MetricOutput::Series { title, series } => format_series(title, series, percent),
    }
}

pub async fn dispatch_perf(
    session: &Session,
    file: &Path,
    benchmark: &BenchmarkArgs,
    period: &str,
    show_trades: bool,
) -> Result<()> {
    let period: Period = period.parse().map_err(|e: String| anyhow!(e))?;
    let snapshot = session.benchmarked(file, benchmark).await?;
    let options = MetricOptions {
        period,
        ..options(session)?
    };
    let summary = compute_metric(MetricKind::Summary, &snapshot, &options);

    if session.json {
        let trades = show_trades.then_some(&snapshot.portfolio.trades);
        let benchmark_trades = show_trades.then_some(&snapshot.benchmark.trades);
        return print_json(&serde_json::json!({
            "benchmark": snapshot.benchmark.symbol,
            "as_of": snapshot.as_of(),
            "summary": summary,
            "disclosure": snapshot.parity_disclosure(),
            "trades": trades,
            "benchmark_trades": benchmark_trades,
        }));
    }

    println!("Benchmark: {}", snapshot.benchmark.symbol);
    print!("{}", render(&summary, false));
    if show_trades {
        print!("{}", format_trades(&snapshot));
    }
    Ok(())
}

pub async fn dispatch_metric(
    session: &Session,
    name: &str,
    file: &Path,
    benchmark: &BenchmarkArgs,
    window: Option<&str>,
    risk_free: Option<&str>,
) -> Result<()> {
    let kind: MetricKind = name.parse().map_err(|e: String| anyhow!(e))?;
    let mut options = options(session)?;
    if let Some(window) = window {
        options.window = window.parse().map_err(|e: String| anyhow!(e))?;
    }
    if let Some(rf) = risk_free {
        options.risk_free =
            Decimal::from_str(rf.trim()).map_err(|_| anyhow!("Invalid risk-free rate: {}", rf))?;
    }

    let snapshot = session.benchmarked(file, benchmark).await?;
    let output = compute_metric(kind, &snapshot, &options);

    if session.json {
        return print_json(&serde_json::json!({
            "metric": kind.name(),
            "benchmark": snapshot.benchmark.symbol,
            "result": output,
        }));
    }

    print!("{}", render(&output, kind.is_percentage()));
    Ok(())
}

pub async fn dispatch_returns(
    session: &Session,
    file: &Path,
    benchmark: &BenchmarkArgs,
    frequency: &str,
) -> Result<()> {
    let frequency: Frequency = frequency.parse().map_err(|e: String| anyhow!(e))?;
    let snapshot = session.benchmarked(file, benchmark).await?;

    let portfolio = aggregate_returns(&snapshot.portfolio_returns, frequency);
    let benchmark = aggregate_returns(&snapshot.benchmark_returns, frequency);

    if session.json {
        return print_json(&serde_json::json!({
            "frequency": frequency,
            "portfolio": portfolio,
            "benchmark": benchmark,
        }));
    }

    let title = format!("Returns ({:?})", frequency);
    let series = vec![
        ("Portfolio".to_string(), portfolio),
        (snapshot.benchmark.symbol.clone(), benchmark),
    ];
    print!("{}", format_series(&title, &series, true));
    Ok(())
}
