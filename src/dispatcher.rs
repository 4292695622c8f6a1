//! Command dispatcher that routes parsed CLI commands to their handlers.
//!
//! Every handler goes through a [`Session`], which owns the configured market
//! data provider and its caches for the lifetime of the process.

mod allocation;
mod imports;
mod performance;
mod portfolio;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::cli::{BenchmarkArgs, Commands};
use perfana::config::Config;
use perfana::db;
use perfana::enrichment::{gather, EnrichmentEvent};
use perfana::importers::import_file;
use perfana::ledger::{preprocess_imported, PreprocessOutcome};
use perfana::portfolio::{build_portfolio, set_benchmark, BenchmarkedSnapshot, PortfolioSnapshot};
use perfana::pricing::{CachedMarketData, LocalProvider, MarketSource, YahooProvider};

/// Provider, settings and output mode shared by every command
pub struct Session {
    pub config: Config,
    pub json: bool,
    provider: CachedMarketData<MarketSource>,
}

impl Session {
    pub fn open(config: Config, json: bool) -> Result<Self> {
        let source = match &config.offline_prices_dir {
            Some(dir) => {
                info!("Using offline prices from {:?}", dir);
                MarketSource::Local(LocalProvider::new(dir))
            }
            None => MarketSource::Yahoo(
                YahooProvider::new(config.retry_policy()).context("Failed to create HTTP client")?,
            ),
        };

        let mut provider = CachedMarketData::new(source);
        if !config.no_cache {
            match db::open_db(config.cache_db.clone()) {
                Ok(conn) => provider = provider.with_store(conn),
                Err(e) => warn!("Price cache unavailable, continuing without it: {:#}", e),
            }
        }

        Ok(Self {
            config,
            json,
            provider,
        })
    }

    pub fn provider(&self) -> &CachedMarketData<MarketSource> {
        &self.provider
    }

    /// Last date to price
    pub fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    /// Import `file`, look up what preprocessing needs and clean the rows
    pub async fn load_ledger(&self, file: &Path) -> Result<PreprocessOutcome> {
        let imported = import_file(file).with_context(|| format!("Failed to import {:?}", file))?;

        let mut printer = EnrichmentPrinter::new(self.json);
        let enrichment = gather(&imported.rows, &self.provider, self.today(), &mut |event: &EnrichmentEvent| {
            printer.on_event(event)
        })
        .await;

        let outcome = preprocess_imported(&imported, &enrichment);
        info!(
            "Ledger ready: {} transactions, {} rows dropped",
            outcome.ledger.transactions().len(),
            outcome.dropped.len()
        );
        Ok(outcome)
    }

    pub async fn portfolio(&self, file: &Path) -> Result<PortfolioSnapshot> {
        let outcome = self.load_ledger(file).await?;
        if !self.json && !outcome.dropped.is_empty() {
            eprint!("{}", crate::cli::formatters::format_dropped_rows(&outcome.dropped));
        }
        let snapshot = build_portfolio(outcome.ledger, &self.provider, self.today()).await?;
        Ok(snapshot)
    }

    pub async fn benchmarked(&self, file: &Path, args: &BenchmarkArgs) -> Result<BenchmarkedSnapshot> {
        let snapshot = self.portfolio(file).await?;
        let symbol = args
            .benchmark
            .clone()
            .unwrap_or_else(|| self.config.benchmark.clone());
        let full_shares = args.full_shares || self.config.full_shares;

        let benchmarked = set_benchmark(snapshot, &symbol, full_shares, &self.provider).await?;
        if !self.json {
            if let Some(note) = benchmarked.parity_disclosure() {
                eprintln!("{} {}", "ℹ".blue().bold(), note);
            }
        }
        Ok(benchmarked)
    }
}

/// Route a parsed command to its handler
pub async fn dispatch_command(command: Commands, session: &Session) -> Result<()> {
    match command {
        Commands::Load { file, dry_run } => imports::dispatch_load(session, &file, dry_run).await,
        Commands::Show { file } => portfolio::dispatch_show(session, &file).await,
        Commands::Perf {
            file,
            benchmark,
            period,
            trades,
        } => performance::dispatch_perf(session, &file, &benchmark, &period, trades).await,
        Commands::Metric {
            name,
            file,
            benchmark,
            window,
            risk_free,
        } => {
            performance::dispatch_metric(
                session,
                &name,
                &file,
                &benchmark,
                window.as_deref(),
                risk_free.as_deref(),
            )
            .await
        }
        Commands::Alloc {
            category,
            file,
            benchmark,
        } => allocation::dispatch_alloc(session, &category, &file, &benchmark).await,
        Commands::Returns {
            file,
            benchmark,
            frequency,
        } => performance::dispatch_returns(session, &file, &benchmark, &frequency).await,
    }
}

/// Print a JSON payload on stdout
pub(crate) fn print_json<T: serde::Serialize>(payload: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

/// Transient progress line on stderr while the enrichment phase runs
struct EnrichmentPrinter {
    quiet: bool,
    in_progress: bool,
}

impl EnrichmentPrinter {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            in_progress: false,
        }
    }

    fn update(&mut self, text: &str) {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\r\x1b[2K{}", text);
        let _ = stderr.flush();
        self.in_progress = true;
    }

    fn on_event(&mut self, event: &EnrichmentEvent) {
        if self.quiet {
            return;
        }
        match event {
            EnrichmentEvent::ResolvedIsin { isin, symbol } => {
                let target = symbol.as_deref().unwrap_or("?");
                self.update(&format!("↻ Resolving {} → {}", isin, target));
            }
            EnrichmentEvent::Validated {
                symbol, done, total, ..
            } => {
                self.update(&format!("↻ Checking prices {}/{} ({})", done, total, symbol));
            }
            EnrichmentEvent::Finished { supported, total } => {
                if self.in_progress {
                    eprint!("\r\x1b[2K");
                }
                eprintln!(
                    "{} {} of {} instruments have price data",
                    "✓".green().bold(),
                    supported,
                    total
                );
                self.in_progress = false;
            }
        }
    }
}
