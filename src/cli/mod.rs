use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser, Debug)]
#[command(name = "perfana")]
#[command(
    version,
    about = "Portfolio performance analytics against a benchmark"
)]
#[command(
    long_about = "Import a transaction ledger, rebuild the portfolio day by day, replay its cash flows into a benchmark and report returns, risk ratios and allocations."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Read prices from CSV files in this directory instead of the network
    #[arg(long = "offline", global = true, value_name = "DIR")]
    pub offline: Option<PathBuf>,

    /// Do not read or write the local price cache
    #[arg(long = "no-cache", global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Import and clean a ledger file, showing the result and any dropped rows
    Load {
        /// Path to the CSV or Excel ledger
        file: PathBuf,

        /// Parse only; skip price lookups and preprocessing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show holdings on the last day of the ledger
    Show {
        /// Path to the CSV or Excel ledger
        file: PathBuf,
    },

    /// Summary of returns and risk against the benchmark
    Perf {
        /// Path to the CSV or Excel ledger
        file: PathBuf,

        #[command(flatten)]
        benchmark: BenchmarkArgs,

        /// Period summarized (mtd, qtd, ytd, all, 3m, 6m, 1y, 3y, 5y, 10y)
        #[arg(short, long, default_value = "all")]
        period: String,

        /// Also list every trade with its benchmark counterpart
        #[arg(long)]
        trades: bool,
    },

    /// Compute a single metric per period, or a rolling series
    Metric {
        /// Metric name (e.g. sharpe, maxdd, beta, rsharpe)
        name: String,

        /// Path to the CSV or Excel ledger
        file: PathBuf,

        #[command(flatten)]
        benchmark: BenchmarkArgs,

        /// Rolling window (3m, 6m, 1y, ...)
        #[arg(short, long)]
        window: Option<String>,

        /// Daily risk-free rate
        #[arg(long = "rf")]
        risk_free: Option<String>,
    },

    /// Allocation by asset, sector, country or region
    Alloc {
        /// asset, sector, country or region
        category: String,

        /// Path to the CSV or Excel ledger
        file: PathBuf,

        #[command(flatten)]
        benchmark: BenchmarkArgs,
    },

    /// Portfolio and benchmark returns aggregated by frequency
    Returns {
        /// Path to the CSV or Excel ledger
        file: PathBuf,

        #[command(flatten)]
        benchmark: BenchmarkArgs,

        /// daily, monthly or yearly
        #[arg(short, long, default_value = "monthly")]
        frequency: String,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq, Default)]
pub struct BenchmarkArgs {
    /// Benchmark symbol (defaults to the configured benchmark)
    #[arg(short, long)]
    pub benchmark: Option<String>,

    /// Buy whole benchmark shares only
    #[arg(long)]
    pub full_shares: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_command() {
        let cli = Cli::try_parse_from([
            "perfana", "--json", "metric", "sharpe", "ledger.csv", "--benchmark", "QQQ", "--window",
            "6m", "--rf", "0.0001",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Metric {
                name,
                file,
                benchmark,
                window,
                risk_free,
            } => {
                assert_eq!(name, "sharpe");
                assert_eq!(file, PathBuf::from("ledger.csv"));
                assert_eq!(benchmark.benchmark.as_deref(), Some("QQQ"));
                assert!(!benchmark.full_shares);
                assert_eq!(window.as_deref(), Some("6m"));
                assert_eq!(risk_free.as_deref(), Some("0.0001"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "perfana", "perf", "ledger.csv", "--full-shares", "--offline", "prices", "--no-cache",
        ])
        .unwrap();
        assert_eq!(cli.offline, Some(PathBuf::from("prices")));
        assert!(cli.no_cache);
        match cli.command {
            Commands::Perf { benchmark, period, .. } => {
                assert!(benchmark.full_shares);
                assert_eq!(period, "all");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_load_requires_file() {
        assert!(Cli::try_parse_from(["perfana", "load"]).is_err());
        let cli = Cli::try_parse_from(["perfana", "load", "x.xlsx", "--dry-run"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Load {
                file: PathBuf::from("x.xlsx"),
                dry_run: true
            }
        );
    }
}
