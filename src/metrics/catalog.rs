//! Named metrics computed over a benchmarked snapshot.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use super::ratios::{
    beta, calmar, common_sense_ratio, drawdown_series, gain_to_pain, information_ratio,
    jensens_alpha, kelly_criterion, max_drawdown, payoff_ratio, profit_factor, sharpe, sortino,
    tail_ratio, tracking_error,
};
use super::returns::{benchmark_period_return, cumulative_returns, portfolio_period_return, volatility};
use super::rolling::{
    rolling_alpha, rolling_beta, rolling_calmar, rolling_sharpe, rolling_sortino, rolling_volatility,
};
use super::stats::{describe, kurtosis, r2_score, skew};
use super::{MetricCell, MetricTable, Period, Series, ALL_PERIODS};
use crate::error::InsufficientData;
use crate::portfolio::BenchmarkedSnapshot;

const PORTFOLIO: &str = "Portfolio";
const BENCHMARK: &str = "Benchmark";

/// Every metric the engine can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    Returns,
    Volatility,
    Sharpe,
    Sortino,
    MaxDrawdown,
    RSquare,
    Skew,
    Kurtosis,
    Stats,
    Beta,
    TrackingError,
    InformationRatio,
    TailRatio,
    GainToPain,
    CommonSense,
    JensensAlpha,
    Calmar,
    Kelly,
    PayoffRatio,
    ProfitFactor,
    Summary,
    Cumulative,
    Drawdown,
    RollingVolatility,
    RollingSharpe,
    RollingSortino,
    RollingBeta,
    RollingAlpha,
    RollingCalmar,
}

impl MetricKind {
    pub const ALL: [MetricKind; 29] = [
        MetricKind::Returns,
        MetricKind::Volatility,
        MetricKind::Sharpe,
        MetricKind::Sortino,
        MetricKind::MaxDrawdown,
        MetricKind::RSquare,
        MetricKind::Skew,
        MetricKind::Kurtosis,
        MetricKind::Stats,
        MetricKind::Beta,
        MetricKind::TrackingError,
        MetricKind::InformationRatio,
        MetricKind::TailRatio,
        MetricKind::GainToPain,
        MetricKind::CommonSense,
        MetricKind::JensensAlpha,
        MetricKind::Calmar,
        MetricKind::Kelly,
        MetricKind::PayoffRatio,
        MetricKind::ProfitFactor,
        MetricKind::Summary,
        MetricKind::Cumulative,
        MetricKind::Drawdown,
        MetricKind::RollingVolatility,
        MetricKind::RollingSharpe,
        MetricKind::RollingSortino,
        MetricKind::RollingBeta,
        MetricKind::RollingAlpha,
        MetricKind::RollingCalmar,
    ];

    /// Command-line name
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Returns => "returns",
            MetricKind::Volatility => "volatility",
            MetricKind::Sharpe => "sharpe",
            MetricKind::Sortino => "sortino",
            MetricKind::MaxDrawdown => "maxdd",
            MetricKind::RSquare => "rsquare",
            MetricKind::Skew => "skew",
            MetricKind::Kurtosis => "kurtosis",
            MetricKind::Stats => "stats",
            MetricKind::Beta => "beta",
            MetricKind::TrackingError => "trackerr",
            MetricKind::InformationRatio => "information",
            MetricKind::TailRatio => "tail",
            MetricKind::GainToPain => "gaintopain",
            MetricKind::CommonSense => "commonsense",
            MetricKind::JensensAlpha => "jensens",
            MetricKind::Calmar => "calmar",
            MetricKind::Kelly => "kelly",
            MetricKind::PayoffRatio => "payoff",
            MetricKind::ProfitFactor => "profitfactor",
            MetricKind::Summary => "summary",
            MetricKind::Cumulative => "cumulative",
            MetricKind::Drawdown => "drawdown",
            MetricKind::RollingVolatility => "rvol",
            MetricKind::RollingSharpe => "rsharpe",
            MetricKind::RollingSortino => "rsortino",
            MetricKind::RollingBeta => "rbeta",
            MetricKind::RollingAlpha => "ralpha",
            MetricKind::RollingCalmar => "rcalmar",
        }
    }

    /// Values are fractions best read as percentages
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            MetricKind::Returns
                | MetricKind::Volatility
                | MetricKind::MaxDrawdown
                | MetricKind::TrackingError
                | MetricKind::JensensAlpha
                | MetricKind::Kelly
                | MetricKind::Cumulative
                | MetricKind::Drawdown
                | MetricKind::RollingVolatility
                | MetricKind::RollingAlpha
        )
    }

    pub fn title(&self) -> &'static str {
        match self {
            MetricKind::Returns => "Total return",
            MetricKind::Volatility => "Volatility",
            MetricKind::Sharpe => "Sharpe ratio",
            MetricKind::Sortino => "Sortino ratio",
            MetricKind::MaxDrawdown => "Maximum drawdown",
            MetricKind::RSquare => "R-squared",
            MetricKind::Skew => "Skewness",
            MetricKind::Kurtosis => "Kurtosis",
            MetricKind::Stats => "Descriptive statistics",
            MetricKind::Beta => "Beta",
            MetricKind::TrackingError => "Tracking error",
            MetricKind::InformationRatio => "Information ratio",
            MetricKind::TailRatio => "Tail ratio",
            MetricKind::GainToPain => "Gain-to-pain ratio",
            MetricKind::CommonSense => "Common sense ratio",
            MetricKind::JensensAlpha => "Jensen's alpha",
            MetricKind::Calmar => "Calmar ratio",
            MetricKind::Kelly => "Kelly criterion",
            MetricKind::PayoffRatio => "Payoff ratio",
            MetricKind::ProfitFactor => "Profit factor",
            MetricKind::Summary => "Summary",
            MetricKind::Cumulative => "Cumulative returns",
            MetricKind::Drawdown => "Drawdown",
            MetricKind::RollingVolatility => "Rolling volatility",
            MetricKind::RollingSharpe => "Rolling Sharpe ratio",
            MetricKind::RollingSortino => "Rolling Sortino ratio",
            MetricKind::RollingBeta => "Rolling beta",
            MetricKind::RollingAlpha => "Rolling Jensen's alpha",
            MetricKind::RollingCalmar => "Rolling Calmar ratio",
        }
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_lowercase().replace(['-', '_'], "");
        MetricKind::ALL
            .iter()
            .find(|kind| kind.name() == text)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = MetricKind::ALL.iter().map(|k| k.name()).collect();
                format!("unknown metric '{}' (available: {})", s, names.join(", "))
            })
    }
}

/// Parameters shared by all metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricOptions {
    pub risk_free: Decimal,
    /// Window for rolling metrics
    pub window: Period,
    /// Trailing window used by the Calmar ratio
    pub calmar_window: Period,
    /// Period reported by the summary table
    pub period: Period,
    /// Evaluation date; defaults to the last date of the series
    pub as_of: Option<NaiveDate>,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            risk_free: Decimal::ZERO,
            window: Period::OneYear,
            calmar_window: Period::ThreeYears,
            period: Period::All,
            as_of: None,
        }
    }
}

/// Result of a metric: a table of cells or one dated series per column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricOutput {
    Table(MetricTable),
    Series { title: String, series: Vec<(String, Series)> },
}

/// Filtered views of both return series for one period
struct PeriodData {
    period: Period,
    portfolio: Series,
    benchmark: Series,
}

fn period_data(snapshot: &BenchmarkedSnapshot, as_of: NaiveDate) -> Vec<PeriodData> {
    ALL_PERIODS
        .iter()
        .map(|period| PeriodData {
            period: *period,
            portfolio: snapshot.portfolio_returns.in_period(*period, as_of),
            benchmark: snapshot.benchmark_returns.in_period(*period, as_of),
        })
        .collect()
}

fn period_table<F>(title: &str, columns: &[&str], data: &[PeriodData], cells: F) -> MetricTable
where
    F: Fn(&PeriodData) -> Vec<MetricCell>,
{
    let mut table = MetricTable::new(title, columns);
    for d in data {
        table.push(d.period.label(), cells(d));
    }
    table
}

/// Same metric applied to each side
fn both<F>(title: &str, data: &[PeriodData], metric: F) -> MetricTable
where
    F: Fn(&[Decimal], Period) -> MetricCell,
{
    period_table(title, &[PORTFOLIO, BENCHMARK], data, |d| {
        vec![
            metric(&d.portfolio.values, d.period),
            metric(&d.benchmark.values, d.period),
        ]
    })
}

fn period_returns(snapshot: &BenchmarkedSnapshot, period: Period, as_of: NaiveDate) -> (MetricCell, MetricCell) {
    (
        portfolio_period_return(&snapshot.portfolio.trade_data, period, as_of),
        benchmark_period_return(&snapshot.benchmark, &snapshot.benchmark_returns, period, as_of),
    )
}

fn information(snapshot: &BenchmarkedSnapshot, d: &PeriodData, as_of: NaiveDate) -> MetricCell {
    if d.portfolio.is_empty() || d.benchmark.is_empty() {
        return Err(InsufficientData::EmptyPeriod);
    }
    let te = tracking_error(&d.portfolio.values, &d.benchmark.values)?;
    let (p, b) = period_returns(snapshot, d.period, as_of);
    information_ratio(p?, b?, te)
}

fn trade_metric<F>(snapshot: &BenchmarkedSnapshot, d: &PeriodData, as_of: NaiveDate, use_abs: bool, metric: F) -> Vec<MetricCell>
where
    F: Fn(&[Decimal]) -> MetricCell,
{
    let portfolio: Vec<Decimal> = snapshot
        .portfolio
        .trades
        .iter()
        .filter(|t| d.period.contains(t.date, as_of))
        .map(|t| if use_abs { t.abs_return } else { t.pct_return })
        .collect();
    let benchmark: Vec<Decimal> = snapshot
        .benchmark
        .trades
        .iter()
        .filter(|t| d.period.contains(t.date, as_of))
        .map(|t| if use_abs { t.abs_return } else { t.pct_return })
        .collect();
    vec![metric(&portfolio), metric(&benchmark)]
}

fn summary(snapshot: &BenchmarkedSnapshot, options: &MetricOptions, as_of: NaiveDate) -> MetricTable {
    let period = options.period;
    let d = PeriodData {
        period,
        portfolio: snapshot.portfolio_returns.in_period(period, as_of),
        benchmark: snapshot.benchmark_returns.in_period(period, as_of),
    };
    let (p, b) = (&d.portfolio.values, &d.benchmark.values);
    let rf = options.risk_free;
    let (p_return, b_return) = period_returns(snapshot, period, as_of);

    let mut table = MetricTable::new(
        &format!("Summary ({})", period.label()),
        &[PORTFOLIO, BENCHMARK, "Difference"],
    );
    let mut paired = |label: &str, pc: MetricCell, bc: MetricCell| {
        let diff = match (&pc, &bc) {
            (Ok(x), Ok(y)) => Ok(*x - *y),
            (Err(e), _) | (_, Err(e)) => Err(*e),
        };
        table.push(label, vec![pc, bc, diff]);
    };
    paired("Total return", p_return, b_return);
    paired("Volatility", volatility(p, period), volatility(b, period));
    paired("Sharpe ratio", sharpe(p, rf), sharpe(b, rf));
    paired("Sortino ratio", sortino(p, rf), sortino(b, rf));
    paired("Maximum drawdown", max_drawdown(p), max_drawdown(b));
    paired("Skewness", skew(p), skew(b));
    paired("Kurtosis", kurtosis(p), kurtosis(b));

    let no_benchmark = || Err(InsufficientData::NoBenchmark);
    table.push("R-squared", vec![r2_score(p, b), no_benchmark(), no_benchmark()]);
    table.push("Beta", vec![beta(p, b), no_benchmark(), no_benchmark()]);
    table.push("Tracking error", vec![tracking_error(p, b), no_benchmark(), no_benchmark()]);
    table.push(
        "Information ratio",
        vec![information(snapshot, &d, as_of), no_benchmark(), no_benchmark()],
    );
    table
}

/// Compute `kind` over `snapshot`
pub fn compute_metric(kind: MetricKind, snapshot: &BenchmarkedSnapshot, options: &MetricOptions) -> MetricOutput {
    let as_of = options.as_of.or(snapshot.as_of()).unwrap_or(NaiveDate::MIN);
    let data = period_data(snapshot, as_of);
    let rf = options.risk_free;
    let title = kind.title();
    let window = options.window.days();
    let (p_all, b_all) = (&snapshot.portfolio_returns, &snapshot.benchmark_returns);

    let table = match kind {
        MetricKind::Returns => period_table(title, &[PORTFOLIO, BENCHMARK], &data, |d| {
            let (p, b) = period_returns(snapshot, d.period, as_of);
            vec![p, b]
        }),
        MetricKind::Volatility => both(title, &data, volatility),
        MetricKind::Sharpe => both(title, &data, |v, _| sharpe(v, rf)),
        MetricKind::Sortino => both(title, &data, |v, _| sortino(v, rf)),
        MetricKind::MaxDrawdown => both(title, &data, |v, _| max_drawdown(v)),
        MetricKind::Skew => both(title, &data, |v, _| skew(v)),
        MetricKind::Kurtosis => both(title, &data, |v, _| kurtosis(v)),
        MetricKind::TailRatio => both(title, &data, |v, _| tail_ratio(v)),
        MetricKind::GainToPain => both(title, &data, |v, _| gain_to_pain(v)),
        MetricKind::CommonSense => both(title, &data, |v, _| common_sense_ratio(v)),
        MetricKind::Calmar => {
            let calmar_days = options.calmar_window.days();
            both(title, &data, |v, _| {
                let start = v.len().saturating_sub(calmar_days);
                calmar(&v[start..])
            })
        }
        MetricKind::RSquare => period_table(title, &["R2"], &data, |d| {
            vec![r2_score(&d.portfolio.values, &d.benchmark.values)]
        }),
        MetricKind::Beta => period_table(title, &["Beta"], &data, |d| {
            vec![beta(&d.portfolio.values, &d.benchmark.values)]
        }),
        MetricKind::TrackingError => period_table(title, &["Tracking error"], &data, |d| {
            vec![tracking_error(&d.portfolio.values, &d.benchmark.values)]
        }),
        MetricKind::InformationRatio => period_table(title, &["Information ratio"], &data, |d| {
            vec![information(snapshot, d, as_of)]
        }),
        MetricKind::JensensAlpha => period_table(title, &["Alpha"], &data, |d| {
            vec![jensens_alpha(&d.portfolio.values, &d.benchmark.values, rf)]
        }),
        MetricKind::Kelly => period_table(title, &[PORTFOLIO, BENCHMARK], &data, |d| {
            trade_metric(snapshot, d, as_of, false, kelly_criterion)
        }),
        MetricKind::PayoffRatio => period_table(title, &[PORTFOLIO, BENCHMARK], &data, |d| {
            trade_metric(snapshot, d, as_of, false, payoff_ratio)
        }),
        MetricKind::ProfitFactor => period_table(title, &[PORTFOLIO, BENCHMARK], &data, |d| {
            trade_metric(snapshot, d, as_of, true, profit_factor)
        }),
        MetricKind::Stats => {
            let p = describe(&p_all.values);
            let b = describe(&b_all.values);
            let mut table = MetricTable::new(title, &[PORTFOLIO, BENCHMARK]);
            for ((label, pc), (_, bc)) in p.rows().into_iter().zip(b.rows()) {
                table.push(label, vec![pc, bc]);
            }
            table
        }
        MetricKind::Summary => summary(snapshot, options, as_of),
        MetricKind::Cumulative => return pair_series(title, cumulative_returns(p_all), cumulative_returns(b_all)),
        MetricKind::Drawdown => return pair_series(title, drawdown_series(p_all), drawdown_series(b_all)),
        MetricKind::RollingVolatility => {
            return pair_series(title, rolling_volatility(p_all, window), rolling_volatility(b_all, window))
        }
        MetricKind::RollingSharpe => {
            return pair_series(title, rolling_sharpe(p_all, window, rf), rolling_sharpe(b_all, window, rf))
        }
        MetricKind::RollingSortino => {
            return pair_series(title, rolling_sortino(p_all, window, rf), rolling_sortino(b_all, window, rf))
        }
        MetricKind::RollingCalmar => {
            return pair_series(title, rolling_calmar(p_all, window), rolling_calmar(b_all, window))
        }
        MetricKind::RollingBeta => {
            return MetricOutput::Series {
                title: title.to_string(),
                series: vec![("Beta".to_string(), rolling_beta(p_all, b_all, window))],
            }
        }
        MetricKind::RollingAlpha => {
            return MetricOutput::Series {
                title: title.to_string(),
                series: vec![("Alpha".to_string(), rolling_alpha(p_all, b_all, window, rf))],
            }
        }
    };
    MetricOutput::Table(table)
}

fn pair_series(title: &str, portfolio: Series, benchmark: Series) -> MetricOutput {
    MetricOutput::Series {
        title: title.to_string(),
        series: vec![(PORTFOLIO.to_string(), portfolio), (BENCHMARK.to_string(), benchmark)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::portfolio::benchmark::apply_benchmark;
    use crate::portfolio::fixtures::*;
    use crate::portfolio::{generate_portfolio_data, PriceTable};
    use rust_decimal_macros::dec;

    fn benchmarked() -> BenchmarkedSnapshot {
        let ledger = Ledger::new(vec![
            trade(2, "AAPL", dec!(10), dec!(100)),
            trade(8, "AAPL", dec!(-5), dec!(112)),
        ]);
        let closes = [
            (2, dec!(100)),
            (3, dec!(102)),
            (4, dec!(101)),
            (5, dec!(104)),
            (8, dec!(108)),
            (9, dec!(107)),
            (10, dec!(111)),
        ];
        let mut prices = PriceTable::new();
        prices.insert("AAPL".to_string(), bars(&closes));
        let snapshot = generate_portfolio_data(ledger, prices).unwrap();

        let spy = bars(&[
            (1, dec!(400)),
            (2, dec!(401)),
            (3, dec!(404)),
            (4, dec!(402)),
            (5, dec!(405)),
            (8, dec!(407)),
            (9, dec!(406)),
            (10, dec!(410)),
        ]);
        apply_benchmark(snapshot, "SPY", spy, false).unwrap()
    }

    #[test]
    fn test_parse_metric_names() {
        assert_eq!("sharpe".parse::<MetricKind>().unwrap(), MetricKind::Sharpe);
        assert!("rolling-beta".parse::<MetricKind>().is_err());
        assert_eq!("r-beta".parse::<MetricKind>().unwrap(), MetricKind::RollingBeta);
        for kind in MetricKind::ALL {
            assert_eq!(kind.name().parse::<MetricKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_every_metric_output_is_well_formed() {
        let snapshot = benchmarked();
        let options = MetricOptions::default();
        let labels: Vec<&str> = ALL_PERIODS.iter().map(|p| p.label()).collect();

        for kind in MetricKind::ALL {
            match compute_metric(kind, &snapshot, &options) {
                MetricOutput::Table(table) => {
                    assert!(!table.rows.is_empty(), "{}", kind.name());
                    for row in &table.rows {
                        assert_eq!(row.cells.len(), table.columns.len(), "{} {}", kind.name(), row.label);
                    }
                    if !matches!(kind, MetricKind::Stats | MetricKind::Summary) {
                        let rows: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
                        assert_eq!(rows, labels, "{}", kind.name());
                    }
                }
                MetricOutput::Series { title, series } => {
                    assert!(!series.is_empty(), "{}", title);
                    for (name, s) in &series {
                        assert_eq!(s.dates.len(), s.values.len(), "{} {}", title, name);
                        assert!(s.dates.windows(2).all(|w| w[0] < w[1]), "{} {}", title, name);
                        assert_eq!(s.dates, series[0].1.dates, "{} {}", title, name);
                    }
                }
            }
        }
    }

    #[test]
    fn test_period_tables_have_all_periods() {
        let snapshot = benchmarked();
        let MetricOutput::Table(table) = compute_metric(MetricKind::Sharpe, &snapshot, &MetricOptions::default()) else {
            panic!("expected a table");
        };
        assert_eq!(table.rows.len(), ALL_PERIODS.len());
        assert!(table.cell("all", "Portfolio").unwrap().is_ok());
        // Ten years of data are not available, but the period still covers every row
        assert!(table.cell("10y", "Portfolio").unwrap().is_ok());
    }

    #[test]
    fn test_empty_periods_yield_placeholders() {
        let snapshot = benchmarked();
        let options = MetricOptions {
            as_of: NaiveDate::from_ymd_opt(2023, 6, 30),
            ..Default::default()
        };
        for kind in [MetricKind::TrackingError, MetricKind::InformationRatio] {
            let MetricOutput::Table(table) = compute_metric(kind, &snapshot, &options) else {
                panic!("expected a table");
            };
            for row in &table.rows {
                assert!(row.cells.iter().all(|c| *c == Err(InsufficientData::EmptyPeriod)));
            }
        }
    }

    #[test]
    fn test_rolling_window_larger_than_sample_is_empty() {
        let snapshot = benchmarked();
        let options = MetricOptions {
            window: Period::OneYear,
            ..Default::default()
        };
        let MetricOutput::Series { series, .. } = compute_metric(MetricKind::RollingSharpe, &snapshot, &options) else {
            panic!("expected series");
        };
        assert!(series.iter().all(|(_, s)| s.is_empty()));
    }

    #[test]
    fn test_kelly_without_losses_is_placeholder() {
        let snapshot = benchmarked();
        let MetricOutput::Table(table) = compute_metric(MetricKind::Kelly, &snapshot, &MetricOptions::default()) else {
            panic!("expected a table");
        };
        // Buying at 100 and selling at 112 are both gains against the last close of 111
        assert_eq!(table.cell("all", "Portfolio"), Some(&Err(InsufficientData::ZeroDenominator)));
    }

    #[test]
    fn test_summary_rows() {
        let snapshot = benchmarked();
        let MetricOutput::Table(table) = compute_metric(MetricKind::Summary, &snapshot, &MetricOptions::default()) else {
            panic!("expected a table");
        };
        assert_eq!(table.columns.len(), 3);
        assert!(table.row("Beta").is_some());
        let drawdown = table.cell("Maximum drawdown", "Portfolio").unwrap().clone().unwrap();
        assert!(drawdown <= Decimal::ZERO);
    }
}
