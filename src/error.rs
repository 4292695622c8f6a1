//! Error handling for perfana
//!
//! Library seams return typed errors built with `thiserror`; the CLI layer and
//! file handling use anyhow for context chaining and error propagation.

use thiserror::Error;

/// Errors raised while building portfolio and benchmark state
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("ledger has no usable transactions")]
    EmptyLedger,

    #[error("no price history available for {0}")]
    MissingPrices(String),

    #[error("benchmark {0} returned no price data")]
    BenchmarkNotFound(String),
}

/// Errors raised by market data providers
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("request to {provider} failed: {message}")]
    Request { provider: &'static str, message: String },

    #[error("{provider} returned no data for {symbol}")]
    NoData {
        provider: &'static str,
        symbol: String,
    },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Why a metric cell could not be computed.
///
/// Rendered as `-` in terminal tables and `null` in JSON output, so it can
/// never be mistaken for a numeric value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsufficientData {
    #[error("no observations in period")]
    EmptyPeriod,

    #[error("not enough observations ({have} < {need})")]
    TooFewObservations { have: usize, need: usize },

    #[error("denominator is zero")]
    ZeroDenominator,

    #[error("no benchmark data")]
    NoBenchmark,

    #[error("value outside the representable range")]
    OutOfRange,
}

/// Result type alias for fallible application code
pub type Result<T> = anyhow::Result<T>;
