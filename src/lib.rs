//! Perfana - portfolio performance analytics
//!
//! This library imports a transaction ledger, rebuilds the portfolio's daily
//! state from market prices, replays its cash flows into a benchmark and
//! computes return, risk and allocation metrics over the result.

pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod importers;
pub mod ledger;
pub mod metrics;
pub mod portfolio;
pub mod pricing;
pub mod utils;
