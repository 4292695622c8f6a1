//! Portfolio versus benchmark allocation by asset, sector, country or region.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::BenchmarkedSnapshot;
use crate::ledger::regions::region_of;
use crate::ledger::{InstrumentType, UNKNOWN_CATEGORY};
use crate::pricing::{FundHolding, FundProfile, MarketData};

/// Dimension an allocation is grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Asset,
    Sector,
    Country,
    Region,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Asset => "Asset",
            Category::Sector => "Sector",
            Category::Country => "Country",
            Category::Region => "Region",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asset" | "assets" => Ok(Category::Asset),
            "sector" | "sectors" => Ok(Category::Sector),
            "country" | "countries" => Ok(Category::Country),
            "region" | "regions" => Ok(Category::Region),
            other => Err(format!(
                "unknown category '{}' (asset, sector, country, region)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationRow {
    pub name: String,
    /// Fraction of the portfolio
    pub portfolio: Decimal,
    /// Fraction of the benchmark
    pub benchmark: Decimal,
}

/// Allocation of both sides, sorted by portfolio weight descending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationTable {
    pub category: Category,
    pub benchmark: String,
    pub rows: Vec<AllocationRow>,
}

impl AllocationTable {
    pub fn row(&self, name: &str) -> Option<&AllocationRow> {
        self.rows.iter().find(|r| r.name == name)
    }
}

/// Allocation tables computed so far in a session
#[derive(Debug, Default)]
pub struct AllocationCache {
    tables: HashMap<Category, AllocationTable>,
}

impl AllocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Allocation for `category`, computed on first use or when `force` is set
    pub async fn calculate<P: MarketData>(
        &mut self,
        snapshot: &BenchmarkedSnapshot,
        category: Category,
        provider: &P,
        force: bool,
    ) -> &AllocationTable {
        if force || !self.tables.contains_key(&category) {
            let table = calculate_allocation(snapshot, category, provider).await;
            self.tables.insert(category, table);
        } else {
            debug!("Allocation by {} served from cache", category);
        }
        &self.tables[&category]
    }
}

/// Accumulates weights per bucket
#[derive(Default)]
struct Buckets(BTreeMap<String, Decimal>);

impl Buckets {
    fn add(&mut self, name: &str, amount: Decimal) {
        let name = if name.trim().is_empty() { UNKNOWN_CATEGORY } else { name.trim() };
        *self.0.entry(name.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    /// Each bucket as a fraction of the total
    fn fractions(self) -> BTreeMap<String, Decimal> {
        let total: Decimal = self.0.values().sum();
        if total.is_zero() {
            return BTreeMap::new();
        }
        self.0.into_iter().map(|(k, v)| (k, v / total)).collect()
    }
}

/// Compute the allocation table for `category` without caching
pub async fn calculate_allocation<P: MarketData>(
    snapshot: &BenchmarkedSnapshot,
    category: Category,
    provider: &P,
) -> AllocationTable {
    let portfolio = portfolio_allocation(snapshot, category, provider).await;
    let symbol = &snapshot.benchmark.symbol;
    let benchmark = benchmark_allocation(symbol, category, provider).await;

    let mut names: Vec<&String> = portfolio.keys().chain(benchmark.keys()).collect();
    names.sort();
    names.dedup();

    let mut rows: Vec<AllocationRow> = names
        .into_iter()
        .map(|name| AllocationRow {
            name: name.clone(),
            portfolio: portfolio.get(name).copied().unwrap_or(Decimal::ZERO),
            benchmark: benchmark.get(name).copied().unwrap_or(Decimal::ZERO),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.portfolio
            .cmp(&a.portfolio)
            .then(b.benchmark.cmp(&a.benchmark))
            .then(a.name.cmp(&b.name))
    });

    info!("Allocation by {} computed with {} rows", category, rows.len());
    AllocationTable {
        category,
        benchmark: symbol.clone(),
        rows,
    }
}

async fn portfolio_allocation<P: MarketData>(
    snapshot: &BenchmarkedSnapshot,
    category: Category,
    provider: &P,
) -> BTreeMap<String, Decimal> {
    let ledger = &snapshot.portfolio.ledger;
    let mut buckets = Buckets::default();

    for (ticker, value) in snapshot.portfolio.holdings() {
        if value.is_zero() {
            continue;
        }
        let Some(tx) = ledger.first_transaction_of(ticker) else {
            continue;
        };

        let is_fund = tx.instrument_type == InstrumentType::Etf;
        match category {
            Category::Asset => buckets.add(ticker, value),
            Category::Sector if is_fund => {
                let weights = fund_profile(provider, ticker).await.sector_weights;
                spread(&mut buckets, value, &weights);
            }
            Category::Country | Category::Region if is_fund => {
                let holdings = fund_profile(provider, ticker).await.holdings;
                let countries = holding_countries(provider, &holdings).await;
                spread(&mut buckets, value, &regroup(countries, category));
            }
            Category::Sector => buckets.add(&tx.sector, value),
            Category::Country => buckets.add(&tx.country, value),
            Category::Region => buckets.add(&tx.region, value),
        }
    }
    buckets.fractions()
}

async fn benchmark_allocation<P: MarketData>(
    symbol: &str,
    category: Category,
    provider: &P,
) -> BTreeMap<String, Decimal> {
    let fund = fund_profile(provider, symbol).await;
    let weights = match category {
        Category::Asset => fund
            .holdings
            .iter()
            .map(|h| (h.symbol.clone(), h.weight))
            .collect(),
        Category::Sector => fund.sector_weights,
        Category::Country | Category::Region => {
            regroup(holding_countries(provider, &fund.holdings).await, category)
        }
    };

    let mut buckets = Buckets::default();
    for (name, weight) in &weights {
        buckets.add(name, *weight);
    }
    // Normalized to the weight the provider covers
    buckets.fractions()
}

async fn fund_profile<P: MarketData>(provider: &P, symbol: &str) -> FundProfile {
    match provider.fund_profile(symbol).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("No fund composition for {}: {}", symbol, e);
            FundProfile::default()
        }
    }
}

/// Holding weights keyed by the country of each holding
async fn holding_countries<P: MarketData>(
    provider: &P,
    holdings: &[FundHolding],
) -> Vec<(String, Decimal)> {
    let mut weights = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let country = match provider.profile(&holding.symbol).await {
            Ok(profile) => profile.country,
            Err(e) => {
                debug!("No profile for holding {}: {}", holding.symbol, e);
                None
            }
        };
        weights.push((
            country.unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
            holding.weight,
        ));
    }
    weights
}

fn regroup(countries: Vec<(String, Decimal)>, category: Category) -> Vec<(String, Decimal)> {
    if category != Category::Region {
        return countries;
    }
    countries
        .into_iter()
        .map(|(country, weight)| (region_of(&country).to_string(), weight))
        .collect()
}

/// Split `value` across `weights`; an empty composition lands in the unknown bucket
fn spread(buckets: &mut Buckets, value: Decimal, weights: &[(String, Decimal)]) {
    let covered: Decimal = weights.iter().map(|(_, w)| *w).sum();
    if covered.is_zero() {
        buckets.add(UNKNOWN_CATEGORY, value);
        return;
    }
    for (name, weight) in weights {
        buckets.add(name, value * *weight / covered);
    }
}
