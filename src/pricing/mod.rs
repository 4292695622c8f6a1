// Pricing module - market data providers, session cache and retry policy

pub mod local;
pub mod retry;
pub mod yahoo;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::db;
use crate::error::PricingError;
use crate::ledger::SplitEvent;

pub use local::LocalProvider;
pub use retry::RetryPolicy;
pub use yahoo::YahooProvider;

/// One daily bar of a price series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Decimal,
    pub adj_close: Decimal,
}

/// Categorical metadata of a listed company
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
}

/// A fund constituent and its weight (fraction of fund assets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundHolding {
    pub symbol: String,
    pub name: Option<String>,
    pub weight: Decimal,
}

/// Composition of an ETF or index fund
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundProfile {
    /// Sector name -> weight (fraction of fund assets)
    pub sector_weights: Vec<(String, Decimal)>,
    pub holdings: Vec<FundHolding>,
}

/// Source of prices and instrument metadata.
///
/// Every lookup the engine needs from the outside world goes through this
/// trait so the transformation code can be exercised with in-memory data.
#[allow(async_fn_in_trait)]
pub trait MarketData {
    /// Short provider name for logs and errors
    fn name(&self) -> &'static str;

    /// Daily bars between `from` and `to` (inclusive), sorted by date
    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, PricingError>;

    /// Split events between `from` and `to`, sorted by date
    async fn splits(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SplitEvent>, PricingError>;

    /// Provider-native ticker for an ISIN, if any
    async fn resolve_isin(&self, isin: &str) -> Result<Option<String>, PricingError>;

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, PricingError>;

    async fn fund_profile(&self, symbol: &str) -> Result<FundProfile, PricingError>;
}

type HistoryKey = (String, NaiveDate, NaiveDate);

/// Provider wrapper that caches prices and profiles for the session.
///
/// When a SQLite store is attached, histories and profiles also persist
/// across sessions. The store is a cache only; failures to read or write it
/// are logged and ignored.
pub struct CachedMarketData<P> {
    inner: P,
    prices: Arc<Mutex<HashMap<HistoryKey, Vec<PricePoint>>>>,
    profiles: Arc<Mutex<HashMap<String, CompanyProfile>>>,
    store: Option<Mutex<Connection>>,
}

impl<P: MarketData> CachedMarketData<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            prices: Arc::new(Mutex::new(HashMap::new())),
            profiles: Arc::new(Mutex::new(HashMap::new())),
            store: None,
        }
    }

    /// Attach a persistent SQLite cache
    pub fn with_store(mut self, conn: Connection) -> Self {
        self.store = Some(Mutex::new(conn));
        self
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Number of histories held in memory
    pub fn cache_size(&self) -> usize {
        self.prices.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.prices.lock() {
            cache.clear();
        }
        if let Ok(mut cache) = self.profiles.lock() {
            cache.clear();
        }
        info!("Session price cache cleared");
    }

    fn stored_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Option<Vec<PricePoint>> {
        let store = self.store.as_ref()?;
        let conn = store.lock().ok()?;
        match db::load_cached_history(&conn, symbol, from, to) {
            Ok(found) => found,
            Err(e) => {
                warn!("Price cache read failed for {}: {}", symbol, e);
                None
            }
        }
    }

    fn store_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate, points: &[PricePoint]) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Ok(mut conn) = store.lock() {
            if let Err(e) = db::save_history(&mut conn, symbol, from, to, points) {
                warn!("Price cache write failed for {}: {}", symbol, e);
            }
        }
    }
}

impl<P: MarketData> MarketData for CachedMarketData<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, PricingError> {
        let key = (symbol.to_string(), from, to);
        if let Some(points) = self.prices.lock().ok().and_then(|c| c.get(&key).cloned()) {
            debug!("Using session cache for {} ({} to {})", symbol, from, to);
            return Ok(points);
        }

        if let Some(points) = self.stored_history(symbol, from, to) {
            debug!("Using stored prices for {} ({} to {})", symbol, from, to);
            if let Ok(mut cache) = self.prices.lock() {
                cache.insert(key, points.clone());
            }
            return Ok(points);
        }

        info!("Fetching price history for {} from {}", symbol, self.inner.name());
        let points = self.inner.history(symbol, from, to).await?;
        self.store_history(symbol, from, to, &points);
        if let Ok(mut cache) = self.prices.lock() {
            cache.insert(key, points.clone());
        }
        Ok(points)
    }

    async fn splits(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SplitEvent>, PricingError> {
        self.inner.splits(symbol, from, to).await
    }

    async fn resolve_isin(&self, isin: &str) -> Result<Option<String>, PricingError> {
        self.inner.resolve_isin(isin).await
    }

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, PricingError> {
        if let Some(profile) = self.profiles.lock().ok().and_then(|c| c.get(symbol).cloned()) {
            return Ok(profile);
        }

        let stored = self.store.as_ref().and_then(|store| {
            let conn = store.lock().ok()?;
            db::load_profile(&conn, symbol).ok().flatten()
        });

        let profile = match stored {
            Some(profile) => profile,
            None => {
                let profile = self.inner.profile(symbol).await?;
                if let Some(store) = self.store.as_ref() {
                    if let Ok(conn) = store.lock() {
                        if let Err(e) = db::save_profile(&conn, symbol, &profile) {
                            warn!("Profile cache write failed for {}: {}", symbol, e);
                        }
                    }
                }
                profile
            }
        };

        if let Ok(mut cache) = self.profiles.lock() {
            cache.insert(symbol.to_string(), profile.clone());
        }
        Ok(profile)
    }

    async fn fund_profile(&self, symbol: &str) -> Result<FundProfile, PricingError> {
        self.inner.fund_profile(symbol).await
    }
}

/// Provider picked at startup: CSV files on disk or Yahoo Finance
pub enum MarketSource {
    Local(LocalProvider),
    Yahoo(YahooProvider),
}

impl MarketData for MarketSource {
    fn name(&self) -> &'static str {
        match self {
            MarketSource::Local(p) => p.name(),
            MarketSource::Yahoo(p) => p.name(),
        }
    }

    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, PricingError> {
        match self {
            MarketSource::Local(p) => p.history(symbol, from, to).await,
            MarketSource::Yahoo(p) => p.history(symbol, from, to).await,
        }
    }

    async fn splits(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SplitEvent>, PricingError> {
        match self {
            MarketSource::Local(p) => p.splits(symbol, from, to).await,
            MarketSource::Yahoo(p) => p.splits(symbol, from, to).await,
        }
    }

    async fn resolve_isin(&self, isin: &str) -> Result<Option<String>, PricingError> {
        match self {
            MarketSource::Local(p) => p.resolve_isin(isin).await,
            MarketSource::Yahoo(p) => p.resolve_isin(isin).await,
        }
    }

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, PricingError> {
        match self {
            MarketSource::Local(p) => p.profile(symbol).await,
            MarketSource::Yahoo(p) => p.profile(symbol).await,
        }
    }

    async fn fund_profile(&self, symbol: &str) -> Result<FundProfile, PricingError> {
        match self {
            MarketSource::Local(p) => p.fund_profile(symbol).await,
            MarketSource::Yahoo(p) => p.fund_profile(symbol).await,
        }
    }
}

/// Days of history requested before inception so forward-fill has a start value
pub const LOOKBACK_DAYS: i64 = 5;

/// Date range to download for a ledger starting at `inception`
pub fn history_window(inception: NaiveDate, to: NaiveDate) -> (NaiveDate, NaiveDate) {
    (inception - chrono::Duration::days(LOOKBACK_DAYS), to)
}

/// Close to use for valuation: plain close for crypto, adjusted close otherwise
pub fn valuation_price(point: &PricePoint, adjusted: bool) -> Decimal {
    if adjusted {
        point.adj_close
    } else {
        point.close
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider shared by unit tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct StaticProvider {
        pub prices: HashMap<String, Vec<PricePoint>>,
        pub splits: HashMap<String, Vec<SplitEvent>>,
        pub isins: HashMap<String, String>,
        pub profiles: HashMap<String, CompanyProfile>,
        pub funds: HashMap<String, FundProfile>,
        pub history_calls: AtomicUsize,
    }

    impl StaticProvider {
        pub fn with_closes(mut self, symbol: &str, closes: &[(NaiveDate, Decimal)]) -> Self {
            let points = closes
                .iter()
                .map(|(date, close)| PricePoint {
                    date: *date,
                    close: *close,
                    adj_close: *close,
                })
                .collect();
            self.prices.insert(symbol.to_string(), points);
            self
        }
    }

    impl MarketData for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn history(
            &self,
            symbol: &str,
            from: NaiveDate,
            to: NaiveDate,
        ) -> Result<Vec<PricePoint>, PricingError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            let points: Vec<PricePoint> = self
                .prices
                .get(symbol)
                .map(|all| {
                    all.iter()
                        .filter(|p| p.date >= from && p.date <= to)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            if points.is_empty() {
                return Err(PricingError::NoData {
                    provider: "static",
                    symbol: symbol.to_string(),
                });
            }
            Ok(points)
        }

        async fn splits(
            &self,
            symbol: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<SplitEvent>, PricingError> {
            Ok(self.splits.get(symbol).cloned().unwrap_or_default())
        }

        async fn resolve_isin(&self, isin: &str) -> Result<Option<String>, PricingError> {
            Ok(self.isins.get(isin).cloned())
        }

        async fn profile(&self, symbol: &str) -> Result<CompanyProfile, PricingError> {
            self.profiles.get(symbol).cloned().ok_or(PricingError::NoData {
                provider: "static",
                symbol: symbol.to_string(),
            })
        }

        async fn fund_profile(&self, symbol: &str) -> Result<FundProfile, PricingError> {
            self.funds.get(symbol).cloned().ok_or(PricingError::NoData {
                provider: "static",
                symbol: symbol.to_string(),
            })
        }
    }
}
