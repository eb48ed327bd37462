pub mod coingecko;

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::time::Instant;

pub use coingecko::CoinGeckoPrices;

/// A symbol the price source could not quote. Affects only the chains whose
/// native asset is that symbol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("no USD price available for {symbol}")]
pub struct PriceUnavailable {
    pub symbol: String,
}

/// Spot USD prices for one request, keyed by native symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceQuote {
    prices: HashMap<String, f64>,
}

impl PriceQuote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price. Non-positive and non-finite values are ignored so that
    /// a zero from the oracle reads as "unavailable", not "worthless".
    pub fn insert(&mut self, symbol: impl Into<String>, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.prices.insert(symbol.into(), price);
        }
    }

    pub fn price(&self, symbol: &str) -> Result<f64, PriceUnavailable> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| PriceUnavailable {
                symbol: symbol.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, f64)> for PriceQuote {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut quote = PriceQuote::new();
        for (symbol, price) in iter {
            quote.insert(symbol, price);
        }
        quote
    }
}

/// Current-price source. One call per analysis, whatever the chain count.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Quote `symbols`, giving up on the live source at `deadline`.
    async fn quote(&self, symbols: &BTreeSet<String>, deadline: Instant) -> PriceQuote;

    /// Offline prices for when no live quote arrives in time.
    fn fallback_quote(&self, _symbols: &BTreeSet<String>) -> PriceQuote {
        PriceQuote::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed price table that counts how often it is asked.
    #[derive(Default)]
    pub struct FixedPrices {
        prices: HashMap<String, f64>,
        pub calls: AtomicUsize,
    }

    impl FixedPrices {
        pub fn new(prices: &[(&str, f64)]) -> Self {
            Self {
                prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PriceLookup for FixedPrices {
        async fn quote(&self, symbols: &BTreeSet<String>, _deadline: Instant) -> PriceQuote {
            self.calls.fetch_add(1, Ordering::SeqCst);
            symbols
                .iter()
                .filter_map(|s| self.prices.get(s).map(|p| (s.clone(), *p)))
                .collect()
        }
    }
}
