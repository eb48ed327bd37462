use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::PricesConfig;
use crate::providers::transport::{fetch_json, HttpRequest, Transport};
use crate::providers::ProviderFailure;

use super::{PriceLookup, PriceQuote};

/// CoinGecko asset ids for the native symbols in the chain catalog.
const COINGECKO_IDS: &[(&str, &str)] = &[
    ("ETH", "ethereum"),
    ("POL", "polygon-ecosystem-token"),
    ("BNB", "binancecoin"),
    ("AVAX", "avalanche-2"),
    ("FTM", "fantom"),
    ("SOL", "solana"),
    ("BTC", "bitcoin"),
    ("TRX", "tron"),
];

fn coingecko_id(symbol: &str) -> Option<&'static str> {
    COINGECKO_IDS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, id)| *id)
}

/// `simple/price` lookup with one retry on 429 and a configured fallback
/// table when the oracle cannot be reached at all.
pub struct CoinGeckoPrices {
    transport: Arc<dyn Transport>,
    base_url: String,
    request_timeout: Duration,
    retry_delay: Duration,
    fallback: HashMap<String, f64>,
}

impl CoinGeckoPrices {
    pub fn new(transport: Arc<dyn Transport>, config: &PricesConfig) -> Self {
        Self {
            transport,
            base_url: config.coingecko_base.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            fallback: config.fallback.clone(),
        }
    }

    async fn fetch_live(
        &self,
        ids: &BTreeSet<&'static str>,
        deadline: Instant,
    ) -> Result<HashMap<String, f64>, ProviderFailure> {
        let joined = ids.iter().copied().collect::<Vec<_>>().join(",");
        let mut attempt = 0;

        loop {
            let request = HttpRequest::get(format!("{}/simple/price", self.base_url))
                .query("ids", &joined)
                .query("vs_currencies", "usd");
            let attempt_deadline = (Instant::now() + self.request_timeout).min(deadline);

            let result: Result<HashMap<String, HashMap<String, f64>>, _> =
                fetch_json(self.transport.as_ref(), request, attempt_deadline).await;

            match result {
                Ok(body) => {
                    return Ok(body
                        .into_iter()
                        .filter_map(|(id, quote)| quote.get("usd").map(|p| (id, *p)))
                        .collect());
                }
                Err(ProviderFailure::RateLimited(msg))
                    if attempt == 0 && Instant::now() + self.retry_delay < deadline =>
                {
                    tracing::debug!(error = %msg, "CoinGecko rate limited, retrying once");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl PriceLookup for CoinGeckoPrices {
    async fn quote(&self, symbols: &BTreeSet<String>, deadline: Instant) -> PriceQuote {
        let ids: BTreeSet<&'static str> = symbols.iter().filter_map(|s| coingecko_id(s)).collect();
        if ids.is_empty() {
            return PriceQuote::new();
        }

        match self.fetch_live(&ids, deadline).await {
            Ok(by_id) if by_id.values().any(|p| *p > 0.0) => {
                let quote: PriceQuote = symbols
                    .iter()
                    .filter_map(|s| {
                        let id = coingecko_id(s)?;
                        by_id.get(id).map(|p| (s.clone(), *p))
                    })
                    .collect();
                tracing::debug!(symbols = symbols.len(), priced = quote.len(), "Prices fetched");
                quote
            }
            Ok(_) => {
                tracing::warn!("CoinGecko returned no usable prices, using fallback prices");
                self.fallback_quote(symbols)
            }
            Err(e) => {
                tracing::warn!(error = %e, "CoinGecko unavailable, using fallback prices");
                self.fallback_quote(symbols)
            }
        }
    }

    fn fallback_quote(&self, symbols: &BTreeSet<String>) -> PriceQuote {
        symbols
            .iter()
            .filter_map(|s| self.fallback.get(s).map(|p| (s.clone(), *p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::transport::testing::{FakeTransport, Reply};
    use serde_json::json;

    fn symbols(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    fn lookup(fake: Arc<FakeTransport>) -> CoinGeckoPrices {
        CoinGeckoPrices::new(fake, &PricesConfig::default())
    }

    #[tokio::test]
    async fn live_prices_by_symbol() {
        let fake = Arc::new(FakeTransport::new().route(
            "/simple/price",
            FakeTransport::json(200, json!({"bitcoin": {"usd": 63000.0}, "ethereum": {"usd": 3000.5}})),
        ));
        let quote = lookup(fake.clone()).quote(&symbols(&["BTC", "ETH", "TRX"]), deadline()).await;

        assert_eq!(quote.price("BTC"), Ok(63000.0));
        assert_eq!(quote.price("ETH"), Ok(3000.5));
        // missing from the live response: unavailable, not the fallback
        assert!(quote.price("TRX").is_err());
        assert_eq!(fake.call_count(), 1);
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0].query_value("ids"), Some("bitcoin,ethereum,tron"));
    }

    #[tokio::test]
    async fn outage_uses_fallback_table() {
        let fake = Arc::new(FakeTransport::new().route("/simple/price", Reply::Json(500, String::new())));
        let quote = lookup(fake).quote(&symbols(&["SOL", "DOGE"]), deadline()).await;

        assert_eq!(quote.price("SOL"), Ok(170.0));
        assert!(quote.price("DOGE").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_once_on_rate_limit() {
        let fake = Arc::new(FakeTransport::new().route("/simple/price", Reply::Json(429, String::new())));
        let quote = lookup(fake.clone()).quote(&symbols(&["BTC"]), deadline()).await;

        assert_eq!(fake.call_count(), 2);
        assert_eq!(quote.price("BTC"), Ok(95000.0));
    }

    #[tokio::test]
    async fn unknown_symbols_skip_the_call() {
        let fake = Arc::new(FakeTransport::new());
        let quote = lookup(fake.clone()).quote(&symbols(&["DOGE"]), deadline()).await;
        assert!(quote.is_empty());
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_oracle_falls_back_at_the_deadline() {
        let fake = Arc::new(FakeTransport::new().route("/simple/price", Reply::Hang));
        let started = Instant::now();
        let quote = lookup(fake)
            .quote(&symbols(&["BTC"]), started + Duration::from_secs(2))
            .await;

        // request_timeout is 10s, the tighter deadline wins
        assert!(started.elapsed() <= Duration::from_secs(2));
        assert_eq!(quote.price("BTC"), Ok(95000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_pause_past_the_deadline() {
        let fake = Arc::new(FakeTransport::new().route("/simple/price", Reply::Json(429, String::new())));
        let started = Instant::now();
        let quote = lookup(fake.clone())
            .quote(&symbols(&["ETH"]), started + Duration::from_secs(1))
            .await;

        assert_eq!(fake.call_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(quote.price("ETH"), Ok(2500.0));
    }
}
