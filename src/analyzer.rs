use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::address::classify;
use crate::config::{Config, ScanConfig};
use crate::insights::{attach_insights, InsightGenerator, LlmInsights};
use crate::prices::{CoinGeckoPrices, PriceLookup};
use crate::providers::{HttpTransport, ProviderRegistry, Transport};
use crate::report::{aggregate, WalletReport};
use crate::scan::{working_set, ClassificationError, ScanCoordinator};

/// Classify, scan, price and aggregate one address.
///
/// Holds only shared read-only handles, so one instance serves every request.
pub struct WalletAnalyzer {
    coordinator: ScanCoordinator,
    prices: Arc<dyn PriceLookup>,
    insights: Option<Arc<dyn InsightGenerator>>,
    default_budget: Duration,
    max_budget: Duration,
}

impl WalletAnalyzer {
    pub fn new(registry: ProviderRegistry, prices: Arc<dyn PriceLookup>, scan: &ScanConfig) -> Self {
        Self {
            coordinator: ScanCoordinator::new(registry),
            prices,
            insights: None,
            default_budget: Duration::from_millis(scan.time_budget_ms),
            max_budget: Duration::from_millis(scan.max_time_budget_ms),
        }
    }

    pub fn with_insights(mut self, generator: Arc<dyn InsightGenerator>) -> Self {
        self.insights = Some(generator);
        self
    }

    /// Wire the live providers, price oracle and insight backend over one
    /// shared HTTP client.
    pub fn init(config: &Config) -> eyre::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        let registry = ProviderRegistry::from_config(transport.clone(), &config.providers);
        let prices = Arc::new(CoinGeckoPrices::new(transport.clone(), &config.prices));

        if config.providers.etherscan_api_key.is_none() {
            tracing::warn!("ETHERSCAN_API_KEY not set, EVM chains will likely fail");
        }

        let mut analyzer = Self::new(registry, prices, &config.scan);
        if config.insights.enabled {
            if config.insights.api_key().is_none() {
                tracing::warn!(
                    provider = %config.insights.provider,
                    "No API key for insight provider, narratives will report it as unavailable"
                );
            }
            let insights = LlmInsights::from_config(transport, &config.insights);
            tracing::info!(
                backend = insights.backend().as_str(),
                model = %config.insights.model_name(),
                "Insight generation enabled"
            );
            analyzer = analyzer.with_insights(Arc::new(insights));
        }
        Ok(analyzer)
    }

    pub fn default_budget(&self) -> Duration {
        self.default_budget
    }

    pub fn insights_enabled(&self) -> bool {
        self.insights.is_some()
    }

    /// Run one analysis under `budget` (clamped to the configured maximum).
    ///
    /// Only classification problems are errors. Chain failures and missing
    /// prices are reported inside the returned report.
    pub async fn analyze(
        &self,
        address: &str,
        chains: Option<&[String]>,
        budget: Duration,
    ) -> Result<WalletReport, ClassificationError> {
        let address = address.trim();
        let family = classify(address);
        let chains = working_set(family, chains)?;

        let budget = budget.min(self.max_budget);
        let deadline = Instant::now() + budget;
        let symbols: BTreeSet<String> = chains
            .iter()
            .map(|c| c.native_symbol.to_string())
            .collect();

        tracing::info!(
            address = %address,
            family = %family,
            chains = chains.len(),
            budget_ms = budget.as_millis() as u64,
            "Analyzing wallet"
        );

        let quote = async {
            match tokio::time::timeout_at(deadline, self.prices.quote(&symbols, deadline)).await {
                Ok(quote) => quote,
                Err(_) => {
                    tracing::warn!("Price lookup exceeded the scan deadline, using fallback prices");
                    self.prices.fallback_quote(&symbols)
                }
            }
        };
        let (outcomes, quote) = tokio::join!(self.coordinator.scan(address, &chains, deadline), quote);

        let report = aggregate(address, family, &chains, &outcomes, &quote, Utc::now());
        tracing::info!(
            address = %address,
            active_chains = report.chains_with_activity.len(),
            failed_chains = report.failed_chains.len(),
            total_tx_count = report.total_tx_count,
            "Analysis complete"
        );
        Ok(report)
    }

    /// Attach the narrative when an insight backend is configured.
    pub async fn describe(&self, report: &mut WalletReport) {
        if let Some(generator) = &self.insights {
            attach_insights(report, generator.as_ref()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressFamily;
    use crate::chains::ChainDescriptor;
    use crate::config::{PricesConfig, ProvidersConfig};
    use crate::insights::InsightError;
    use crate::prices::testing::FixedPrices;
    use crate::providers::bitcoin::BitcoinProvider;
    use crate::providers::transport::testing::{FakeTransport, Reply};
    use crate::providers::{ChainProvider, ProviderFailure, RawActivity};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VITALIK: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
    const GENESIS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    /// EVM provider: ethereum has activity, fantom hangs, the rest are empty.
    #[derive(Default)]
    struct EvmStub {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainProvider for EvmStub {
        async fn fetch(
            &self,
            _address: &str,
            chain: &ChainDescriptor,
            _deadline: Instant,
        ) -> Result<RawActivity, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match chain.id {
                "ethereum" => Ok(RawActivity {
                    reported_tx_count: Some(12),
                    ..RawActivity::default()
                }),
                "fantom" => futures::future::pending().await,
                _ => Ok(RawActivity::empty()),
            }
        }
    }

    struct Echo;

    #[async_trait]
    impl InsightGenerator for Echo {
        async fn generate(&self, report: &WalletReport) -> Result<String, InsightError> {
            Ok(format!("{} active chains", report.chains_with_activity.len()))
        }
    }

    fn scan_config() -> ScanConfig {
        ScanConfig {
            time_budget_ms: 2_000,
            max_time_budget_ms: 5_000,
        }
    }

    fn evm_analyzer(stub: Arc<EvmStub>, prices: Arc<FixedPrices>) -> WalletAnalyzer {
        WalletAnalyzer::new(
            ProviderRegistry::new().with_provider(AddressFamily::Evm, stub),
            prices,
            &scan_config(),
        )
    }

    #[tokio::test]
    async fn bitcoin_genesis_end_to_end() {
        let fake = Arc::new(FakeTransport::new().route(
            "/rawaddr/",
            FakeTransport::json(
                200,
                json!({
                    "n_tx": 56755,
                    "total_received": 10711067091u64,
                    "total_sent": 0,
                    "final_balance": 10711067091u64,
                    "txs": []
                }),
            ),
        ));
        let registry = ProviderRegistry::new().with_provider(
            AddressFamily::Bitcoin,
            Arc::new(BitcoinProvider::new(fake, &ProvidersConfig::default())),
        );
        let prices = Arc::new(FixedPrices::new(&[("BTC", 63_000.0)]));
        let analyzer = WalletAnalyzer::new(registry, prices.clone(), &scan_config());

        let report = analyzer
            .analyze(&format!("  {}  ", GENESIS), None, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(report.address, GENESIS);
        assert_eq!(report.address_type, AddressFamily::Bitcoin);
        assert_eq!(report.chains_with_activity, vec!["bitcoin"]);
        assert_eq!(report.total_tx_count, 56755);
        assert!((report.total_received_usd - 107.11067091 * 63_000.0).abs() < 1e-6);
        assert_eq!(report.total_sent_usd, 0.0);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_address_fails_before_any_fetch() {
        let stub = Arc::new(EvmStub::default());
        let prices = Arc::new(FixedPrices::default());
        let analyzer = evm_analyzer(stub.clone(), prices.clone());

        let err = analyzer
            .analyze("not-a-wallet", None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::UnknownFamily(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn subset_restricts_chains_analyzed() {
        let stub = Arc::new(EvmStub::default());
        let analyzer = evm_analyzer(stub.clone(), Arc::new(FixedPrices::default()));
        let subset = vec!["base".to_string(), "ethereum".to_string(), "bitcoin".to_string()];

        let report = analyzer
            .analyze(VITALIK, Some(&subset), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(report.chains_analyzed, vec!["ethereum", "base"]);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_chain_does_not_exceed_budget() {
        let stub = Arc::new(EvmStub::default());
        let prices = Arc::new(FixedPrices::new(&[("ETH", 3_000.0)]));
        let analyzer = evm_analyzer(stub.clone(), prices).with_insights(Arc::new(Echo));

        let started = Instant::now();
        let mut report = analyzer
            .analyze(VITALIK, None, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(started.elapsed() <= Duration::from_millis(1_100));

        assert_eq!(stub.calls.load(Ordering::SeqCst), 8);
        assert_eq!(report.chains_analyzed.len(), 8);
        assert_eq!(report.chains_with_activity, vec!["ethereum"]);
        assert_eq!(report.failed_chains.len(), 1);
        assert_eq!(report.failed_chains[0].chain, "fantom");
        assert_eq!(report.failed_chains[0].kind, "timeout");

        analyzer.describe(&mut report).await;
        assert_eq!(report.insights(), Some("1 active chains"));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_clamped_to_maximum() {
        let stub = Arc::new(EvmStub::default());
        let analyzer = evm_analyzer(stub, Arc::new(FixedPrices::default()));

        let started = Instant::now();
        analyzer
            .analyze(VITALIK, None, Duration::from_secs(600))
            .await
            .unwrap();
        assert!(started.elapsed() <= Duration::from_millis(5_100));
        assert_eq!(analyzer.default_budget(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_price_oracle_uses_fallback_prices() {
        let fake = Arc::new(
            FakeTransport::new()
                .route(
                    "/rawaddr/",
                    FakeTransport::json(
                        200,
                        json!({
                            "n_tx": 1,
                            "total_received": 100_000_000u64,
                            "total_sent": 0,
                            "final_balance": 100_000_000u64,
                            "txs": []
                        }),
                    ),
                )
                .route("/simple/price", Reply::Hang),
        );
        let registry = ProviderRegistry::new().with_provider(
            AddressFamily::Bitcoin,
            Arc::new(BitcoinProvider::new(fake.clone(), &ProvidersConfig::default())),
        );
        let prices = Arc::new(CoinGeckoPrices::new(fake, &PricesConfig::default()));
        let analyzer = WalletAnalyzer::new(registry, prices, &scan_config());

        let report = analyzer
            .analyze(GENESIS, None, Duration::from_secs(5))
            .await
            .unwrap();

        let summary = &report.chain_summaries[0];
        assert_eq!(summary.price_usd, Some(95_000.0));
        assert_eq!(summary.total_received_usd, Some(95_000.0));
        assert!(report.warnings.iter().all(|w| !w.starts_with("Price unavailable")));
    }
}
