pub mod handlers;
pub mod rpc;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analyzer::WalletAnalyzer;

pub const SERVICE_NAME: &str = "Web3 Wallet Analyzer Agent";

pub struct AppState {
    pub analyzer: WalletAnalyzer,
}

pub fn router(analyzer: WalletAnalyzer) -> Router {
    let state = Arc::new(AppState { analyzer });

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::analyze))
        .route("/.well-known/agent.json", get(rpc::agent_card))
        .route("/a2a", post(rpc::a2a))
        .route("/mcp", post(rpc::mcp))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` is cancelled, letting in-flight requests finish.
pub async fn serve(
    analyzer: WalletAnalyzer,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(analyzer);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre::eyre!("Failed to bind {}: {}", addr, e))?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) const TEST_BTC_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

/// State backed by a fake blockchain.info that knows the genesis address,
/// fixed prices and a canned narrative.
#[cfg(test)]
pub(crate) fn test_state() -> Arc<AppState> {
    use crate::address::AddressFamily;
    use crate::config::{ProvidersConfig, ScanConfig};
    use crate::insights::{InsightError, InsightGenerator};
    use crate::prices::testing::FixedPrices;
    use crate::providers::bitcoin::BitcoinProvider;
    use crate::providers::transport::testing::FakeTransport;
    use crate::providers::ProviderRegistry;
    use crate::report::WalletReport;

    struct Canned;

    #[async_trait::async_trait]
    impl InsightGenerator for Canned {
        async fn generate(&self, report: &WalletReport) -> Result<String, InsightError> {
            Ok(format!("Narrative for {}", report.chains_with_activity.join(", ")))
        }
    }

    let fake = FakeTransport::new().route(
        "/rawaddr/",
        FakeTransport::json(
            200,
            serde_json::json!({
                "n_tx": 56755,
                "total_received": 10711067091u64,
                "total_sent": 0,
                "final_balance": 10711067091u64,
                "txs": []
            }),
        ),
    );
    let registry = ProviderRegistry::new().with_provider(
        AddressFamily::Bitcoin,
        Arc::new(BitcoinProvider::new(Arc::new(fake), &ProvidersConfig::default())),
    );
    let analyzer = WalletAnalyzer::new(
        registry,
        Arc::new(FixedPrices::new(&[("BTC", 63_000.0)])),
        &ScanConfig::default(),
    )
    .with_insights(Arc::new(Canned));

    Arc::new(AppState { analyzer })
}
