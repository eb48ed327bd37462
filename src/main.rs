use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use walletscope::analyzer::WalletAnalyzer;
use walletscope::config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Credentials may live in a local .env file
    dotenv::dotenv().ok();

    // Initialize structured logging (set RUST_LOG=debug for per-chain detail,
    // LOG_FORMAT=json for machine-readable output)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!("Walletscope starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        budget_ms = config.scan.time_budget_ms,
        insights = config.insights.enabled,
        "Configuration loaded from {}",
        config_path
    );

    if !config.api.enabled {
        tracing::warn!("API disabled in configuration, nothing to serve");
        return Ok(());
    }

    let analyzer = WalletAnalyzer::init(&config)?;

    let shutdown = CancellationToken::new();
    let mut server = {
        let shutdown = shutdown.clone();
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move { walletscope::api::serve(analyzer, &host, port, shutdown).await })
    };

    tracing::info!("Ready. Press Ctrl+C to stop.");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown signal received, draining requests...");
            shutdown.cancel();
            server
                .await
                .map_err(|e| eyre::eyre!("API server task failed: {}", e))??;
        }
        result = &mut server => {
            result.map_err(|e| eyre::eyre!("API server task failed: {}", e))??;
        }
    }

    tracing::info!("Walletscope stopped gracefully");
    Ok(())
}
