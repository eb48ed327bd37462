use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    #[serde(default)]
    pub insights: InsightsConfig,
}

fn default_true() -> bool {
    true
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
            host: default_api_host(),
        }
    }
}

fn default_api_port() -> u16 {
    8000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

// ============================================================
// Scan Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Wall-clock budget for one analysis when the caller does not pass one.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    /// Upper bound a caller-supplied budget is clamped to.
    #[serde(default = "default_max_time_budget_ms")]
    pub max_time_budget_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: default_time_budget_ms(),
            max_time_budget_ms: default_max_time_budget_ms(),
        }
    }
}

fn default_time_budget_ms() -> u64 {
    45_000
}

fn default_max_time_budget_ms() -> u64 {
    120_000
}

// ============================================================
// Providers Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_etherscan_base")]
    pub etherscan_base: String,
    #[serde(default = "default_routescan_base")]
    pub routescan_base: String,
    #[serde(default = "default_solana_rpc_url")]
    pub solana_rpc_url: String,
    #[serde(default = "default_bitcoin_api_base")]
    pub bitcoin_api_base: String,
    #[serde(default = "default_tron_api_base")]
    pub tron_api_base: String,
    #[serde(default = "default_bitcoin_tx_limit")]
    pub bitcoin_tx_limit: u32,
    #[serde(default = "default_tron_tx_limit")]
    pub tron_tx_limit: u32,
    #[serde(default = "default_solana_signature_limit")]
    pub solana_signature_limit: u32,
    /// Alchemy RPC base with a `{network}` placeholder; the key is appended.
    #[serde(default = "default_alchemy_url_template")]
    pub alchemy_url_template: String,

    // Credentials are never read from the config file.
    #[serde(skip)]
    pub etherscan_api_key: Option<String>,
    #[serde(skip)]
    pub routescan_api_key: Option<String>,
    #[serde(skip)]
    pub tron_api_key: Option<String>,
    #[serde(skip)]
    pub alchemy_api_key: Option<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            etherscan_base: default_etherscan_base(),
            routescan_base: default_routescan_base(),
            solana_rpc_url: default_solana_rpc_url(),
            bitcoin_api_base: default_bitcoin_api_base(),
            tron_api_base: default_tron_api_base(),
            bitcoin_tx_limit: default_bitcoin_tx_limit(),
            tron_tx_limit: default_tron_tx_limit(),
            solana_signature_limit: default_solana_signature_limit(),
            alchemy_url_template: default_alchemy_url_template(),
            etherscan_api_key: None,
            routescan_api_key: None,
            tron_api_key: None,
            alchemy_api_key: None,
        }
    }
}

fn default_etherscan_base() -> String {
    "https://api.etherscan.io/v2/api".to_string()
}

fn default_routescan_base() -> String {
    "https://api.routescan.io/v2/network/mainnet/evm/43114/etherscan/api".to_string()
}

fn default_solana_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_bitcoin_api_base() -> String {
    "https://blockchain.info".to_string()
}

fn default_tron_api_base() -> String {
    "https://api.trongrid.io".to_string()
}

fn default_alchemy_url_template() -> String {
    "https://{network}.g.alchemy.com/v2".to_string()
}

fn default_bitcoin_tx_limit() -> u32 {
    50
}

fn default_tron_tx_limit() -> u32 {
    200
}

fn default_solana_signature_limit() -> u32 {
    1000
}

// ============================================================
// Prices Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct PricesConfig {
    #[serde(default = "default_coingecko_base")]
    pub coingecko_base: String,
    #[serde(default = "default_price_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Used only when CoinGecko cannot be reached at all.
    #[serde(default = "default_fallback_prices")]
    pub fallback: HashMap<String, f64>,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            coingecko_base: default_coingecko_base(),
            request_timeout_ms: default_price_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            fallback: default_fallback_prices(),
        }
    }
}

fn default_coingecko_base() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_price_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_fallback_prices() -> HashMap<String, f64> {
    [
        ("ETH", 2500.0),
        ("POL", 0.35),
        ("BNB", 650.0),
        ("AVAX", 25.0),
        ("FTM", 0.5),
        ("SOL", 170.0),
        ("BTC", 95000.0),
        ("TRX", 0.13),
    ]
    .into_iter()
    .map(|(symbol, price)| (symbol.to_string(), price))
    .collect()
}

// ============================================================
// Insights Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct InsightsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_insight_provider")]
    pub provider: String,
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_insight_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_anthropic_base")]
    pub anthropic_base: String,
    #[serde(default = "default_openai_base")]
    pub openai_base: String,
    #[serde(default = "default_gemini_base")]
    pub gemini_base: String,

    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_insight_provider(),
            model: None,
            max_tokens: default_max_tokens(),
            request_timeout_ms: default_insight_timeout_ms(),
            anthropic_base: default_anthropic_base(),
            openai_base: default_openai_base(),
            gemini_base: default_gemini_base(),
            anthropic_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}

pub const INSIGHT_PROVIDERS: &[&str] = &["anthropic", "openai", "gemini"];

impl InsightsConfig {
    /// Configured model, or the default for the selected provider.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => model.as_str(),
            (None, "openai") => "gpt-4o",
            (None, "gemini") => "gemini-2.0-flash",
            (None, _) => "claude-sonnet-4-6",
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.as_deref(),
            "gemini" => self.gemini_api_key.as_deref(),
            _ => self.anthropic_api_key.as_deref(),
        }
    }
}

fn default_insight_provider() -> String {
    "anthropic".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_insight_timeout_ms() -> u64 {
    60_000
}

fn default_anthropic_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults; a file that
    /// exists but does not parse is an error.
    pub fn load(path: &str) -> eyre::Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
            toml::from_str::<Config>(&content)
                .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?
        } else {
            tracing::info!(path = %path, "Config file not found, using defaults");
            Config::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Pull credentials and the `HOST`/`PORT` overrides from the environment.
    pub fn apply_env(&mut self) -> eyre::Result<()> {
        self.providers.etherscan_api_key = env_secret("ETHERSCAN_API_KEY");
        self.providers.routescan_api_key = env_secret("ROUTESCAN_API_KEY");
        self.providers.tron_api_key = env_secret("TRONGRID_API_KEY");
        self.providers.alchemy_api_key = env_secret("ALCHEMY_API_KEY");
        self.insights.anthropic_api_key = env_secret("ANTHROPIC_API_KEY");
        self.insights.openai_api_key = env_secret("OPENAI_API_KEY");
        self.insights.gemini_api_key = env_secret("GEMINI_API_KEY");

        if let Some(host) = env_secret("HOST") {
            self.api.host = host;
        }
        if let Some(port) = env_secret("PORT") {
            self.api.port = port
                .parse()
                .map_err(|e| eyre::eyre!("Invalid PORT '{}': {}", port, e))?;
        }
        Ok(())
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.api.port == 0 {
            return Err(eyre::eyre!("API port must be non-zero"));
        }
        if self.scan.time_budget_ms == 0 {
            return Err(eyre::eyre!("Scan time budget must be non-zero"));
        }
        if self.scan.time_budget_ms > self.scan.max_time_budget_ms {
            return Err(eyre::eyre!(
                "Scan time budget {}ms exceeds maximum {}ms",
                self.scan.time_budget_ms,
                self.scan.max_time_budget_ms
            ));
        }
        if !INSIGHT_PROVIDERS.contains(&self.insights.provider.as_str()) {
            return Err(eyre::eyre!(
                "Unknown insight provider '{}' (expected one of: {})",
                self.insights.provider,
                INSIGHT_PROVIDERS.join(", ")
            ));
        }
        Ok(())
    }
}
