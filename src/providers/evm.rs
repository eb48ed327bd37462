use alloy::primitives::U256;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;

use crate::chains::ChainDescriptor;
use crate::config::ProvidersConfig;

use super::transport::{fetch_json, HttpRequest, Transport};
use super::types::{parse_native, raw_to_native, timestamp_from_secs};
use super::{ActivityRecord, ChainProvider, Direction, ProviderFailure, RawActivity, TokenBalance};

/// Alchemy network slugs for the chains Alchemy serves.
const ALCHEMY_NETWORKS: &[(&str, &str)] = &[
    ("ethereum", "eth-mainnet"),
    ("polygon", "polygon-mainnet"),
    ("arbitrum", "arb-mainnet"),
    ("optimism", "opt-mainnet"),
    ("base", "base-mainnet"),
    ("avalanche", "avax-mainnet"),
];

/// Metadata lookups per chain are capped; wallets holding more tokens than
/// this are mostly airdrop spam past the first page.
const MAX_TOKEN_METADATA: usize = 30;

/// Etherscan-style response envelope. `result` is an array on success and a
/// plain string on errors ("Missing/Invalid API Key", "Max rate limit reached").
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTx {
    #[serde(default)]
    hash: String,
    #[serde(default)]
    time_stamp: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    gas_used: String,
    #[serde(default)]
    gas_price: String,
    #[serde(default)]
    contract_address: String,
    #[serde(default)]
    is_error: String,
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    #[serde(default)]
    id: Option<u64>,
    result: Option<T>,
    error: Option<Value>,
}

impl<T> RpcReply<T> {
    fn into_result(self) -> Result<T, ProviderFailure> {
        if let Some(error) = self.error {
            return Err(ProviderFailure::UpstreamError(format!("Alchemy error: {}", error)));
        }
        self.result
            .ok_or_else(|| ProviderFailure::UpstreamError("Alchemy reply without result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalancesResult {
    #[serde(default)]
    token_balances: Vec<HeldToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeldToken {
    contract_address: String,
    token_balance: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenMetadata {
    decimals: Option<u32>,
    symbol: Option<String>,
    name: Option<String>,
}

/// One provider for every EVM network, parameterized by the descriptor's
/// chain id against the Etherscan V2 unified endpoint.
pub struct EvmProvider {
    transport: Arc<dyn Transport>,
    api_base: String,
    api_key: Option<String>,
    routescan_base: String,
    routescan_key: Option<String>,
    alchemy_url_template: String,
    alchemy_key: Option<String>,
}

impl EvmProvider {
    pub fn new(transport: Arc<dyn Transport>, config: &ProvidersConfig) -> Self {
        Self {
            transport,
            api_base: config.etherscan_base.clone(),
            api_key: config.etherscan_api_key.clone(),
            routescan_base: config.routescan_base.clone(),
            routescan_key: config.routescan_api_key.clone(),
            alchemy_url_template: config.alchemy_url_template.clone(),
            alchemy_key: config.alchemy_api_key.clone(),
        }
    }

    /// Alchemy RPC endpoint for the chain, when a key is set and Alchemy
    /// serves that network.
    fn alchemy_url(&self, chain: &ChainDescriptor) -> Option<String> {
        let key = self.alchemy_key.as_ref()?;
        let (_, network) = ALCHEMY_NETWORKS.iter().find(|(id, _)| *id == chain.id)?;
        let base = self.alchemy_url_template.replace("{network}", network);
        Some(format!("{}/{}", base.trim_end_matches('/'), key))
    }

    fn request(&self, chain: &ChainDescriptor, action: &str, address: &str) -> HttpRequest {
        // Avalanche goes through Routescan when a dedicated key is configured
        let (base, key, with_chain_id) = match (&self.routescan_key, chain.id) {
            (Some(key), "avalanche") => (&self.routescan_base, Some(key), false),
            _ => (&self.api_base, self.api_key.as_ref(), true),
        };

        let mut req = HttpRequest::get(base.as_str())
            .query("module", "account")
            .query("action", action)
            .query("address", address);
        if with_chain_id {
            if let Some(network_id) = chain.network_id {
                req = req.query("chainid", network_id);
            }
        }
        if action != "balance" {
            req = req
                .query("startblock", 0)
                .query("endblock", 99_999_999)
                .query("sort", "desc");
        }
        if let Some(key) = key {
            req = req.query("apikey", key.as_str());
        }
        req
    }

    async fn call(
        &self,
        chain: &ChainDescriptor,
        action: &str,
        address: &str,
        deadline: Instant,
    ) -> Result<Value, ProviderFailure> {
        let envelope: Envelope = fetch_json(
            self.transport.as_ref(),
            self.request(chain, action, address),
            deadline,
        )
        .await?;
        check_envelope(envelope)
    }

    async fn native_transactions(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<Vec<ActivityRecord>, ProviderFailure> {
        let result = self.call(chain, "txlist", address, deadline).await?;
        let txs: Vec<ExplorerTx> = serde_json::from_value(result).map_err(|e| {
            ProviderFailure::UpstreamError(format!("Malformed txlist result: {}", e))
        })?;

        txs.into_iter()
            .map(|tx| to_record(tx, address, chain.native_decimals))
            .collect()
    }

    async fn token_transfer_count(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<u64, ProviderFailure> {
        let result = self.call(chain, "tokentx", address, deadline).await?;
        Ok(result.as_array().map(|a| a.len() as u64).unwrap_or(0))
    }

    async fn native_balance(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<BigDecimal, ProviderFailure> {
        if let Some(url) = self.alchemy_url(chain) {
            match self.alchemy_native_balance(&url, address, chain, deadline).await {
                Ok(balance) => return Ok(balance),
                Err(e) => {
                    tracing::debug!(chain = chain.id, error = %e, "Alchemy balance failed, asking the explorer");
                }
            }
        }

        let result = self.call(chain, "balance", address, deadline).await?;
        match result.as_str() {
            Some(wei) => parse_native(wei, chain.native_decimals),
            None => Err(ProviderFailure::UpstreamError(
                "Balance result is not a string".to_string(),
            )),
        }
    }

    async fn alchemy_native_balance(
        &self,
        url: &str,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<BigDecimal, ProviderFailure> {
        let request = HttpRequest::post_json(
            url,
            json!({"jsonrpc": "2.0", "id": 1, "method": "eth_getBalance", "params": [address, "latest"]}),
        );
        let reply: RpcReply<String> = fetch_json(self.transport.as_ref(), request, deadline).await?;
        let wei = parse_hex_u256(&reply.into_result()?)?;
        wei_to_native(wei, chain.native_decimals)
    }

    /// Non-zero ERC-20 balances through Alchemy: one balances call, then one
    /// batched metadata call. Tokens without a symbol are dropped as spam.
    async fn token_balances(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<Vec<TokenBalance>, ProviderFailure> {
        let Some(url) = self.alchemy_url(chain) else {
            return Ok(Vec::new());
        };

        let request = HttpRequest::post_json(
            url.as_str(),
            json!({"jsonrpc": "2.0", "id": 1, "method": "alchemy_getTokenBalances", "params": [address, "erc20"]}),
        );
        let reply: RpcReply<TokenBalancesResult> =
            fetch_json(self.transport.as_ref(), request, deadline).await?;

        let held: Vec<(String, U256)> = reply
            .into_result()?
            .token_balances
            .into_iter()
            .filter_map(|token| {
                let raw = parse_hex_u256(token.token_balance.as_deref()?).ok()?;
                (!raw.is_zero()).then_some((token.contract_address, raw))
            })
            .take(MAX_TOKEN_METADATA)
            .collect();
        if held.is_empty() {
            return Ok(Vec::new());
        }

        let batch: Vec<Value> = held
            .iter()
            .enumerate()
            .map(|(i, (contract, _))| {
                json!({"jsonrpc": "2.0", "id": i, "method": "alchemy_getTokenMetadata", "params": [contract]})
            })
            .collect();
        let replies: Value = fetch_json(
            self.transport.as_ref(),
            HttpRequest::post_json(url.as_str(), Value::Array(batch)),
            deadline,
        )
        .await?;
        let metadata = metadata_by_id(replies);

        let mut balances = Vec::new();
        for (i, (contract_address, raw)) in held.into_iter().enumerate() {
            let Some(meta) = metadata.get(&(i as u64)) else {
                continue;
            };
            let symbol = meta.symbol.as_deref().unwrap_or("").trim().to_string();
            if symbol.is_empty() {
                continue;
            }
            let decimals = meta.decimals.unwrap_or(18);
            let name = meta
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(symbol.as_str())
                .to_string();
            balances.push(TokenBalance {
                contract_address: contract_address.to_ascii_lowercase(),
                balance: wei_to_native(raw, decimals)?,
                symbol,
                name,
                decimals,
            });
        }
        Ok(balances)
    }
}

#[async_trait]
impl ChainProvider for EvmProvider {
    async fn fetch(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<RawActivity, ProviderFailure> {
        // Sequential per network: the explorer key is shared by all eight
        // networks and rate limits per second.
        let records = self.native_transactions(address, chain, deadline).await?;

        let token_transfer_count = match self.token_transfer_count(address, chain, deadline).await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(chain = chain.id, error = %e, "Token transfer lookup failed");
                0
            }
        };

        let native_balance = match self.native_balance(address, chain, deadline).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                tracing::debug!(chain = chain.id, error = %e, "Native balance lookup failed");
                None
            }
        };

        let token_balances = match self.token_balances(address, chain, deadline).await {
            Ok(balances) => balances,
            Err(e) => {
                tracing::warn!(chain = chain.id, error = %e, "Token holdings lookup failed");
                Vec::new()
            }
        };

        Ok(RawActivity {
            records,
            native_balance,
            token_transfer_count,
            token_balances,
            ..RawActivity::default()
        })
    }
}

fn check_envelope(envelope: Envelope) -> Result<Value, ProviderFailure> {
    if envelope.status == "1" {
        return Ok(envelope.result);
    }

    let detail = match envelope.result.as_str() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => envelope.message.clone(),
    };

    if envelope.message.starts_with("No transactions found")
        || envelope.result.as_array().is_some_and(|a| a.is_empty())
    {
        return Ok(Value::Array(Vec::new()));
    }
    if detail.to_ascii_lowercase().contains("rate limit") {
        return Err(ProviderFailure::RateLimited(detail));
    }
    Err(ProviderFailure::UpstreamError(detail))
}

fn parse_u256(field: &str, raw: &str) -> Result<U256, ProviderFailure> {
    if raw.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(raw, 10)
        .map_err(|e| ProviderFailure::UpstreamError(format!("Invalid {} '{}': {}", field, raw, e)))
}

fn parse_hex_u256(raw: &str) -> Result<U256, ProviderFailure> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ProviderFailure::UpstreamError(format!("Invalid hex quantity '{}': {}", raw, e)))
}

/// Index a JSON-RPC batch reply by request id. A non-array reply (the
/// endpoint rejected the whole batch) yields no metadata.
fn metadata_by_id(replies: Value) -> HashMap<u64, TokenMetadata> {
    let Value::Array(items) = replies else {
        return HashMap::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RpcReply<TokenMetadata>>(item).ok())
        .filter_map(|reply| Some((reply.id?, reply.result.unwrap_or_default())))
        .collect()
}

fn wei_to_native(wei: U256, decimals: u32) -> Result<BigDecimal, ProviderFailure> {
    let raw = BigDecimal::from_str(&wei.to_string())
        .map_err(|e| ProviderFailure::UpstreamError(e.to_string()))?;
    Ok(raw_to_native(&raw, decimals))
}

fn to_record(tx: ExplorerTx, address: &str, decimals: u32) -> Result<ActivityRecord, ProviderFailure> {
    let outgoing = tx.from.eq_ignore_ascii_case(address);
    let direction = if outgoing {
        Direction::Outgoing
    } else {
        Direction::Incoming
    };

    // Reverted transactions move no value but still burn gas
    let value = if tx.is_error == "1" {
        U256::ZERO
    } else {
        parse_u256("value", &tx.value)?
    };

    let fee = if outgoing {
        let gas_used = parse_u256("gasUsed", &tx.gas_used)?;
        let gas_price = parse_u256("gasPrice", &tx.gas_price)?;
        Some(wei_to_native(gas_used.saturating_mul(gas_price), decimals)?)
    } else {
        None
    };

    let counterparty = if outgoing {
        if tx.to.is_empty() {
            // contract creation
            tx.contract_address
        } else {
            tx.to
        }
    } else {
        tx.from
    };

    Ok(ActivityRecord {
        tx_ref: tx.hash,
        direction,
        amount: wei_to_native(value, decimals)?,
        fee,
        timestamp: tx.time_stamp.parse::<i64>().ok().and_then(timestamp_from_secs),
        counterparty: Some(counterparty.to_ascii_lowercase()).filter(|c| !c.is_empty()),
    })
}
