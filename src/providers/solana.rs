use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;

use crate::chains::ChainDescriptor;
use crate::config::ProvidersConfig;

use super::transport::{fetch_json, HttpRequest, Transport};
use super::types::{raw_to_native, timestamp_from_secs};
use super::{ActivityRecord, ChainProvider, Direction, ProviderFailure, RawActivity};

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    value: u64,
}

/// Solana JSON-RPC provider. Signatures only tell us that the address took
/// part in a transaction, so records carry no direction or amount.
pub struct SolanaProvider {
    transport: Arc<dyn Transport>,
    rpc_url: String,
    signature_limit: u32,
}

impl SolanaProvider {
    pub fn new(transport: Arc<dyn Transport>, config: &ProvidersConfig) -> Self {
        Self {
            transport,
            rpc_url: config.solana_rpc_url.clone(),
            signature_limit: config.solana_signature_limit,
        }
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        deadline: Instant,
    ) -> Result<T, ProviderFailure> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: RpcResponse<T> = fetch_json(
            self.transport.as_ref(),
            HttpRequest::post_json(self.rpc_url.as_str(), body),
            deadline,
        )
        .await?;

        if let Some(err) = response.error {
            let detail = format!("{} failed ({}): {}", method, err.code, err.message);
            return Err(if err.code == 429 || err.code == -32429 {
                ProviderFailure::RateLimited(detail)
            } else {
                ProviderFailure::UpstreamError(detail)
            });
        }
        response
            .result
            .ok_or_else(|| ProviderFailure::UpstreamError(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChainProvider for SolanaProvider {
    async fn fetch(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<RawActivity, ProviderFailure> {
        let signatures: Vec<SignatureInfo> = self
            .rpc(
                "getSignaturesForAddress",
                json!([address, {"limit": self.signature_limit}]),
                deadline,
            )
            .await?;

        let native_balance = match self
            .rpc::<BalanceResult>("getBalance", json!([address]), deadline)
            .await
        {
            Ok(balance) => Some(raw_to_native(
                &BigDecimal::from(balance.value),
                chain.native_decimals,
            )),
            Err(e) => {
                tracing::debug!(chain = chain.id, error = %e, "Balance lookup failed");
                None
            }
        };

        let records = signatures
            .into_iter()
            .map(|sig| ActivityRecord {
                tx_ref: sig.signature,
                direction: Direction::Unknown,
                amount: BigDecimal::from(0),
                fee: None,
                timestamp: sig.block_time.and_then(timestamp_from_secs),
                counterparty: None,
            })
            .collect();

        Ok(RawActivity {
            records,
            native_balance,
            ..RawActivity::default()
        })
    }
}
