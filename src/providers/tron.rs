use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::chains::ChainDescriptor;
use crate::config::ProvidersConfig;

use super::transport::{fetch_json, HttpRequest, Transport};
use super::types::{raw_to_native, timestamp_from_secs};
use super::{ActivityRecord, ChainProvider, Direction, ProviderFailure, RawActivity};

#[derive(Debug, Deserialize)]
struct AccountTransactions {
    #[serde(default = "default_success")]
    success: bool,
    error: Option<String>,
    #[serde(default)]
    data: Vec<TronTx>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TronTx {
    #[serde(rename = "txID", default)]
    tx_id: String,
    block_timestamp: Option<i64>,
    #[serde(default)]
    raw_data: RawData,
}

#[derive(Debug, Default, Deserialize)]
struct RawData {
    #[serde(default)]
    contract: Vec<Contract>,
}

#[derive(Debug, Deserialize)]
struct Contract {
    parameter: Option<Parameter>,
}

#[derive(Debug, Deserialize)]
struct Parameter {
    value: Option<ContractValue>,
}

#[derive(Debug, Deserialize)]
struct ContractValue {
    #[serde(default)]
    amount: u64,
    owner_address: Option<String>,
    to_address: Option<String>,
    contract_address: Option<String>,
}

/// TronGrid account transaction history.
pub struct TronProvider {
    transport: Arc<dyn Transport>,
    api_base: String,
    api_key: Option<String>,
    tx_limit: u32,
}

impl TronProvider {
    pub fn new(transport: Arc<dyn Transport>, config: &ProvidersConfig) -> Self {
        Self {
            transport,
            api_base: config.tron_api_base.trim_end_matches('/').to_string(),
            api_key: config.tron_api_key.clone(),
            tx_limit: config.tron_tx_limit,
        }
    }
}

#[async_trait]
impl ChainProvider for TronProvider {
    async fn fetch(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<RawActivity, ProviderFailure> {
        // visible=true returns Base58 addresses instead of 41-prefixed hex
        let mut request =
            HttpRequest::get(format!("{}/v1/accounts/{}/transactions", self.api_base, address))
                .query("limit", self.tx_limit)
                .query("visible", "true");
        if let Some(key) = &self.api_key {
            request = request.header("TRON-PRO-API-KEY", key.as_str());
        }

        let response: AccountTransactions =
            fetch_json(self.transport.as_ref(), request, deadline).await?;
        if !response.success {
            return Err(ProviderFailure::UpstreamError(
                response
                    .error
                    .unwrap_or_else(|| "TronGrid reported failure".to_string()),
            ));
        }

        let records = response
            .data
            .into_iter()
            .map(|tx| to_record(tx, address, chain.native_decimals))
            .collect();

        Ok(RawActivity {
            records,
            ..RawActivity::default()
        })
    }
}

fn to_record(tx: TronTx, address: &str, decimals: u32) -> ActivityRecord {
    let value = tx
        .raw_data
        .contract
        .into_iter()
        .next()
        .and_then(|c| c.parameter)
        .and_then(|p| p.value);

    let (direction, amount, counterparty) = match value {
        Some(v) => {
            let owner = v.owner_address.unwrap_or_default();
            let to = v.to_address.or(v.contract_address).unwrap_or_default();
            if owner == address {
                (Direction::Outgoing, v.amount, Some(to))
            } else if to == address {
                (Direction::Incoming, v.amount, Some(owner))
            } else {
                (Direction::Unknown, v.amount, None)
            }
        }
        None => (Direction::Unknown, 0, None),
    };

    ActivityRecord {
        tx_ref: tx.tx_id,
        direction,
        amount: raw_to_native(&BigDecimal::from(amount), decimals),
        fee: None,
        timestamp: tx
            .block_timestamp
            .and_then(|ms| timestamp_from_secs(ms / 1000)),
        counterparty: counterparty.filter(|c| !c.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::descriptor;
    use crate::providers::transport::testing::FakeTransport;
    use serde_json::json;
    use std::time::Duration;

    const ADDR: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const OTHER: &str = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8";

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn transfer(id: &str, from: &str, to: &str, amount: u64) -> serde_json::Value {
        json!({
            "txID": id,
            "blockNumber": 1,
            "block_timestamp": 1700000000000i64,
            "raw_data": {"contract": [{
                "type": "TransferContract",
                "parameter": {"value": {"amount": amount, "owner_address": from, "to_address": to}}
            }]}
        })
    }

    #[tokio::test]
    async fn classifies_transfer_direction() {
        let fake = Arc::new(FakeTransport::new().route(
            "/v1/accounts/",
            FakeTransport::json(
                200,
                json!({"success": true, "data": [
                    transfer("t1", OTHER, ADDR, 5_000_000),
                    transfer("t2", ADDR, OTHER, 1_500_000),
                ]}),
            ),
        ));
        let config = ProvidersConfig {
            tron_api_key: Some("k".to_string()),
            ..ProvidersConfig::default()
        };
        let provider = TronProvider::new(fake.clone(), &config);

        let activity = provider
            .fetch(ADDR, descriptor("tron").unwrap(), deadline())
            .await
            .unwrap();

        assert_eq!(activity.records.len(), 2);
        assert_eq!(activity.records[0].direction, Direction::Incoming);
        assert_eq!(activity.records[0].amount, BigDecimal::from(5));
        assert_eq!(activity.records[1].direction, Direction::Outgoing);
        assert_eq!(activity.records[1].counterparty.as_deref(), Some(OTHER));
        assert!(activity.records[0].timestamp.is_some());

        let calls = fake.calls.lock().unwrap();
        assert!(calls[0]
            .headers
            .iter()
            .any(|(k, v)| k == "TRON-PRO-API-KEY" && v == "k"));
        assert_eq!(calls[0].query_value("visible"), Some("true"));
    }

    #[tokio::test]
    async fn unsuccessful_response_is_upstream_error() {
        let fake = FakeTransport::new().route(
            "/v1/accounts/",
            FakeTransport::json(200, json!({"success": false, "error": "bad address"})),
        );
        let provider = TronProvider::new(Arc::new(fake), &ProvidersConfig::default());
        let err = provider
            .fetch(ADDR, descriptor("tron").unwrap(), deadline())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderFailure::UpstreamError("bad address".to_string()));
    }
}
