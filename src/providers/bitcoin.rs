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
struct RawAddress {
    #[serde(default)]
    n_tx: u64,
    #[serde(default)]
    total_received: u64,
    #[serde(default)]
    total_sent: u64,
    #[serde(default)]
    final_balance: u64,
    #[serde(default)]
    txs: Vec<RawTx>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    #[serde(default)]
    hash: String,
    time: Option<i64>,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    out: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    prev_out: Option<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    addr: Option<String>,
    #[serde(default)]
    value: u64,
}

/// blockchain.info explorer. The account endpoint returns lifetime totals plus
/// only the most recent page of transactions, so the totals are reported
/// separately from the itemized records.
pub struct BitcoinProvider {
    transport: Arc<dyn Transport>,
    api_base: String,
    tx_limit: u32,
}

impl BitcoinProvider {
    pub fn new(transport: Arc<dyn Transport>, config: &ProvidersConfig) -> Self {
        Self {
            transport,
            api_base: config.bitcoin_api_base.trim_end_matches('/').to_string(),
            tx_limit: config.bitcoin_tx_limit,
        }
    }
}

#[async_trait]
impl ChainProvider for BitcoinProvider {
    async fn fetch(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<RawActivity, ProviderFailure> {
        let request = HttpRequest::get(format!("{}/rawaddr/{}", self.api_base, address))
            .query("limit", self.tx_limit);
        let data: RawAddress = fetch_json(self.transport.as_ref(), request, deadline).await?;

        if data.n_tx == 0 {
            return Ok(RawActivity::empty());
        }

        let decimals = chain.native_decimals;
        let sats = |v: u64| raw_to_native(&BigDecimal::from(v), decimals);

        let records = data
            .txs
            .iter()
            .map(|tx| to_record(tx, address, decimals))
            .collect();

        Ok(RawActivity {
            records,
            reported_tx_count: Some(data.n_tx),
            reported_received: Some(sats(data.total_received)),
            reported_sent: Some(sats(data.total_sent)),
            native_balance: Some(sats(data.final_balance)),
            ..RawActivity::default()
        })
    }
}

fn to_record(tx: &RawTx, address: &str, decimals: u32) -> ActivityRecord {
    let received: u64 = tx
        .out
        .iter()
        .filter(|o| o.addr.as_deref() == Some(address))
        .map(|o| o.value)
        .sum();
    let spent: u64 = tx
        .inputs
        .iter()
        .filter_map(|i| i.prev_out.as_ref())
        .filter(|o| o.addr.as_deref() == Some(address))
        .map(|o| o.value)
        .sum();

    let (direction, net, counterparty) = if received > spent {
        let sender = tx
            .inputs
            .iter()
            .filter_map(|i| i.prev_out.as_ref())
            .find_map(|o| o.addr.clone().filter(|a| a != address));
        (Direction::Incoming, received - spent, sender)
    } else {
        let recipient = tx
            .out
            .iter()
            .find_map(|o| o.addr.clone().filter(|a| a != address));
        (Direction::Outgoing, spent - received, recipient)
    };

    ActivityRecord {
        tx_ref: tx.hash.clone(),
        direction,
        amount: raw_to_native(&BigDecimal::from(net), decimals),
        fee: None,
        timestamp: tx.time.and_then(timestamp_from_secs),
        counterparty,
    }
}
