use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::address::AddressFamily;

/// Normalized totals for one chain that had activity.
///
/// Native amounts are exact decimals. USD conversions are `None` when the
/// native asset had no price, which is distinct from a zero value.
#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub chain: String,
    pub chain_name: String,
    pub native_symbol: String,
    pub total_received: BigDecimal,
    pub total_sent: BigDecimal,
    pub total_fees: BigDecimal,
    pub native_balance: Option<BigDecimal>,
    pub price_usd: Option<f64>,
    pub total_received_usd: Option<f64>,
    pub total_sent_usd: Option<f64>,
    pub total_fees_usd: Option<f64>,
    pub balance_usd: Option<f64>,
    pub tx_count: u64,
    /// Direction split of `tx_count`. `None` when the provider only itemized
    /// part of the history or did not report directions.
    pub incoming_tx_count: Option<u64>,
    pub outgoing_tx_count: Option<u64>,
    pub token_transfer_count: u64,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub unique_counterparties: usize,
    pub token_holdings: Vec<TokenHolding>,
}

impl ChainSummary {
    /// Received plus sent in USD, or `None` when the chain had no price.
    pub fn volume_usd(&self) -> Option<f64> {
        match (self.total_received_usd, self.total_sent_usd) {
            (Some(received), Some(sent)) => Some(received + sent),
            _ => None,
        }
    }

    /// Native balance plus priced token holdings, or `None` when nothing on
    /// the chain could be valued.
    pub fn current_balance_usd(&self) -> Option<f64> {
        let priced: Vec<f64> = self
            .balance_usd
            .into_iter()
            .chain(self.token_holdings.iter().filter_map(|t| t.balance_usd))
            .collect();
        if priced.is_empty() {
            None
        } else {
            Some(priced.iter().sum())
        }
    }
}

/// ERC-20 position. Only stablecoins and wrapped native assets get a USD
/// value; other tokens carry `balance_usd: None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenHolding {
    pub chain: String,
    pub symbol: String,
    pub name: String,
    pub contract_address: String,
    pub decimals: u32,
    pub balance: BigDecimal,
    pub balance_usd: Option<f64>,
}

/// One line of the activity ranking, in `chain_summaries` order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainRanking {
    pub chain: String,
    pub chain_name: String,
    pub transactions: u64,
    pub volume_usd: Option<f64>,
    pub current_balance_usd: Option<f64>,
}

/// A chain in the working set that could not be scanned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedChain {
    pub chain: String,
    pub kind: String,
    pub message: String,
}

/// Cross-chain report for one address.
///
/// Everything except the narrative is fixed at aggregation time.
#[derive(Debug, Clone, Serialize)]
pub struct WalletReport {
    pub address: String,
    pub address_type: AddressFamily,
    pub chains_analyzed: Vec<String>,
    pub chains_with_activity: Vec<String>,
    pub chain_summaries: Vec<ChainSummary>,
    pub total_tx_count: u64,
    pub total_received_usd: f64,
    pub total_sent_usd: f64,
    pub total_fees_usd: f64,
    pub net_flow_usd: f64,
    pub total_current_balance_usd: f64,
    /// Token holdings across all chains, most valuable first.
    pub all_token_holdings: Vec<TokenHolding>,
    pub top_chains_by_transactions: Vec<ChainRanking>,
    pub first_activity: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub wallet_age_days: Option<i64>,
    pub failed_chains: Vec<FailedChain>,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub(crate) insights: Option<String>,
}

impl WalletReport {
    pub fn insights(&self) -> Option<&str> {
        self.insights.as_deref()
    }

    /// Set the narrative. Only the first call has an effect; returns whether
    /// this call set it.
    pub fn attach_narrative(&mut self, text: impl Into<String>) -> bool {
        if self.insights.is_some() {
            return false;
        }
        self.insights = Some(text.into());
        true
    }

    pub fn has_activity(&self) -> bool {
        !self.chain_summaries.is_empty()
    }
}
