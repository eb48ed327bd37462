use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::address::AddressFamily;
use crate::chains::ChainDescriptor;
use crate::prices::PriceQuote;
use crate::providers::{ChainOutcome, Direction, ProviderFailure, RawActivity, TokenBalance};

use super::types::{ChainRanking, ChainSummary, FailedChain, TokenHolding, WalletReport};

/// Tokens valued at one dollar, bridged variants included.
const STABLECOINS: &[&str] = &[
    "USDC", "USDT", "DAI", "BUSD", "TUSD", "FRAX", "LUSD", "USDP", "USDC.e", "USDT.e", "USDbC",
    "USDe",
];

/// Wrapped native tokens and the native symbol whose price they track.
const WRAPPED_NATIVE: &[(&str, &str)] = &[
    ("WETH", "ETH"),
    ("WBNB", "BNB"),
    ("WMATIC", "POL"),
    ("WPOL", "POL"),
    ("WAVAX", "AVAX"),
    ("WFTM", "FTM"),
];

/// Merge per-chain outcomes into one report. Never fails: a scan where every
/// chain failed still yields a report, with no summaries and zero totals.
pub fn aggregate(
    address: &str,
    family: AddressFamily,
    chains_analyzed: &[&'static ChainDescriptor],
    outcomes: &BTreeMap<String, ChainOutcome>,
    prices: &PriceQuote,
    now: DateTime<Utc>,
) -> WalletReport {
    let mut summaries = Vec::new();
    let mut failed_chains = Vec::new();
    let mut warnings = Vec::new();

    for chain in chains_analyzed {
        match outcomes.get(chain.id) {
            Some(Ok(activity)) => {
                let price = prices.price(chain.native_symbol).ok();
                let summary = summarize(chain, activity, price, prices);
                if summary.tx_count == 0 && summary.token_transfer_count == 0 {
                    continue;
                }
                if price.is_none() {
                    warnings.push(format!(
                        "Price unavailable for {}; USD values for {} are excluded from totals",
                        chain.native_symbol, chain.name
                    ));
                }
                summaries.push(summary);
            }
            Some(Err(failure)) => failed_chains.push(FailedChain {
                chain: chain.id.to_string(),
                kind: failure.kind().to_string(),
                message: failure.to_string(),
            }),
            None => failed_chains.push(FailedChain {
                chain: chain.id.to_string(),
                kind: ProviderFailure::Timeout.kind().to_string(),
                message: ProviderFailure::Timeout.to_string(),
            }),
        }
    }

    if evm_key_rejected(chains_analyzed, outcomes) {
        warnings.push(
            "Etherscan API key is missing or invalid; EVM chains could not be scanned. \
             Set ETHERSCAN_API_KEY."
                .to_string(),
        );
    }

    summaries.sort_by(compare_summaries);

    let sum = |f: fn(&ChainSummary) -> Option<f64>| -> f64 { summaries.iter().filter_map(f).sum() };
    let total_received_usd = sum(|s| s.total_received_usd);
    let total_sent_usd = sum(|s| s.total_sent_usd);
    let total_fees_usd = sum(|s| s.total_fees_usd);
    let total_current_balance_usd = sum(|s| s.current_balance_usd());

    let mut all_token_holdings: Vec<TokenHolding> = summaries
        .iter()
        .flat_map(|s| s.token_holdings.iter().cloned())
        .collect();
    all_token_holdings.sort_by(compare_holdings);

    let top_chains_by_transactions = summaries
        .iter()
        .map(|s| ChainRanking {
            chain: s.chain.clone(),
            chain_name: s.chain_name.clone(),
            transactions: s.tx_count,
            volume_usd: s.volume_usd(),
            current_balance_usd: s.current_balance_usd(),
        })
        .collect();

    let first_activity = summaries.iter().filter_map(|s| s.first_activity).min();
    let last_activity = summaries.iter().filter_map(|s| s.last_activity).max();
    let wallet_age_days = first_activity.map(|first| (now - first).num_days().max(0));

    WalletReport {
        address: address.to_string(),
        address_type: family,
        chains_analyzed: chains_analyzed.iter().map(|c| c.id.to_string()).collect(),
        chains_with_activity: summaries.iter().map(|s| s.chain.clone()).collect(),
        total_tx_count: summaries.iter().map(|s| s.tx_count).sum(),
        total_received_usd,
        total_sent_usd,
        total_fees_usd,
        net_flow_usd: total_received_usd - total_sent_usd,
        total_current_balance_usd,
        all_token_holdings,
        top_chains_by_transactions,
        first_activity,
        last_activity,
        wallet_age_days,
        chain_summaries: summaries,
        failed_chains,
        warnings,
        generated_at: now,
        insights: None,
    }
}

fn summarize(
    chain: &ChainDescriptor,
    activity: &RawActivity,
    price: Option<f64>,
    prices: &PriceQuote,
) -> ChainSummary {
    let mut received_from_records = BigDecimal::zero();
    let mut sent_from_records = BigDecimal::zero();
    let mut fees = BigDecimal::zero();
    let mut incoming = 0u64;
    let mut outgoing = 0u64;
    let mut counterparties = HashSet::new();

    for record in &activity.records {
        match record.direction {
            Direction::Incoming => {
                incoming += 1;
                received_from_records += &record.amount;
            }
            Direction::Outgoing => {
                outgoing += 1;
                sent_from_records += &record.amount;
            }
            Direction::Unknown => {}
        }
        if chain.family.has_gas() {
            if let Some(fee) = &record.fee {
                fees += fee;
            }
        }
        if let Some(counterparty) = &record.counterparty {
            counterparties.insert(counterparty.to_lowercase());
        }
    }

    let total_received = activity
        .reported_received
        .clone()
        .unwrap_or(received_from_records);
    let total_sent = activity.reported_sent.clone().unwrap_or(sent_from_records);
    let tx_count = activity
        .reported_tx_count
        .unwrap_or(activity.records.len() as u64);

    // Direction counts only describe the whole history when every
    // transaction was itemized with a known direction.
    let itemized = activity
        .reported_tx_count
        .map_or(true, |n| n <= activity.records.len() as u64)
        && activity
            .records
            .iter()
            .all(|r| r.direction != Direction::Unknown);

    let mut token_holdings: Vec<TokenHolding> = activity
        .token_balances
        .iter()
        .map(|token| holding(chain, token, prices))
        .collect();
    token_holdings.sort_by(compare_holdings);

    let timestamps = activity.records.iter().filter_map(|r| r.timestamp);
    let first_activity = timestamps.clone().min();
    let last_activity = timestamps.max();

    ChainSummary {
        chain: chain.id.to_string(),
        chain_name: chain.name.to_string(),
        native_symbol: chain.native_symbol.to_string(),
        total_received_usd: to_usd(&total_received, price),
        total_sent_usd: to_usd(&total_sent, price),
        total_fees_usd: to_usd(&fees, price),
        balance_usd: activity
            .native_balance
            .as_ref()
            .and_then(|b| to_usd(b, price)),
        price_usd: price,
        total_received,
        total_sent,
        total_fees: fees,
        native_balance: activity.native_balance.clone(),
        tx_count,
        incoming_tx_count: itemized.then_some(incoming),
        outgoing_tx_count: itemized.then_some(outgoing),
        token_transfer_count: activity.token_transfer_count,
        first_activity,
        last_activity,
        unique_counterparties: counterparties.len(),
        token_holdings,
    }
}

fn holding(chain: &ChainDescriptor, token: &TokenBalance, prices: &PriceQuote) -> TokenHolding {
    TokenHolding {
        chain: chain.id.to_string(),
        symbol: token.symbol.clone(),
        name: token.name.clone(),
        contract_address: token.contract_address.clone(),
        decimals: token.decimals,
        balance_usd: to_usd(&token.balance, token_price(&token.symbol, prices)),
        balance: token.balance.clone(),
    }
}

fn token_price(symbol: &str, prices: &PriceQuote) -> Option<f64> {
    if STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(symbol)) {
        return Some(1.0);
    }
    let (_, native) = WRAPPED_NATIVE
        .iter()
        .find(|(wrapped, _)| wrapped.eq_ignore_ascii_case(symbol))?;
    prices.price(native).ok()
}

/// Highest USD value first, unpriced holdings last by symbol.
fn compare_holdings(a: &TokenHolding, b: &TokenHolding) -> Ordering {
    let value = |t: &TokenHolding| t.balance_usd.unwrap_or(f64::NEG_INFINITY);
    value(b)
        .total_cmp(&value(a))
        .then_with(|| a.symbol.cmp(&b.symbol))
}

fn to_usd(amount: &BigDecimal, price: Option<f64>) -> Option<f64> {
    let price = price?;
    amount.to_f64().map(|a| a * price)
}

/// Most transactions first, then largest USD volume (unpriced chains last),
/// then chain id so that equal chains have a stable order.
fn compare_summaries(a: &ChainSummary, b: &ChainSummary) -> Ordering {
    let volume = |s: &ChainSummary| s.volume_usd().unwrap_or(f64::NEG_INFINITY);
    b.tx_count
        .cmp(&a.tx_count)
        .then_with(|| volume(b).total_cmp(&volume(a)))
        .then_with(|| a.chain.cmp(&b.chain))
}

/// True when every EVM chain in the working set failed because the explorer
/// rejected the API key.
fn evm_key_rejected(
    chains: &[&'static ChainDescriptor],
    outcomes: &BTreeMap<String, ChainOutcome>,
) -> bool {
    let mut evm = chains
        .iter()
        .filter(|c| c.family == AddressFamily::Evm)
        .peekable();
    if evm.peek().is_none() {
        return false;
    }
    evm.all(|chain| match outcomes.get(chain.id) {
        Some(Err(ProviderFailure::UpstreamError(msg))) => {
            msg.to_lowercase().contains("api key")
        }
        _ => false,
    })
}
