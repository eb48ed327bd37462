use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Direction of value movement relative to the scanned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
    /// The provider lists the transaction but not which way value moved.
    Unknown,
}

/// One transaction-like entry as reported by a provider, in native units.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub tx_ref: String,
    pub direction: Direction,
    pub amount: BigDecimal,
    /// Fee paid by the scanned address, when the chain has a gas concept.
    pub fee: Option<BigDecimal>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Other side of the transfer, or the contract that was called.
    pub counterparty: Option<String>,
}

/// ERC-20 balance held by the scanned address at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub contract_address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub balance: BigDecimal,
}

/// Unprocessed per-chain data for one address.
///
/// `reported_*` fields carry provider-side aggregates, which can cover more
/// history than the itemized `records` (e.g. explorers that cap the page size).
#[derive(Debug, Clone, Default)]
pub struct RawActivity {
    pub records: Vec<ActivityRecord>,
    pub reported_tx_count: Option<u64>,
    pub reported_received: Option<BigDecimal>,
    pub reported_sent: Option<BigDecimal>,
    pub native_balance: Option<BigDecimal>,
    pub token_transfer_count: u64,
    pub token_balances: Vec<TokenBalance>,
}

impl RawActivity {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Why a single chain could not be scanned. Scoped to that chain only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderFailure {
    #[error("no activity found")]
    NotFound,
    #[error("upstream error: {0}")]
    UpstreamError(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("timed out before the scan deadline")]
    Timeout,
}

impl ProviderFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::UpstreamError(_) => "upstream_error",
            Self::RateLimited(_) => "rate_limited",
            Self::Timeout => "timeout",
        }
    }
}

/// Per-chain scan result.
pub type ChainOutcome = Result<RawActivity, ProviderFailure>;

/// Convert an integer amount in the chain's smallest unit (wei, lamports,
/// satoshi, sun) into native units.
pub fn raw_to_native(raw: &BigDecimal, decimals: u32) -> BigDecimal {
    raw * BigDecimal::new(BigInt::from(1), i64::from(decimals))
}

/// Parse a decimal integer string in smallest units and scale it.
pub fn parse_native(raw: &str, decimals: u32) -> Result<BigDecimal, ProviderFailure> {
    let value = BigDecimal::from_str(raw.trim()).map_err(|e| {
        ProviderFailure::UpstreamError(format!("Invalid amount '{}': {}", raw, e))
    })?;
    Ok(raw_to_native(&value, decimals))
}

/// Unix seconds to UTC, ignoring zero and out-of-range values.
pub fn timestamp_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_smallest_units() {
        let one_eth = parse_native("1000000000000000000", 18).unwrap();
        assert_eq!(one_eth, BigDecimal::from(1));

        let sats = parse_native("10711067091", 8).unwrap();
        assert_eq!(sats, BigDecimal::from_str("107.11067091").unwrap());

        // wider than any u64 power of ten
        let tiny = parse_native("5", 24).unwrap();
        assert_eq!(tiny, BigDecimal::from_str("0.000000000000000000000005").unwrap());
    }

    #[test]
    fn rejects_non_numeric_amounts() {
        assert!(matches!(
            parse_native("abc", 18),
            Err(ProviderFailure::UpstreamError(_))
        ));
    }

    #[test]
    fn zero_timestamp_is_none() {
        assert!(timestamp_from_secs(0).is_none());
        assert!(timestamp_from_secs(1_700_000_000).is_some());
    }
}
