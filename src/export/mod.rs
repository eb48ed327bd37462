pub mod format;
pub mod sheet;
pub mod workbook;

pub use format::{format_currency, format_usd, short_address};
pub use sheet::to_csv;
pub use workbook::to_xlsx;

use crate::report::WalletReport;

/// Pretty-printed JSON of the full report.
pub fn to_json(report: &WalletReport) -> eyre::Result<Vec<u8>> {
    serde_json::to_vec_pretty(report).map_err(|e| eyre::eyre!("Failed to serialize report: {}", e))
}

/// One-line summary, e.g. `0xd8dA...A96045 (evm): 1,204 transactions on 3
/// chains, $1.52M volume, $4.20K held`.
pub fn headline(report: &WalletReport) -> String {
    let volume = report.total_received_usd + report.total_sent_usd;
    format!(
        "{} ({}): {} transactions on {} chains, {} volume, {} held",
        short_address(&report.address, 6),
        report.address_type,
        format::group_count(report.total_tx_count),
        report.chains_with_activity.len(),
        format_currency(volume),
        format_currency(report.total_current_balance_usd),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressFamily;
    use crate::prices::PriceQuote;
    use crate::report::aggregate;
    use chrono::Utc;
    use std::collections::BTreeMap;

    #[test]
    fn json_keeps_unavailable_as_null() {
        let chains = vec![crate::chains::descriptor("tron").unwrap()];
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            "tron".to_string(),
            Ok(crate::providers::RawActivity {
                reported_tx_count: Some(1),
                ..Default::default()
            }),
        );
        let report = aggregate("T1", AddressFamily::Tron, &chains, &outcomes, &PriceQuote::new(), Utc::now());

        let value: serde_json::Value = serde_json::from_slice(&to_json(&report).unwrap()).unwrap();
        assert_eq!(value["address_type"], "tron");
        assert!(value["chain_summaries"][0]["total_received_usd"].is_null());
        assert!(value["insights"].is_null());
    }

    #[test]
    fn headline_is_compact() {
        let chains = vec![crate::chains::descriptor("ethereum").unwrap()];
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            "ethereum".to_string(),
            Ok(crate::providers::RawActivity {
                reported_tx_count: Some(1204),
                reported_received: Some(500.into()),
                reported_sent: Some(260.into()),
                native_balance: Some(2.into()),
                ..Default::default()
            }),
        );
        let prices: PriceQuote = [("ETH".to_string(), 2000.0)].into_iter().collect();
        let report = aggregate(
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
            AddressFamily::Evm,
            &chains,
            &outcomes,
            &prices,
            Utc::now(),
        );

        assert_eq!(
            headline(&report),
            "0xd8dA...A96045 (evm): 1,204 transactions on 1 chains, $1.52M volume, $4.00K held"
        );
    }
}
