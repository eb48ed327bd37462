use chrono::{DateTime, Utc};

use crate::report::WalletReport;

use super::format::{
    format_count_opt, format_native, format_timestamp, format_usd, format_usd_opt, short_address,
};

const BREAKDOWN_HEADER: &[&str] = &[
    "Chain",
    "Symbol",
    "Transactions",
    "Incoming",
    "Outgoing",
    "Received (Native)",
    "Received (USD)",
    "Sent (Native)",
    "Sent (USD)",
    "Fees (Native)",
    "Fees (USD)",
    "Balance (Native)",
    "Balance (USD)",
    "Token Transfers",
    "Unique Counterparties",
    "First Activity",
    "Last Activity",
];

const HOLDINGS_HEADER: &[&str] = &["Chain", "Token", "Name", "Balance", "Value (USD)", "Contract"];

/// Render a report as a sectioned CSV sheet. Chain rows keep report order.
pub fn to_csv(report: &WalletReport, generated_at: DateTime<Utc>) -> eyre::Result<Vec<u8>> {
    let mut w = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    let mut row = |fields: &[String]| -> eyre::Result<()> {
        w.write_record(fields)
            .map_err(|e| eyre::eyre!("Failed to write CSV row: {}", e))
    };

    row(&["WEB3 WALLET ANALYSIS REPORT".to_string()])?;
    row(&["Generated".to_string(), format_timestamp(Some(generated_at))])?;

    row(&["SUMMARY".to_string()])?;
    let summary = [
        ("Address", report.address.clone()),
        ("Address Type", report.address_type.as_str().to_uppercase()),
        ("Chains Analyzed", report.chains_analyzed.join(", ")),
        ("Total Transactions", report.total_tx_count.to_string()),
        ("Total Received (USD)", format_usd(report.total_received_usd)),
        ("Total Sent (USD)", format_usd(report.total_sent_usd)),
        ("Net Flow (USD)", format_usd(report.net_flow_usd)),
        ("Total Fees (USD)", format_usd(report.total_fees_usd)),
        ("Current Balance (USD)", format_usd(report.total_current_balance_usd)),
        (
            "Wallet Age (Days)",
            report
                .wallet_age_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        ),
        ("First Activity", format_timestamp(report.first_activity)),
        ("Last Activity", format_timestamp(report.last_activity)),
        ("Active Chains", report.chains_with_activity.join(", ")),
    ];
    for (label, value) in summary {
        row(&[label.to_string(), value])?;
    }

    row(&["CHAIN BREAKDOWN (Sorted by Activity)".to_string()])?;
    row(&BREAKDOWN_HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>())?;
    for s in &report.chain_summaries {
        row(&[
            s.chain_name.clone(),
            s.native_symbol.clone(),
            s.tx_count.to_string(),
            format_count_opt(s.incoming_tx_count),
            format_count_opt(s.outgoing_tx_count),
            format_native(&s.total_received),
            format_usd_opt(s.total_received_usd),
            format_native(&s.total_sent),
            format_usd_opt(s.total_sent_usd),
            format_native(&s.total_fees),
            format_usd_opt(s.total_fees_usd),
            s.native_balance
                .as_ref()
                .map(format_native)
                .unwrap_or_else(|| "N/A".to_string()),
            format_usd_opt(s.balance_usd),
            s.token_transfer_count.to_string(),
            s.unique_counterparties.to_string(),
            format_timestamp(s.first_activity),
            format_timestamp(s.last_activity),
        ])?;
    }

    if !report.all_token_holdings.is_empty() {
        row(&["TOKEN HOLDINGS".to_string()])?;
        row(&HOLDINGS_HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>())?;
        for token in &report.all_token_holdings {
            row(&[
                token.chain.clone(),
                token.symbol.clone(),
                token.name.clone(),
                format_native(&token.balance),
                format_usd_opt(token.balance_usd),
                short_address(&token.contract_address, 6),
            ])?;
        }
    }

    if !report.failed_chains.is_empty() {
        row(&["FAILED CHAINS".to_string()])?;
        for failed in &report.failed_chains {
            row(&[failed.chain.clone(), failed.kind.clone(), failed.message.clone()])?;
        }
    }

    if !report.warnings.is_empty() {
        row(&["WARNINGS".to_string()])?;
        for warning in &report.warnings {
            row(&[warning.clone()])?;
        }
    }

    if let Some(insights) = report.insights() {
        row(&["AI INSIGHTS".to_string()])?;
        for line in insights.lines() {
            row(&[line.to_string()])?;
        }
    }

    w.into_inner()
        .map_err(|e| eyre::eyre!("Failed to flush CSV: {}", e))
}
