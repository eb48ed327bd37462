use crate::report::WalletReport;

use super::InsightError;

pub const SYSTEM_PROMPT: &str = "You are a Web3 wallet intelligence analyst. You read structured \
cross-chain wallet reports and write clear, data-driven briefings. Lead with what matters most, \
quote the actual figures, and call out patterns, risks and opportunities. Never invent data \
that is not in the report.";

const ANALYSIS_TEMPLATE: &str = "Write an intelligence briefing for the wallet report below.

WALLET DATA:
{wallet_data}

Cover, in this order:

1. OVERVIEW: address type, wallet age, total activity across chains and the net USD position \
(received minus sent).

2. CHAIN BREAKDOWN (most active first): for each active chain give the transaction count and \
in/out split, native and USD volume, gas spent, token transfer count, and first/last activity.

3. KEY INSIGHTS: the dominant chain, whether the wallet accumulates or spends, gas efficiency, \
and notable patterns such as DeFi use, bridging or long dormancy.

4. RISK INDICATORS: concentration on one chain, high gas relative to volume, dormancy followed \
by bursts of activity, and any other anomaly visible in the data.

5. PROFILE VERDICT: one paragraph classifying the wallet (trader, long-term holder, DeFi \
farmer, NFT collector, developer, casual user or mixed) backed by figures from the report.

Chains listed under failed_chains could not be scanned; say so instead of treating them as \
inactive. USD fields that are null mean no price was available.";

/// The user prompt with the report embedded as pretty-printed JSON.
pub fn analysis_prompt(report: &WalletReport) -> Result<String, InsightError> {
    let wallet_data =
        serde_json::to_string_pretty(report).map_err(|e| InsightError::Serialize(e.to_string()))?;
    Ok(ANALYSIS_TEMPLATE.replace("{wallet_data}", &wallet_data))
}
