pub mod llm;
pub mod prompts;

use async_trait::async_trait;

use crate::providers::ProviderFailure;
use crate::report::WalletReport;

pub use llm::{LlmBackend, LlmInsights};

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("no API key configured for {0}")]
    MissingApiKey(&'static str),
    #[error("{0}")]
    Request(#[from] ProviderFailure),
    #[error("{0} returned no text")]
    EmptyResponse(&'static str),
    #[error("failed to serialize report: {0}")]
    Serialize(String),
}

/// Turns a finished report into a narrative. Reads the report, never changes
/// its figures.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, report: &WalletReport) -> Result<String, InsightError>;
}

/// Generate and attach the narrative. A failure is recorded in the narrative
/// itself; a report without active chains is left untouched.
pub async fn attach_insights(report: &mut WalletReport, generator: &dyn InsightGenerator) {
    if !report.has_activity() {
        tracing::debug!(address = %report.address, "No active chains, skipping insights");
        return;
    }

    let narrative = match generator.generate(report).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(address = %report.address, error = %e, "Insight generation failed");
            format!("AI insights unavailable: {}", e)
        }
    };
    report.attach_narrative(narrative);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressFamily;
    use crate::chains::descriptor;
    use crate::prices::PriceQuote;
    use crate::providers::{ChainOutcome, RawActivity};
    use crate::report::aggregate;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl InsightGenerator for Canned {
        async fn generate(&self, _report: &WalletReport) -> Result<String, InsightError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(InsightError::MissingApiKey("anthropic")),
            }
        }
    }

    fn report(tx_count: u64) -> WalletReport {
        let chains = vec![descriptor("tron").unwrap()];
        let mut outcomes: BTreeMap<String, ChainOutcome> = BTreeMap::new();
        outcomes.insert(
            "tron".to_string(),
            Ok(RawActivity {
                reported_tx_count: Some(tx_count),
                ..RawActivity::default()
            }),
        );
        let prices: PriceQuote = [("TRX".to_string(), 0.1)].into_iter().collect();
        aggregate("T1", AddressFamily::Tron, &chains, &outcomes, &prices, Utc::now())
    }

    #[tokio::test]
    async fn attaches_generated_text() {
        let mut report = report(3);
        let before = report.total_received_usd;
        attach_insights(&mut report, &Canned(Ok("A busy Tron wallet."))).await;
        assert_eq!(report.insights(), Some("A busy Tron wallet."));
        assert_eq!(report.total_received_usd, before);
    }

    #[tokio::test]
    async fn failure_becomes_unavailable_note() {
        let mut report = report(3);
        attach_insights(&mut report, &Canned(Err(()))).await;
        assert_eq!(
            report.insights(),
            Some("AI insights unavailable: no API key configured for anthropic")
        );
    }

    #[tokio::test]
    async fn inactive_report_is_skipped() {
        let mut report = report(0);
        attach_insights(&mut report, &Canned(Ok("unused"))).await;
        assert!(report.insights().is_none());
    }

    #[test]
    fn prompt_embeds_report_json() {
        let prompt = prompts::analysis_prompt(&report(3)).unwrap();
        assert!(prompt.contains("\"address\": \"T1\""));
        assert!(prompt.contains("\"chains_with_activity\""));
        assert!(!prompt.contains("{wallet_data}"));
    }
}
