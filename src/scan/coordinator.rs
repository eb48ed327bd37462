use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use tokio::time::Instant;

use crate::address::AddressFamily;
use crate::chains::{supported_chains, ChainDescriptor};
use crate::providers::{ChainOutcome, ProviderFailure, ProviderRegistry, RawActivity};

/// The only error that aborts an analysis. Raised before any fetch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("Unsupported address format: '{0}'")]
    UnknownFamily(String),
    #[error("None of the requested chains ({requested}) support {family} addresses")]
    NoMatchingChains {
        family: AddressFamily,
        requested: String,
    },
}

/// Chains to scan for an address family.
///
/// With no subset (or an empty one) this is every catalog chain of the family.
/// A subset is intersected with that list; the result keeps catalog order and
/// carries no duplicates.
pub fn working_set(
    family: AddressFamily,
    requested: Option<&[String]>,
) -> Result<Vec<&'static ChainDescriptor>, ClassificationError> {
    let supported = supported_chains(family);
    if supported.is_empty() {
        return Err(ClassificationError::UnknownFamily(family.to_string()));
    }

    let requested = match requested {
        Some(list) if !list.is_empty() => list,
        _ => return Ok(supported),
    };

    let wanted: Vec<String> = requested
        .iter()
        .map(|c| c.trim().to_lowercase())
        .collect();
    let selected: Vec<_> = supported
        .into_iter()
        .filter(|chain| wanted.iter().any(|w| w == chain.id))
        .collect();

    if selected.is_empty() {
        return Err(ClassificationError::NoMatchingChains {
            family,
            requested: requested.join(", "),
        });
    }
    Ok(selected)
}

/// Fans one address out to every chain in the working set and joins the
/// outcomes under a single deadline.
#[derive(Clone)]
pub struct ScanCoordinator {
    registry: ProviderRegistry,
}

impl ScanCoordinator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Returns exactly one outcome per chain. `NotFound` is recorded as empty
    /// activity; chains still pending at `deadline` are recorded as `Timeout`.
    pub async fn scan(
        &self,
        address: &str,
        chains: &[&'static ChainDescriptor],
        deadline: Instant,
    ) -> BTreeMap<String, ChainOutcome> {
        tracing::info!(address = %address, chains = chains.len(), "Starting scan");
        let started = Instant::now();

        let mut outcomes: BTreeMap<String, ChainOutcome> = chains
            .iter()
            .map(|chain| (chain.id.to_string(), Err(ProviderFailure::Timeout)))
            .collect();

        let mut pending: FuturesUnordered<_> = chains
            .iter()
            .map(|chain| {
                let chain: &'static ChainDescriptor = *chain;
                let provider = self.registry.provider_for(chain);
                async move {
                    let outcome = match provider {
                        Some(provider) => provider.fetch(address, chain, deadline).await,
                        None => Err(ProviderFailure::UpstreamError(format!(
                            "No provider registered for {} chains",
                            chain.family
                        ))),
                    };
                    (chain.id, outcome)
                }
            })
            .collect();

        let join = async {
            while let Some((chain, outcome)) = pending.next().await {
                let outcome = match outcome {
                    Err(ProviderFailure::NotFound) => Ok(RawActivity::empty()),
                    other => other,
                };
                match &outcome {
                    Ok(activity) => tracing::debug!(
                        chain = chain,
                        records = activity.records.len(),
                        "Chain fetched"
                    ),
                    Err(ProviderFailure::RateLimited(msg)) => {
                        tracing::warn!(chain = chain, error = %msg, "Provider rate limited")
                    }
                    Err(e) => tracing::warn!(chain = chain, error = %e, "Chain fetch failed"),
                }
                outcomes.insert(chain.to_string(), outcome);
            }
        };

        if tokio::time::timeout_at(deadline, join).await.is_err() {
            tracing::warn!(
                address = %address,
                pending = pending.len(),
                "Scan deadline reached, pending chains recorded as timed out"
            );
        }

        tracing::info!(
            address = %address,
            succeeded = outcomes.values().filter(|o| o.is_ok()).count(),
            failed = outcomes.values().filter(|o| o.is_err()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan finished"
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::descriptor;
    use crate::providers::{ActivityRecord, ChainProvider, Direction};
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone)]
    enum Behaviour {
        Records(usize),
        Fail(ProviderFailure),
        Hang,
    }

    /// Provider whose outcome per chain is fixed up front.
    #[derive(Default)]
    struct ScriptedProvider {
        script: HashMap<&'static str, Behaviour>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn with(mut self, chain: &'static str, behaviour: Behaviour) -> Self {
            self.script.insert(chain, behaviour);
            self
        }
    }

    #[async_trait]
    impl ChainProvider for ScriptedProvider {
        async fn fetch(
            &self,
            _address: &str,
            chain: &ChainDescriptor,
            _deadline: Instant,
        ) -> Result<RawActivity, ProviderFailure> {
            self.calls.lock().unwrap().push(chain.id.to_string());
            match self.script.get(chain.id).cloned() {
                Some(Behaviour::Records(n)) => Ok(RawActivity {
                    records: (0..n)
                        .map(|i| ActivityRecord {
                            tx_ref: format!("{}-{}", chain.id, i),
                            direction: Direction::Incoming,
                            amount: BigDecimal::from(1),
                            fee: None,
                            timestamp: None,
                            counterparty: None,
                        })
                        .collect(),
                    ..RawActivity::default()
                }),
                Some(Behaviour::Fail(e)) => Err(e),
                Some(Behaviour::Hang) => futures::future::pending().await,
                None => Ok(RawActivity::empty()),
            }
        }
    }

    fn coordinator(family: AddressFamily, provider: Arc<ScriptedProvider>) -> ScanCoordinator {
        ScanCoordinator::new(ProviderRegistry::new().with_provider(family, provider))
    }

    fn ids(chains: &[&ChainDescriptor]) -> Vec<&'static str> {
        chains.iter().map(|c| c.id).collect()
    }

    #[test]
    fn working_set_defaults_to_family_chains() {
        let evm = working_set(AddressFamily::Evm, None).unwrap();
        assert_eq!(evm.len(), 8);
        assert_eq!(ids(&working_set(AddressFamily::Bitcoin, Some(&[])).unwrap()), vec!["bitcoin"]);
    }

    #[test]
    fn working_set_intersects_in_catalog_order() {
        let requested = vec![
            "Base".to_string(),
            "ethereum".to_string(),
            "solana".to_string(),
            "base".to_string(),
        ];
        let chains = working_set(AddressFamily::Evm, Some(&requested)).unwrap();
        assert_eq!(ids(&chains), vec!["ethereum", "base"]);
    }

    #[test]
    fn working_set_errors() {
        assert_eq!(
            working_set(AddressFamily::Unknown, None).unwrap_err(),
            ClassificationError::UnknownFamily("unknown".to_string())
        );

        let requested = vec!["solana".to_string()];
        assert!(matches!(
            working_set(AddressFamily::Evm, Some(&requested)),
            Err(ClassificationError::NoMatchingChains { .. })
        ));
    }

    #[tokio::test]
    async fn unrestricted_evm_scan_fetches_every_network() {
        let provider = Arc::new(ScriptedProvider::default().with("ethereum", Behaviour::Records(3)));
        let chains = working_set(AddressFamily::Evm, None).unwrap();
        let outcomes = coordinator(AddressFamily::Evm, provider.clone())
            .scan("0xabc", &chains, Instant::now() + Duration::from_secs(5))
            .await;

        let mut called = provider.calls.lock().unwrap().clone();
        called.sort();
        let mut expected: Vec<String> = chains.iter().map(|c| c.id.to_string()).collect();
        expected.sort();
        assert_eq!(called, expected);

        assert_eq!(outcomes.len(), 8);
        assert_eq!(outcomes["ethereum"].as_ref().unwrap().records.len(), 3);
        assert!(outcomes["polygon"].as_ref().unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn failures_are_isolated_per_chain() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .with("ethereum", Behaviour::Fail(ProviderFailure::UpstreamError("boom".into())))
                .with("polygon", Behaviour::Fail(ProviderFailure::RateLimited("429".into())))
                .with("bsc", Behaviour::Fail(ProviderFailure::NotFound))
                .with("base", Behaviour::Records(2)),
        );
        let chains = working_set(AddressFamily::Evm, None).unwrap();
        let outcomes = coordinator(AddressFamily::Evm, provider)
            .scan("0xabc", &chains, Instant::now() + Duration::from_secs(5))
            .await;

        assert_eq!(
            outcomes["ethereum"].as_ref().unwrap_err(),
            &ProviderFailure::UpstreamError("boom".into())
        );
        assert!(matches!(outcomes["polygon"], Err(ProviderFailure::RateLimited(_))));
        // NotFound is empty activity, not a failure
        assert!(outcomes["bsc"].as_ref().unwrap().records.is_empty());
        assert_eq!(outcomes["base"].as_ref().unwrap().records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_chain_is_recorded_as_timeout() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .with("ethereum", Behaviour::Hang)
                .with("arbitrum", Behaviour::Records(1)),
        );
        let chains = vec![descriptor("ethereum").unwrap(), descriptor("arbitrum").unwrap()];
        let budget = Duration::from_millis(500);
        let started = Instant::now();

        let outcomes = coordinator(AddressFamily::Evm, provider)
            .scan("0xabc", &chains, started + budget)
            .await;

        assert!(started.elapsed() <= budget + Duration::from_millis(50));
        assert_eq!(outcomes["ethereum"].as_ref().unwrap_err(), &ProviderFailure::Timeout);
        assert_eq!(outcomes["arbitrum"].as_ref().unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn missing_provider_is_a_chain_failure() {
        let chains = vec![descriptor("tron").unwrap()];
        let outcomes = ScanCoordinator::new(ProviderRegistry::new())
            .scan("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t", &chains, Instant::now() + Duration::from_secs(1))
            .await;
        assert!(matches!(outcomes["tron"], Err(ProviderFailure::UpstreamError(_))));
    }
}
