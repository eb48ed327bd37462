use std::collections::HashMap;
use std::sync::Arc;

use crate::address::AddressFamily;
use crate::chains::ChainDescriptor;
use crate::config::ProvidersConfig;

use super::bitcoin::BitcoinProvider;
use super::evm::EvmProvider;
use super::solana::SolanaProvider;
use super::transport::Transport;
use super::tron::TronProvider;
use super::ChainProvider;

/// Dispatch table from address family to the provider that serves its chains.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<AddressFamily, Arc<dyn ChainProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the live provider for every supported family.
    pub fn from_config(transport: Arc<dyn Transport>, config: &ProvidersConfig) -> Self {
        Self::new()
            .with_provider(
                AddressFamily::Evm,
                Arc::new(EvmProvider::new(transport.clone(), config)),
            )
            .with_provider(
                AddressFamily::Solana,
                Arc::new(SolanaProvider::new(transport.clone(), config)),
            )
            .with_provider(
                AddressFamily::Bitcoin,
                Arc::new(BitcoinProvider::new(transport.clone(), config)),
            )
            .with_provider(
                AddressFamily::Tron,
                Arc::new(TronProvider::new(transport, config)),
            )
    }

    pub fn with_provider(mut self, family: AddressFamily, provider: Arc<dyn ChainProvider>) -> Self {
        self.providers.insert(family, provider);
        self
    }

    pub fn provider_for(&self, chain: &ChainDescriptor) -> Option<Arc<dyn ChainProvider>> {
        self.providers.get(&chain.family).cloned()
    }
}
