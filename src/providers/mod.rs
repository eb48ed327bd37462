pub mod bitcoin;
pub mod evm;
pub mod registry;
pub mod solana;
pub mod transport;
pub mod tron;
pub mod types;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::chains::ChainDescriptor;

pub use registry::ProviderRegistry;
pub use transport::{HttpTransport, Transport};
pub use types::{
    ActivityRecord, ChainOutcome, Direction, ProviderFailure, RawActivity, TokenBalance,
};

/// Fetches raw activity for one address on one chain.
///
/// Implementations make one or more outbound calls through the transport they
/// were built with, never outlive `deadline`, and keep no state between calls.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn fetch(
        &self,
        address: &str,
        chain: &ChainDescriptor,
        deadline: Instant,
    ) -> Result<RawActivity, ProviderFailure>;
}
