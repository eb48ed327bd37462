pub mod aggregator;
pub mod types;

pub use aggregator::aggregate;
pub use types::{ChainRanking, ChainSummary, FailedChain, TokenHolding, WalletReport};
