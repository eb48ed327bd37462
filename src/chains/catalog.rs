use serde::Serialize;

use crate::address::AddressFamily;

/// Static description of one supported network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub family: AddressFamily,
    pub native_symbol: &'static str,
    pub native_decimals: u32,
    /// Numeric chain id passed to the Etherscan V2 API (EVM only).
    pub network_id: Option<u64>,
}

const fn evm(id: &'static str, name: &'static str, symbol: &'static str, network_id: u64) -> ChainDescriptor {
    ChainDescriptor {
        id,
        name,
        family: AddressFamily::Evm,
        native_symbol: symbol,
        native_decimals: 18,
        network_id: Some(network_id),
    }
}

/// Every chain the analyzer knows about, grouped by family. Built at compile
/// time and never mutated, so concurrent scans read it without locking.
pub static CHAINS: &[ChainDescriptor] = &[
    evm("ethereum", "Ethereum", "ETH", 1),
    evm("polygon", "Polygon", "POL", 137),
    evm("bsc", "BNB Chain", "BNB", 56),
    evm("arbitrum", "Arbitrum", "ETH", 42161),
    evm("optimism", "Optimism", "ETH", 10),
    evm("avalanche", "Avalanche", "AVAX", 43114),
    evm("base", "Base", "ETH", 8453),
    evm("fantom", "Fantom", "FTM", 250),
    ChainDescriptor {
        id: "solana",
        name: "Solana",
        family: AddressFamily::Solana,
        native_symbol: "SOL",
        native_decimals: 9,
        network_id: None,
    },
    ChainDescriptor {
        id: "bitcoin",
        name: "Bitcoin",
        family: AddressFamily::Bitcoin,
        native_symbol: "BTC",
        native_decimals: 8,
        network_id: None,
    },
    ChainDescriptor {
        id: "tron",
        name: "Tron",
        family: AddressFamily::Tron,
        native_symbol: "TRX",
        native_decimals: 6,
        network_id: None,
    },
];

/// Look up a chain by its identifier.
pub fn descriptor(chain_id: &str) -> Option<&'static ChainDescriptor> {
    CHAINS.iter().find(|c| c.id == chain_id)
}

/// Chains to scan for an address family, in catalog order.
pub fn supported_chains(family: AddressFamily) -> Vec<&'static ChainDescriptor> {
    CHAINS.iter().filter(|c| c.family == family).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_family_has_eight_networks() {
        let evm = supported_chains(AddressFamily::Evm);
        assert_eq!(evm.len(), 8);
        assert!(evm.iter().all(|c| c.network_id.is_some()));
        assert_eq!(evm[0].id, "ethereum");
    }

    #[test]
    fn single_chain_families() {
        for (family, id) in [
            (AddressFamily::Solana, "solana"),
            (AddressFamily::Bitcoin, "bitcoin"),
            (AddressFamily::Tron, "tron"),
        ] {
            let chains = supported_chains(family);
            assert_eq!(chains.len(), 1);
            assert_eq!(chains[0].id, id);
        }
        assert!(supported_chains(AddressFamily::Unknown).is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = CHAINS.iter().map(|c| c.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), CHAINS.len());
    }

    #[test]
    fn lookup_by_id() {
        let bsc = descriptor("bsc").unwrap();
        assert_eq!(bsc.native_symbol, "BNB");
        assert_eq!(bsc.network_id, Some(56));
        assert!(descriptor("dogecoin").is_none());
    }
}
