use serde::Serialize;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Blockchain ecosystem an address syntactically belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Evm,
    Solana,
    Bitcoin,
    Tron,
    Unknown,
}

impl AddressFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Solana => "solana",
            Self::Bitcoin => "bitcoin",
            Self::Tron => "tron",
            Self::Unknown => "unknown",
        }
    }

    /// Only EVM chains expose a per-transaction gas fee we can total.
    pub fn has_gas(&self) -> bool {
        matches!(self, Self::Evm)
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the address family from its textual form.
///
/// Rules are checked in a fixed order so that a string can only ever match one
/// family. No network access and no case folding: mixed-case EVM hex is fine.
pub fn classify(address: &str) -> AddressFamily {
    let address = address.trim();

    if is_evm(address) {
        AddressFamily::Evm
    } else if is_bitcoin(address) {
        AddressFamily::Bitcoin
    } else if is_tron(address) {
        AddressFamily::Tron
    } else if is_solana(address) {
        AddressFamily::Solana
    } else {
        AddressFamily::Unknown
    }
}

fn is_evm(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && hex::decode(&address[2..]).is_ok()
}

fn is_bitcoin(address: &str) -> bool {
    if let Some(rest) = address.strip_prefix("bc1") {
        // bech32 / bech32m segwit: hrp "bc" + separator + data part
        return (28..=93).contains(&address.len())
            && rest
                .bytes()
                .all(|b| BECH32_CHARSET.contains(&b.to_ascii_lowercase()));
    }

    // Legacy P2PKH (1...) and P2SH (3...)
    (address.starts_with('1') || address.starts_with('3'))
        && (26..=35).contains(&address.len())
        && is_base58(address)
}

fn is_tron(address: &str) -> bool {
    address.len() == 34 && address.starts_with('T') && is_base58(address)
}

fn is_solana(address: &str) -> bool {
    (32..=44).contains(&address.len()) && is_base58(address)
}

fn is_base58(s: &str) -> bool {
    s.bytes().all(|b| BASE58_ALPHABET.contains(&b))
}
