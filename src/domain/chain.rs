//! # Chain Descriptors
//!
//! Identity and connection parameters for every supported chain.
//!
//! A [`ChainDescriptor`] is built once at startup and never mutated. The
//! protocol family is derived from the network identity, so a descriptor
//! can never claim to be EVM while carrying an alternate-chain network tag.
//!
//! # Examples
//!
//! ```
//! use omnichain::domain::chain::{ChainDescriptor, ChainKey, NativeCurrency, ProtocolFamily};
//!
//! let chain = ChainDescriptor::evm(
//!     "ethereum",
//!     "Ethereum",
//!     1,
//!     "https://eth.llamarpc.com",
//!     "https://etherscan.io",
//!     NativeCurrency::new("Ether", "ETH", 18),
//! );
//!
//! assert_eq!(chain.key(), &ChainKey::new("ETHEREUM"));
//! assert_eq!(chain.family(), ProtocolFamily::Evm);
//! assert_eq!(chain.explorer_tx_url("0xabc"), "https://etherscan.io/tx/0xabc");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical chain identifier.
///
/// Keys are normalized to upper case with `-` replaced by `_`, so
/// `polygon-zkevm` and `POLYGON_ZKEVM` name the same chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChainKey(String);

impl ChainKey {
    /// Creates a normalized chain key.
    #[must_use]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(key.as_ref().trim().to_uppercase().replace('-', "_"))
    }

    /// Returns the key as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the environment variable name used to override this chain's
    /// RPC endpoint (e.g. `ETHEREUM_RPC_URL`).
    #[must_use]
    pub fn rpc_env_var(&self) -> String {
        format!("{}_RPC_URL", self.0)
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChainKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ChainKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<ChainKey> for String {
    fn from(key: ChainKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ChainKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Protocol family of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtocolFamily {
    /// Ethereum execution model: chain-id scoped JSON-RPC, locally signed
    /// transactions.
    Evm,
    /// Alternate (Solana) execution model: blockhash-scoped transactions
    /// and commitment levels.
    Alt,
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm => write!(f, "EVM"),
            Self::Alt => write!(f, "ALT"),
        }
    }
}

/// Network tag for the alternate chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltNetwork {
    /// Production cluster.
    #[default]
    Mainnet,
    /// Development cluster.
    Devnet,
    /// Test cluster.
    Testnet,
}

impl AltNetwork {
    /// Returns the cluster name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
        }
    }
}

impl fmt::Display for AltNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AltNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Network identity: a numeric chain id for EVM chains, a cluster tag for
/// the alternate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "id", rename_all = "UPPERCASE")]
pub enum NetworkId {
    /// EVM chain id.
    Evm(u64),
    /// Alternate-chain cluster.
    Alt(AltNetwork),
}

impl NetworkId {
    /// Returns the protocol family this network belongs to.
    #[must_use]
    pub const fn family(&self) -> ProtocolFamily {
        match self {
            Self::Evm(_) => ProtocolFamily::Evm,
            Self::Alt(_) => ProtocolFamily::Alt,
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm(id) => write!(f, "{id}"),
            Self::Alt(network) => write!(f, "{network}"),
        }
    }
}

/// Native currency of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Decimal precision of the base unit.
    pub decimals: u8,
}

impl NativeCurrency {
    /// Creates a native currency description.
    #[must_use]
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Immutable description of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    key: ChainKey,
    name: String,
    network: NetworkId,
    rpc_url: String,
    explorer_url: String,
    native_currency: NativeCurrency,
}

impl ChainDescriptor {
    /// Creates a descriptor for an EVM chain.
    #[must_use]
    pub fn evm(
        key: impl Into<ChainKey>,
        name: impl Into<String>,
        chain_id: u64,
        rpc_url: impl Into<String>,
        explorer_url: impl Into<String>,
        native_currency: NativeCurrency,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            network: NetworkId::Evm(chain_id),
            rpc_url: rpc_url.into(),
            explorer_url: explorer_url.into(),
            native_currency,
        }
    }

    /// Creates a descriptor for an alternate-family cluster.
    #[must_use]
    pub fn alt(
        key: impl Into<ChainKey>,
        name: impl Into<String>,
        network: AltNetwork,
        rpc_url: impl Into<String>,
        explorer_url: impl Into<String>,
        native_currency: NativeCurrency,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            network: NetworkId::Alt(network),
            rpc_url: rpc_url.into(),
            explorer_url: explorer_url.into(),
            native_currency,
        }
    }

    /// Returns the logical chain key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ChainKey {
        &self.key
    }

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the network identity.
    #[inline]
    #[must_use]
    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// Returns the protocol family.
    #[inline]
    #[must_use]
    pub fn family(&self) -> ProtocolFamily {
        self.network.family()
    }

    /// Returns the EVM chain id, or `None` for alternate-family chains.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        match self.network {
            NetworkId::Evm(id) => Some(id),
            NetworkId::Alt(_) => None,
        }
    }

    /// Returns the built-in public RPC endpoint.
    #[inline]
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Returns the explorer base URL.
    #[inline]
    #[must_use]
    pub fn explorer_url(&self) -> &str {
        &self.explorer_url
    }

    /// Returns the native currency.
    #[inline]
    #[must_use]
    pub fn native_currency(&self) -> &NativeCurrency {
        &self.native_currency
    }

    /// Builds the explorer link for a transaction hash or signature.
    ///
    /// Non-mainnet alternate clusters get a `?cluster=` suffix.
    #[must_use]
    pub fn explorer_tx_url(&self, hash: &str) -> String {
        let base = self.explorer_url.trim_end_matches('/');
        match self.network {
            NetworkId::Alt(network) if network != AltNetwork::Mainnet => {
                format!("{base}/tx/{hash}?cluster={network}")
            }
            _ => format!("{base}/tx/{hash}"),
        }
    }
}
