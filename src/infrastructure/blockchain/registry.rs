//! # Chain Registry
//!
//! Static table of chain descriptors and multicall aggregator addresses.
//!
//! The registry is built once and never mutated afterwards, so it can be
//! shared behind an `Arc` without locking. Endpoint resolution order is:
//!
//! 1. per-request override
//! 2. configured per-chain endpoint (`rpc_urls` in the config file)
//! 3. `{KEY}_RPC_URL` environment variable, captured at construction
//! 4. the built-in public endpoint

use super::multicall::MULTICALL3_ADDRESS;
use crate::domain::chain::{AltNetwork, ChainDescriptor, ChainKey, NativeCurrency, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult};
use ethers::types::Address;
use std::collections::HashMap;

/// EVM chain ids with a Multicall3 deployment at [`MULTICALL3_ADDRESS`].
pub const MULTICALL3_CHAIN_IDS: &[u64] = &[1, 137, 42161, 10, 8453, 56, 43114, 250, 100, 1101, 324];

/// Lookup table of supported chains.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<ChainKey, ChainDescriptor>,
    order: Vec<ChainKey>,
    by_chain_id: HashMap<u64, ChainKey>,
    aggregators: HashMap<u64, Address>,
    configured_endpoints: HashMap<ChainKey, String>,
    env_endpoints: HashMap<ChainKey, String>,
}

impl ChainRegistry {
    /// Builds a registry from descriptors, in registration order.
    ///
    /// Aggregators are registered for the default Multicall3 chain ids.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a key or an EVM chain id appears twice.
    pub fn new(descriptors: Vec<ChainDescriptor>) -> GatewayResult<Self> {
        let mut registry = Self::empty();
        for descriptor in descriptors {
            if registry.chains.contains_key(descriptor.key()) {
                return Err(GatewayError::configuration(format!(
                    "duplicate chain key: {}",
                    descriptor.key()
                )));
            }
            if let Some(id) = descriptor.chain_id()
                && let Some(existing) = registry.by_chain_id.get(&id)
            {
                return Err(GatewayError::configuration(format!(
                    "chain id {id} registered for both {existing} and {}",
                    descriptor.key()
                )));
            }
            registry.insert(descriptor);
        }
        Ok(registry)
    }

    /// Builds the registry of built-in chains.
    #[must_use]
    pub fn defaults() -> Self {
        let mut registry = Self::empty();
        for descriptor in default_chains() {
            registry.insert(descriptor);
        }
        registry
    }

    fn empty() -> Self {
        Self {
            chains: HashMap::new(),
            order: Vec::new(),
            by_chain_id: HashMap::new(),
            aggregators: MULTICALL3_CHAIN_IDS
                .iter()
                .map(|id| (*id, MULTICALL3_ADDRESS))
                .collect(),
            configured_endpoints: HashMap::new(),
            env_endpoints: HashMap::new(),
        }
    }

    fn insert(&mut self, descriptor: ChainDescriptor) {
        let key = descriptor.key().clone();
        if let Some(id) = descriptor.chain_id() {
            self.by_chain_id.insert(id, key.clone());
        }
        self.order.push(key.clone());
        self.chains.insert(key, descriptor);
    }

    /// Sets configured per-chain endpoints.
    #[must_use]
    pub fn with_configured_endpoints<K: Into<ChainKey>>(
        mut self,
        endpoints: impl IntoIterator<Item = (K, String)>,
    ) -> Self {
        self.configured_endpoints = endpoints
            .into_iter()
            .map(|(k, url)| (k.into(), url))
            .collect();
        self
    }

    /// Captures `{KEY}_RPC_URL` for every registered chain from the process
    /// environment.
    #[must_use]
    pub fn with_env_endpoints(self) -> Self {
        self.with_env_source(|name| std::env::var(name).ok())
    }

    /// Captures per-chain endpoints from an arbitrary variable source.
    #[must_use]
    pub fn with_env_source(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.env_endpoints = self
            .order
            .iter()
            .filter_map(|key| {
                lookup(&key.rpc_env_var())
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| (key.clone(), url))
            })
            .collect();
        self
    }

    /// Registers or replaces the aggregator for an EVM chain id.
    #[must_use]
    pub fn with_aggregator(mut self, chain_id: u64, address: Address) -> Self {
        self.aggregators.insert(chain_id, address);
        self
    }

    /// Resolves a chain key.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain` if the key is not registered.
    pub fn resolve(&self, key: &ChainKey) -> GatewayResult<&ChainDescriptor> {
        self.chains
            .get(key)
            .ok_or_else(|| GatewayError::unknown_chain(key.as_str()))
    }

    /// Returns true if the key is registered.
    #[must_use]
    pub fn contains(&self, key: &ChainKey) -> bool {
        self.chains.contains_key(key)
    }

    /// Resolves the RPC endpoint for a chain.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain` if the key is not registered.
    pub fn endpoint_for(&self, key: &ChainKey, rpc_override: Option<&str>) -> GatewayResult<String> {
        let descriptor = self.resolve(key)?;
        if let Some(url) = rpc_override {
            return Ok(url.to_string());
        }
        Ok(self
            .configured_endpoints
            .get(key)
            .or_else(|| self.env_endpoints.get(key))
            .cloned()
            .unwrap_or_else(|| descriptor.rpc_url().to_string()))
    }

    /// Looks up an EVM chain by numeric id.
    #[must_use]
    pub fn by_chain_id(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.by_chain_id
            .get(&chain_id)
            .and_then(|key| self.chains.get(key))
    }

    /// Returns all chains in registration order.
    pub fn all(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.order.iter().filter_map(|key| self.chains.get(key))
    }

    /// Returns EVM chains in registration order.
    pub fn evm_chains(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.all().filter(|c| c.family() == ProtocolFamily::Evm)
    }

    /// Returns alternate-family chains in registration order.
    pub fn alt_chains(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.all().filter(|c| c.family() == ProtocolFamily::Alt)
    }

    /// Returns the multicall aggregator for a chain, if one is deployed.
    #[must_use]
    pub fn aggregator_for(&self, descriptor: &ChainDescriptor) -> Option<Address> {
        descriptor
            .chain_id()
            .and_then(|id| self.aggregator_for_chain_id(id))
    }

    /// Returns the multicall aggregator deployed on an EVM chain id.
    #[must_use]
    pub fn aggregator_for_chain_id(&self, chain_id: u64) -> Option<Address> {
        self.aggregators.get(&chain_id).copied()
    }

    /// Builds the explorer link for a transaction on a chain.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain` if the key is not registered.
    pub fn explorer_tx_url(&self, key: &ChainKey, hash: &str) -> GatewayResult<String> {
        Ok(self.resolve(key)?.explorer_tx_url(hash))
    }

    /// Number of registered chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no chains are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

fn eth() -> NativeCurrency {
    NativeCurrency::new("Ether", "ETH", 18)
}

fn sol() -> NativeCurrency {
    NativeCurrency::new("Solana", "SOL", 9)
}

/// Built-in chain table.
#[must_use]
pub fn default_chains() -> Vec<ChainDescriptor> {
    let evm = |key: &str, name: &str, id: u64, rpc: &str, explorer: &str, currency| {
        ChainDescriptor::evm(key, name, id, rpc, explorer, currency)
    };
    let alt = |key: &str, name: &str, network, rpc: &str| {
        ChainDescriptor::alt(key, name, network, rpc, "https://explorer.solana.com", sol())
    };

    vec![
        evm("ETHEREUM", "Ethereum", 1, "https://eth.llamarpc.com", "https://etherscan.io", eth()),
        evm("OPTIMISM", "Optimism", 10, "https://mainnet.optimism.io", "https://optimistic.etherscan.io", eth()),
        evm("ARBITRUM", "Arbitrum One", 42161, "https://arb1.arbitrum.io/rpc", "https://arbiscan.io", eth()),
        evm("BASE", "Base", 8453, "https://mainnet.base.org", "https://basescan.org", eth()),
        evm(
            "POLYGON",
            "Polygon",
            137,
            "https://polygon-rpc.com",
            "https://polygonscan.com",
            NativeCurrency::new("POL", "POL", 18),
        ),
        evm("POLYGON_ZKEVM", "Polygon zkEVM", 1101, "https://zkevm-rpc.com", "https://zkevm.polygonscan.com", eth()),
        evm("ZKSYNC", "zkSync Era", 324, "https://mainnet.era.zksync.io", "https://explorer.zksync.io", eth()),
        evm("LINEA", "Linea", 59144, "https://rpc.linea.build", "https://lineascan.build", eth()),
        evm("SCROLL", "Scroll", 534352, "https://rpc.scroll.io", "https://scrollscan.com", eth()),
        evm(
            "MANTLE",
            "Mantle",
            5000,
            "https://rpc.mantle.xyz",
            "https://mantlescan.info",
            NativeCurrency::new("Mantle", "MNT", 18),
        ),
        evm(
            "METIS",
            "Metis Andromeda",
            1088,
            "https://andromeda.metis.io/?owner=1088",
            "https://andromeda-explorer.metis.io",
            NativeCurrency::new("Metis", "METIS", 18),
        ),
        evm("BLAST", "Blast", 81457, "https://rpc.blast.io", "https://blastscan.io", eth()),
        evm(
            "BSC",
            "BNB Smart Chain",
            56,
            "https://bsc-dataseed.binance.org",
            "https://bscscan.com",
            NativeCurrency::new("BNB", "BNB", 18),
        ),
        evm(
            "AVALANCHE",
            "Avalanche C-Chain",
            43114,
            "https://api.avax.network/ext/bc/C/rpc",
            "https://snowtrace.io",
            NativeCurrency::new("Avalanche", "AVAX", 18),
        ),
        evm(
            "FANTOM",
            "Fantom Opera",
            250,
            "https://rpc.ftm.tools",
            "https://ftmscan.com",
            NativeCurrency::new("Fantom", "FTM", 18),
        ),
        evm(
            "GNOSIS",
            "Gnosis",
            100,
            "https://rpc.gnosischain.com",
            "https://gnosisscan.io",
            NativeCurrency::new("xDAI", "XDAI", 18),
        ),
        alt("SOLANA", "Solana", AltNetwork::Mainnet, "https://api.mainnet-beta.solana.com"),
        alt("SOLANA_DEVNET", "Solana Devnet", AltNetwork::Devnet, "https://api.devnet.solana.com"),
        alt("SOLANA_TESTNET", "Solana Testnet", AltNetwork::Testnet, "https://api.testnet.solana.com"),
    ]
}
