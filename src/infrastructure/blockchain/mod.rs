//! # Blockchain Clients
//!
//! Chain registry, connection ports, and the two family handles.
//!
//! ## Available Components
//!
//! - [`ChainRegistry`]: Descriptors, endpoint precedence, aggregators
//! - [`EvmConnection`] / [`EvmConnector`]: EVM port, one connection per binding
//! - [`EthersConnector`]: ethers-rs implementation of the EVM port
//! - [`EvmHandle`]: Chain-switchable EVM handle
//! - [`AltConnection`]: Solana JSON-RPC port
//! - [`SolanaRpcClient`]: reqwest implementation of the Solana port
//! - [`AltHandle`]: Solana handle with blockhash-bounded confirmation
//!
//! ## Supported Chains
//!
//! - Ethereum, Polygon, Arbitrum, Optimism, Base, BSC, Avalanche and
//!   other EVM networks (see [`registry::default_chains`])
//! - Solana mainnet, devnet and testnet

pub mod alt;
pub mod client;
pub mod ethereum;
pub mod evm;
pub mod multicall;
pub mod registry;
pub mod solana;

pub use alt::AltHandle;
pub use client::{
    AltConnection, EvmConnection, EvmConnector, EvmTxRequest, SubmittedTx, TxHash, TxReceipt,
};
pub use ethereum::{EthersConnector, EvmSigner, GeneratedWallet};
pub use evm::{EvmBinding, EvmHandle};
pub use registry::ChainRegistry;
pub use solana::{AltKeypair, Commitment, Pubkey, SolanaRpcClient};
