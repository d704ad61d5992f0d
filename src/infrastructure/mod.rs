//! # Infrastructure Layer
//!
//! Adapters to external systems: EVM JSON-RPC through ethers-rs and the
//! Solana JSON-RPC API through reqwest.

pub mod blockchain;
