//! # Omnichain
//!
//! One operation set over EVM chains and Solana: native and token
//! transfers, balance queries, contract reads and writes, and their batched
//! variants, regardless of which protocol family a chain belongs to.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain`): Chain descriptors, operation requests and results, error taxonomy
//! - **Application Layer** (`application`): Dispatcher, batch engine, multicall batcher, retry wrapper, gateway facade
//! - **Infrastructure Layer** (`infrastructure`): Chain registry, EVM and Solana client handles
//! - **Configuration** (`config`): File and environment backed settings
//!
//! ## Example
//!
//! ```rust,ignore
//! use omnichain::application::Gateway;
//! use omnichain::config::AppConfig;
//! use omnichain::domain::OperationRequest;
//!
//! let gateway = Gateway::from_config(&AppConfig::load()?)?;
//! let result = gateway
//!     .dispatcher()
//!     .execute(OperationRequest::native_balance("BASE", "0x..."))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub(crate) mod testing;
