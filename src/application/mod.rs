//! # Application Layer
//!
//! Orchestration over the client handles: routing, batching, multicall,
//! retries, and the [`Gateway`] facade that wires them from configuration.

pub mod gateway;
pub mod services;

pub use gateway::{Gateway, HealthReport};
