//! # Application Services
//!
//! Services that route, batch, and retry operations over the client handles.
//!
//! This module provides application-level services including:
//! - [`Dispatcher`]: Routes one request to its protocol family's handle
//! - [`BatchEngine`]: Fan-out over targets and chains with per-item failures
//! - [`MulticallBatcher`]: Multicall3 batching of read-only calls
//! - [`RetryPolicy`]: Bounded retries with linear backoff

pub mod batch;
pub mod dispatcher;
pub mod multicall;
pub mod retry;

pub use batch::{BatchConfig, BatchEngine, Transfer};
pub use dispatcher::Dispatcher;
pub use multicall::MulticallBatcher;
pub use retry::{RetryError, RetryPolicy, Retryable, execute_with_retry};
