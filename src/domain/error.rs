//! # Gateway Errors
//!
//! The single error taxonomy callers see.
//!
//! Library-native errors (provider, HTTP client, JSON-RPC error objects) are
//! mapped into [`GatewayError`] at the connection boundary by
//! [`GatewayError::from_rpc_message`], so classification happens in one
//! place per protocol family.

use crate::domain::chain::{ChainKey, ProtocolFamily};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a terminal operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Address or public key failed to parse or was rejected.
    InvalidAddress,
    /// Sender cannot cover amount plus fees.
    InsufficientFunds,
    /// Signature invalid or caller not authorized.
    Authorization,
    /// Contract execution reverted.
    Reverted,
    /// Operation not supported on this chain or backend.
    Unsupported,
    /// Node rejected the request for any other reason.
    Rejected,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidAddress => "invalid address",
            Self::InsufficientFunds => "insufficient funds",
            Self::Authorization => "authorization",
            Self::Reverted => "reverted",
            Self::Unsupported => "unsupported operation",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request could not be routed; raised, never captured per item.
    Precondition,
    /// Network-level failure worth retrying.
    Transient,
    /// Operation failed for a reason retrying will not fix.
    Terminal,
    /// A payload could not be decoded.
    Decode,
    /// Retries were exhausted.
    Exhausted,
    /// Invalid configuration or signing material.
    Configuration,
}

/// Error type for all gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Chain key not present in the registry.
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    /// No client handle configured for the chain's protocol family.
    #[error("no {family} backend configured for chain {chain}")]
    BackendNotConfigured {
        /// Family that lacks a handle.
        family: ProtocolFamily,
        /// Requested chain.
        chain: ChainKey,
    },

    /// Chain has no multicall aggregator.
    #[error("multicall not supported on chain {chain}")]
    MulticallUnsupported {
        /// Requested chain.
        chain: ChainKey,
    },

    /// Timeout, connection reset, rate limit, expired blockhash, nonce race.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Operation failed permanently.
    #[error("{reason}: {message}")]
    TerminalOperation {
        /// Failure category.
        reason: TerminalReason,
        /// Detail from the node or the validator.
        message: String,
    },

    /// Payload decode failure.
    #[error("decode error: {0}")]
    Decode(String),

    /// Bounded retries ran out.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error observed.
        last: Box<GatewayError>,
    },

    /// Invalid configuration or signing material.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Creates an unknown chain error.
    #[must_use]
    pub fn unknown_chain(chain: impl Into<String>) -> Self {
        Self::UnknownChain(chain.into())
    }

    /// Creates a transient network error.
    #[must_use]
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    /// Creates a terminal operation error.
    #[must_use]
    pub fn terminal(reason: TerminalReason, msg: impl Into<String>) -> Self {
        Self::TerminalOperation {
            reason,
            message: msg.into(),
        }
    }

    /// Creates an invalid address error.
    #[must_use]
    pub fn invalid_address(address: impl fmt::Display) -> Self {
        Self::terminal(
            TerminalReason::InvalidAddress,
            format!("invalid address: {address}"),
        )
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns the coarse category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownChain(_)
            | Self::BackendNotConfigured { .. }
            | Self::MulticallUnsupported { .. } => ErrorKind::Precondition,
            Self::TransientNetwork(_) => ErrorKind::Transient,
            Self::TerminalOperation { .. } => ErrorKind::Terminal,
            Self::Decode(_) => ErrorKind::Decode,
            Self::RetriesExhausted { .. } => ErrorKind::Exhausted,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if the operation may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Returns true if this error aborts a request or batch before any I/O.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }

    /// Returns the terminal reason, looking through retry exhaustion.
    #[must_use]
    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        match self {
            Self::TerminalOperation { reason, .. } => Some(*reason),
            Self::RetriesExhausted { last, .. } => last.terminal_reason(),
            _ => None,
        }
    }

    /// Classifies a node or transport error message.
    ///
    /// Unrecognized messages are terminal rejections.
    #[must_use]
    pub fn from_rpc_message(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&[
            "insufficient funds",
            "insufficient lamports",
            "insufficient balance",
            "attempt to debit an account but found no record of a prior credit",
        ]) {
            Self::terminal(TerminalReason::InsufficientFunds, message)
        } else if has(&["invalid address", "invalid public key", "invalid pubkey"]) {
            Self::terminal(TerminalReason::InvalidAddress, message)
        } else if has(&[
            "signature verification",
            "invalid signature",
            "unauthorized",
            "forbidden",
            "missing signature",
        ]) {
            Self::terminal(TerminalReason::Authorization, message)
        } else if has(&["execution reverted", "revert"]) {
            Self::terminal(TerminalReason::Reverted, message)
        } else if has(&[
            "already known",
            "already been processed",
            "replacement transaction underpriced",
        ]) {
            // The node already holds a transaction for this nonce or signature.
            Self::terminal(TerminalReason::Rejected, message)
        } else if has(&[
            "timeout",
            "timed out",
            "connection",
            "reset by peer",
            "rate limit",
            "429",
            "too many requests",
            "502",
            "503",
            "504",
            "bad gateway",
            "service unavailable",
            "nonce too low",
            "blockhash not found",
            "block height exceeded",
        ]) {
            Self::TransientNetwork(message)
        } else {
            Self::terminal(TerminalReason::Rejected, message)
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
