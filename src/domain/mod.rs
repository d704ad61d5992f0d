//! # Domain Layer
//!
//! Chain descriptors, routed operations, results, and the error taxonomy.
//! Nothing here performs I/O.

pub mod chain;
pub mod error;
pub mod health;
pub mod operation;

pub use chain::{AltNetwork, ChainDescriptor, ChainKey, NativeCurrency, NetworkId, ProtocolFamily};
pub use error::{ErrorKind, GatewayError, GatewayResult, TerminalReason};
pub use health::FamilyHealth;
pub use operation::{
    Balance, BatchResult, ChainBalance, ContractCall, FeeEstimate, OperationKind, OperationOutput,
    OperationRequest, OperationResult, TokenInfo, TxLookup, TxStatus, TxSummary,
};
