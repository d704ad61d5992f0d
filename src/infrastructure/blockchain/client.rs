//! # Connection Ports
//!
//! Port definitions for the two protocol families.
//!
//! [`EvmConnection`] is one signer-bound connection to one EVM endpoint;
//! an [`EvmConnector`] builds a fresh one on every chain switch.
//! [`AltConnection`] is the JSON-RPC surface the alternate-chain handle
//! needs. Both return [`GatewayError`] only: library errors are classified
//! by the implementing adapter.

use crate::domain::chain::ChainDescriptor;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::operation::TxStatus;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, Signature, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Transaction hash or signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    /// Creates a new transaction hash.
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TxHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Receipt of an included EVM transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Block number where the transaction was included.
    pub block_number: Option<u64>,
    /// Whether execution succeeded.
    pub success: bool,
}

/// Unsigned EVM transaction the connection signs and broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTxRequest {
    /// Recipient or contract.
    pub to: Address,
    /// Value in wei.
    pub value: U256,
    /// Calldata, empty for plain transfers.
    pub data: Bytes,
}

/// One signer-bound connection to an EVM endpoint.
#[async_trait]
pub trait EvmConnection: Send + Sync + fmt::Debug {
    /// Chain id this connection signs for.
    fn chain_id(&self) -> u64;

    /// Endpoint URL.
    fn endpoint(&self) -> &str;

    /// Signer address.
    fn address(&self) -> Address;

    /// Returns the native balance in wei.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn native_balance(&self, address: Address) -> GatewayResult<U256>;

    /// Executes a read-only `eth_call`.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the call fails or reverts.
    async fn call(&self, to: Address, data: Bytes) -> GatewayResult<Bytes>;

    /// Signs and broadcasts a transaction.
    ///
    /// # Errors
    ///
    /// Returns a classified error if gas estimation, signing or broadcast fails.
    async fn broadcast(&self, tx: EvmTxRequest) -> GatewayResult<TxHash>;

    /// Waits until the transaction has `confirmations` confirmations.
    ///
    /// Callers bound this with a timeout.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the receipt cannot be fetched.
    async fn wait_for_receipt(&self, hash: &TxHash, confirmations: usize)
    -> GatewayResult<TxReceipt>;

    /// Returns the latest block number.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn block_number(&self) -> GatewayResult<u64>;

    /// Fetches the receipt of a mined transaction, `None` if not mined.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn transaction_receipt(&self, hash: &TxHash) -> GatewayResult<Option<TxReceipt>>;

    /// Returns true if the node knows the transaction, mined or not.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn transaction_known(&self, hash: &TxHash) -> GatewayResult<bool>;

    /// Estimates the gas `tx` would use when sent by the signer.
    ///
    /// # Errors
    ///
    /// Returns a classified error, e.g. `Reverted` if the call would fail.
    async fn estimate_gas(&self, tx: &EvmTxRequest) -> GatewayResult<U256>;

    /// Current gas price in wei.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn gas_price(&self) -> GatewayResult<U256>;

    /// Signs `message` with the EIP-191 personal-message prefix.
    ///
    /// # Errors
    ///
    /// Returns `Authorization` if the signer fails.
    async fn sign_message(&self, message: &[u8]) -> GatewayResult<Signature>;
}

/// Builds EVM connections for chain switches.
pub trait EvmConnector: Send + Sync + fmt::Debug {
    /// Connects to `endpoint` for `chain`, binding the configured signer.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` or `TransientNetwork` if the connection
    /// cannot be built.
    fn connect(
        &self,
        chain: &ChainDescriptor,
        endpoint: &str,
    ) -> GatewayResult<Arc<dyn EvmConnection>>;
}

/// Blockhash a transaction was built against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockhashContext {
    /// Base58 blockhash.
    pub blockhash: String,
    /// Last block height at which the blockhash is accepted.
    pub last_valid_block_height: u64,
}

/// Status of a submitted alternate-chain signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStatus {
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Commitment reached, e.g. `confirmed`.
    pub confirmation_status: Option<String>,
    /// On-chain error, if execution failed.
    pub err: Option<String>,
}

/// A token account owned by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    /// Token account address.
    pub address: String,
    /// Token program that owns the account.
    pub program_id: String,
    /// Balance in token base units.
    pub amount: u128,
    /// Mint decimals.
    pub decimals: u8,
}

/// JSON-RPC surface of the alternate chain.
#[async_trait]
pub trait AltConnection: Send + Sync + fmt::Debug {
    /// Endpoint URL.
    fn endpoint(&self) -> &str;

    /// Returns the lamport balance.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn balance(&self, address: &str) -> GatewayResult<u64>;

    /// Returns the owner's token accounts for a mint.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn token_accounts(&self, owner: &str, mint: &str) -> GatewayResult<Vec<TokenAccount>>;

    /// Fetches a fresh blockhash.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn latest_blockhash(&self) -> GatewayResult<BlockhashContext>;

    /// Submits a signed wire transaction and returns its signature.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the node rejects the transaction.
    async fn send_transaction(&self, wire: &[u8]) -> GatewayResult<String>;

    /// Returns the status of a signature, `None` if not yet seen.
    ///
    /// Without `search_history` only the node's recent status cache is
    /// consulted.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn signature_status(
        &self,
        signature: &str,
        search_history: bool,
    ) -> GatewayResult<Option<SignatureStatus>>;

    /// Returns the current block height.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn block_height(&self) -> GatewayResult<u64>;

    /// Returns the fee in lamports for a base64 serialized message, `None`
    /// if its blockhash is no longer valid.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn fee_for_message(&self, message: &str) -> GatewayResult<Option<u64>>;

    /// Returns the current slot.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the RPC call fails.
    async fn slot(&self) -> GatewayResult<u64>;
}

/// A broadcast transaction before explorer normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    /// Hash or signature.
    pub hash: TxHash,
    /// Sender.
    pub from: String,
    /// Recipient or contract.
    pub to: String,
    /// Value moved, in base units.
    pub value: u128,
    /// Status after the bounded confirmation wait.
    pub status: TxStatus,
    /// Inclusion block or slot.
    pub block_number: Option<u64>,
    /// Extra context.
    pub note: Option<String>,
}

impl SubmittedTx {
    /// Marks the transaction as still pending after a timed-out wait.
    #[must_use]
    pub fn pending(mut self, note: impl Into<String>) -> Self {
        self.status = TxStatus::Pending;
        self.note = Some(note.into());
        self
    }
}

/// Converts a `U256` to `u128`.
///
/// # Errors
///
/// Returns `Decode` if the value does not fit.
pub fn u128_from_u256(value: U256) -> GatewayResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(GatewayError::decode(format!("value {value} exceeds u128")));
    }
    Ok(value.as_u128())
}
