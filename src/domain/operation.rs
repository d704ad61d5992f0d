//! # Operations and Results
//!
//! Requests routed by the dispatcher and the result shapes returned to
//! callers.
//!
//! Amounts are always in base units (wei, lamports, token base units).
//! A [`BatchResult`] carries exactly one [`OperationResult`] per input, in
//! input order; per-item failures live inside the result instead of
//! aborting the batch.

use crate::domain::chain::ChainKey;
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use ethers::abi::{AbiParser, Function, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A contract function call: target address, parsed ABI fragment, arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    /// Contract address, as supplied by the caller.
    pub target: String,
    /// Parsed function fragment.
    pub function: Function,
    /// Positional arguments.
    pub args: Vec<Token>,
}

impl ContractCall {
    /// Creates a call from a pre-parsed function fragment.
    #[must_use]
    pub fn new(target: impl Into<String>, function: Function, args: Vec<Token>) -> Self {
        Self {
            target: target.into(),
            function,
            args,
        }
    }

    /// Parses a human-readable signature such as
    /// `function balanceOf(address) view returns (uint256)`.
    ///
    /// # Errors
    ///
    /// Returns `TerminalOperation(Unsupported)` if the signature does not parse.
    pub fn parse(
        target: impl Into<String>,
        signature: &str,
        args: Vec<Token>,
    ) -> GatewayResult<Self> {
        let function = AbiParser::default()
            .parse_function(signature)
            .map_err(|e| {
                GatewayError::terminal(
                    TerminalReason::Unsupported,
                    format!("invalid function signature '{signature}': {e}"),
                )
            })?;
        Ok(Self::new(target, function, args))
    }

    /// Encodes selector plus arguments.
    ///
    /// # Errors
    ///
    /// Returns `TerminalOperation(Rejected)` if the arguments do not match
    /// the function inputs.
    pub fn encode(&self) -> GatewayResult<Vec<u8>> {
        self.function.encode_input(&self.args).map_err(|e| {
            GatewayError::terminal(
                TerminalReason::Rejected,
                format!("cannot encode {}: {e}", self.function.name),
            )
        })
    }

    /// Decodes return data against the function outputs.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the data does not match the outputs.
    pub fn decode_output(&self, data: &[u8]) -> GatewayResult<Vec<Token>> {
        self.function
            .decode_output(data)
            .map_err(|e| GatewayError::decode(format!("{}: {e}", self.function.name)))
    }
}

/// What to do on the target chain.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Send native currency.
    NativeTransfer {
        /// Recipient address.
        to: String,
        /// Amount in base units.
        amount: u128,
    },
    /// Send a fungible token.
    TokenTransfer {
        /// Token contract (EVM) or mint (alternate chain).
        token: String,
        /// Recipient address (owner, not token account).
        to: String,
        /// Amount in token base units.
        amount: u128,
    },
    /// Read a native balance.
    NativeBalance {
        /// Account to query.
        address: String,
    },
    /// Read a token balance.
    TokenBalance {
        /// Token contract or mint.
        token: String,
        /// Owner to query.
        address: String,
    },
    /// Read-only contract call.
    ContractRead {
        /// Call to execute.
        call: ContractCall,
    },
    /// State-changing contract call.
    ContractWrite {
        /// Call to execute.
        call: ContractCall,
        /// Native value attached, in base units.
        value: u128,
    },
    /// Let `spender` move up to `amount` of the signer's tokens.
    TokenApproval {
        /// Token contract.
        token: String,
        /// Address being approved.
        spender: String,
        /// Allowance in token base units.
        amount: u128,
    },
    /// Read how much `spender` may move on behalf of `owner`.
    TokenAllowance {
        /// Token contract.
        token: String,
        /// Token holder.
        owner: String,
        /// Approved address.
        spender: String,
    },
    /// Read token name, symbol and decimals.
    TokenMetadata {
        /// Token contract or mint.
        token: String,
    },
    /// Look up a previously submitted transaction.
    TransactionStatus {
        /// Transaction hash or signature.
        hash: String,
    },
}

impl OperationKind {
    /// Returns true if the operation submits a transaction.
    #[must_use]
    pub fn is_state_changing(&self) -> bool {
        matches!(
            self,
            Self::NativeTransfer { .. }
                | Self::TokenTransfer { .. }
                | Self::ContractWrite { .. }
                | Self::TokenApproval { .. }
        )
    }

    /// Returns the identifier reported as the result's target.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::NativeTransfer { to, .. } | Self::TokenTransfer { to, .. } => to,
            Self::NativeBalance { address } | Self::TokenBalance { address, .. } => address,
            Self::ContractRead { call } | Self::ContractWrite { call, .. } => &call.target,
            Self::TokenApproval { spender, .. } | Self::TokenAllowance { spender, .. } => spender,
            Self::TokenMetadata { token } => token,
            Self::TransactionStatus { hash } => hash,
        }
    }

    /// Returns a short operation name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NativeTransfer { .. } => "native_transfer",
            Self::TokenTransfer { .. } => "token_transfer",
            Self::NativeBalance { .. } => "native_balance",
            Self::TokenBalance { .. } => "token_balance",
            Self::ContractRead { .. } => "contract_read",
            Self::ContractWrite { .. } => "contract_write",
            Self::TokenApproval { .. } => "token_approval",
            Self::TokenAllowance { .. } => "token_allowance",
            Self::TokenMetadata { .. } => "token_metadata",
            Self::TransactionStatus { .. } => "transaction_status",
        }
    }
}

/// One routed request.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// Target chain.
    pub chain: ChainKey,
    /// Operation and parameters.
    pub kind: OperationKind,
    /// Endpoint override for this request only.
    pub rpc_override: Option<String>,
}

impl OperationRequest {
    /// Creates a request without an endpoint override.
    #[must_use]
    pub fn new(chain: impl Into<ChainKey>, kind: OperationKind) -> Self {
        Self {
            chain: chain.into(),
            kind,
            rpc_override: None,
        }
    }

    /// Native transfer request.
    #[must_use]
    pub fn native_transfer(chain: impl Into<ChainKey>, to: impl Into<String>, amount: u128) -> Self {
        Self::new(
            chain,
            OperationKind::NativeTransfer {
                to: to.into(),
                amount,
            },
        )
    }

    /// Token transfer request.
    #[must_use]
    pub fn token_transfer(
        chain: impl Into<ChainKey>,
        token: impl Into<String>,
        to: impl Into<String>,
        amount: u128,
    ) -> Self {
        Self::new(
            chain,
            OperationKind::TokenTransfer {
                token: token.into(),
                to: to.into(),
                amount,
            },
        )
    }

    /// Native balance request.
    #[must_use]
    pub fn native_balance(chain: impl Into<ChainKey>, address: impl Into<String>) -> Self {
        Self::new(
            chain,
            OperationKind::NativeBalance {
                address: address.into(),
            },
        )
    }

    /// Token balance request.
    #[must_use]
    pub fn token_balance(
        chain: impl Into<ChainKey>,
        token: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self::new(
            chain,
            OperationKind::TokenBalance {
                token: token.into(),
                address: address.into(),
            },
        )
    }

    /// Contract read request.
    #[must_use]
    pub fn contract_read(chain: impl Into<ChainKey>, call: ContractCall) -> Self {
        Self::new(chain, OperationKind::ContractRead { call })
    }

    /// Contract write request.
    #[must_use]
    pub fn contract_write(chain: impl Into<ChainKey>, call: ContractCall, value: u128) -> Self {
        Self::new(chain, OperationKind::ContractWrite { call, value })
    }

    /// Token approval request.
    #[must_use]
    pub fn token_approval(
        chain: impl Into<ChainKey>,
        token: impl Into<String>,
        spender: impl Into<String>,
        amount: u128,
    ) -> Self {
        Self::new(
            chain,
            OperationKind::TokenApproval {
                token: token.into(),
                spender: spender.into(),
                amount,
            },
        )
    }

    /// Allowance read request.
    #[must_use]
    pub fn token_allowance(
        chain: impl Into<ChainKey>,
        token: impl Into<String>,
        owner: impl Into<String>,
        spender: impl Into<String>,
    ) -> Self {
        Self::new(
            chain,
            OperationKind::TokenAllowance {
                token: token.into(),
                owner: owner.into(),
                spender: spender.into(),
            },
        )
    }

    /// Token metadata request.
    #[must_use]
    pub fn token_metadata(chain: impl Into<ChainKey>, token: impl Into<String>) -> Self {
        Self::new(
            chain,
            OperationKind::TokenMetadata {
                token: token.into(),
            },
        )
    }

    /// Transaction lookup request.
    #[must_use]
    pub fn transaction_status(chain: impl Into<ChainKey>, hash: impl Into<String>) -> Self {
        Self::new(chain, OperationKind::TransactionStatus { hash: hash.into() })
    }

    /// Sets a per-request endpoint override.
    #[must_use]
    pub fn with_rpc_override(mut self, url: impl Into<String>) -> Self {
        self.rpc_override = Some(url.into());
        self
    }
}

/// Transaction status after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Broadcast but not confirmed within the wait window.
    Pending,
    /// Included and successful.
    Confirmed,
    /// Included and failed on chain.
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Normalized description of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    /// Transaction hash or signature.
    pub hash: String,
    /// Sender.
    pub from: String,
    /// Recipient or contract.
    pub to: String,
    /// Value moved, in base units.
    pub value: u128,
    /// Chain the transaction was sent on.
    pub chain: ChainKey,
    /// Explorer link.
    pub explorer_url: String,
    /// Status when the summary was built.
    pub status: TxStatus,
    /// Inclusion block or slot, if known.
    pub block_number: Option<u64>,
    /// Extra context, e.g. why the status is still pending.
    pub note: Option<String>,
}

/// Balance in base units with its display precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Amount in base units.
    pub raw: u128,
    /// Decimal places of the unit.
    pub decimals: u8,
    /// Currency or token symbol, empty when unknown.
    pub symbol: String,
}

impl Balance {
    /// Creates a balance.
    #[must_use]
    pub fn new(raw: u128, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            raw,
            decimals,
            symbol: symbol.into(),
        }
    }

    /// Returns the human amount, or `None` if it exceeds `Decimal` range.
    #[must_use]
    pub fn to_decimal(&self) -> Option<Decimal> {
        let mantissa = i128::try_from(self.raw).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, u32::from(self.decimals))
            .ok()
            .map(|d| d.normalize())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(amount) => write!(f, "{amount} {}", self.symbol),
            None => write!(f, "{} base units {}", self.raw, self.symbol),
        }
    }
}

/// Token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token contract or mint.
    pub address: String,
    /// Name, empty when the token does not expose one.
    pub name: String,
    /// Symbol, empty when the token does not expose one.
    pub symbol: String,
    /// Decimal places.
    pub decimals: u8,
}

/// Estimated cost of a transaction in native currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    /// Gas limit, EVM only.
    pub gas_limit: Option<u128>,
    /// Price per gas unit in wei, EVM only.
    pub gas_price: Option<u128>,
    /// Total fee.
    pub fee: Balance,
}

/// Where a looked-up transaction stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLookup {
    /// Transaction hash or signature.
    pub hash: String,
    /// Current status.
    pub status: TxStatus,
    /// Inclusion block or slot, if included.
    pub block_number: Option<u64>,
    /// Extra context, e.g. the on-chain error or the reached commitment.
    pub note: Option<String>,
}

/// Payload of a successful dispatched operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// A submitted transaction.
    Transaction(TxSummary),
    /// A balance read.
    Balance(Balance),
    /// Decoded contract call output.
    Call(Vec<Token>),
    /// Token metadata.
    Token(TokenInfo),
    /// Transaction lookup.
    Lookup(TxLookup),
}

impl OperationOutput {
    /// Returns the transaction summary, if any.
    #[must_use]
    pub fn as_transaction(&self) -> Option<&TxSummary> {
        match self {
            Self::Transaction(tx) => Some(tx),
            _ => None,
        }
    }

    /// Returns the balance, if any.
    #[must_use]
    pub fn as_balance(&self) -> Option<&Balance> {
        match self {
            Self::Balance(b) => Some(b),
            _ => None,
        }
    }
}

/// Outcome for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult<T> {
    /// Address, recipient or contract the operation was aimed at.
    pub target: String,
    /// Chain the operation ran on.
    pub chain: ChainKey,
    /// Payload or classified failure.
    pub outcome: Result<T, GatewayError>,
}

impl<T> OperationResult<T> {
    /// Creates a successful result.
    #[must_use]
    pub fn success(target: impl Into<String>, chain: ChainKey, value: T) -> Self {
        Self {
            target: target.into(),
            chain,
            outcome: Ok(value),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(target: impl Into<String>, chain: ChainKey, error: GatewayError) -> Self {
        Self {
            target: target.into(),
            chain,
            outcome: Err(error),
        }
    }

    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the payload on success.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// Returns the error on failure.
    #[must_use]
    pub fn error(&self) -> Option<&GatewayError> {
        self.outcome.as_ref().err()
    }

    /// Maps the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            target: self.target,
            chain: self.chain,
            outcome: self.outcome.map(f),
        }
    }
}

/// Ordered per-target results of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T>(Vec<OperationResult<T>>);

impl<T> BatchResult<T> {
    /// Wraps ordered results.
    #[must_use]
    pub fn new(results: Vec<OperationResult<T>>) -> Self {
        Self(results)
    }

    /// Creates an empty batch result.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates results in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, OperationResult<T>> {
        self.0.iter()
    }

    /// Returns the result at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&OperationResult<T>> {
        self.0.get(index)
    }

    /// Number of successful items.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.0.iter().filter(|r| r.is_success()).count()
    }

    /// Iterates successful items.
    pub fn successes(&self) -> impl Iterator<Item = &OperationResult<T>> {
        self.0.iter().filter(|r| r.is_success())
    }

    /// Iterates failed items.
    pub fn failures(&self) -> impl Iterator<Item = &OperationResult<T>> {
        self.0.iter().filter(|r| !r.is_success())
    }

    /// Unwraps into the underlying vector.
    #[must_use]
    pub fn into_inner(self) -> Vec<OperationResult<T>> {
        self.0
    }
}

impl<T> IntoIterator for BatchResult<T> {
    type Item = OperationResult<T>;
    type IntoIter = std::vec::IntoIter<OperationResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a BatchResult<T> {
    type Item = &'a OperationResult<T>;
    type IntoIter = std::slice::Iter<'a, OperationResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One entry of an all-chains balance sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBalance {
    /// Chain queried.
    pub chain: ChainKey,
    /// Address queried.
    pub address: String,
    /// Native balance.
    pub balance: Balance,
}
