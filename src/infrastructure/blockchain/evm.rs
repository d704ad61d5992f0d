//! # EVM Handle
//!
//! Chain-switchable client handle for the EVM family.
//!
//! The handle owns exactly one [`EvmBinding`] at a time: the connection,
//! the chain descriptor with its resolved endpoint, and the chain's
//! multicall aggregator. A switch builds the complete replacement binding
//! first and installs it with one assignment under the write lock, so no
//! reader ever observes a connection from one chain paired with another
//! chain's aggregator.
//!
//! Chain-scoped work runs under a read guard obtained from
//! [`EvmHandle::bind`]; reads on the already-bound chain proceed
//! concurrently, and a switch waits for in-flight guards to drop.

use super::client::{
    EvmConnection, EvmConnector, EvmTxRequest, SubmittedTx, TxHash, u128_from_u256,
};
use super::ethereum::verify_personal_signature;
use super::registry::ChainRegistry;
use crate::domain::chain::{ChainDescriptor, ChainKey, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use crate::domain::health::FamilyHealth;
use crate::domain::operation::{Balance, ContractCall, FeeEstimate, TokenInfo, TxLookup, TxStatus};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Default wait for a receipt after broadcast.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// The active chain of an [`EvmHandle`].
pub struct EvmBinding {
    chain: ChainDescriptor,
    endpoint: String,
    connection: Arc<dyn EvmConnection>,
    aggregator: Option<Address>,
    confirmation_timeout: Duration,
    confirmations: usize,
}

impl fmt::Debug for EvmBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmBinding")
            .field("chain", self.chain.key())
            .field("endpoint", &self.endpoint)
            .field("aggregator", &self.aggregator)
            .finish_non_exhaustive()
    }
}

impl EvmBinding {
    /// Bound chain.
    #[must_use]
    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Resolved endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Multicall aggregator of the bound chain.
    #[must_use]
    pub fn aggregator(&self) -> Option<Address> {
        self.aggregator
    }

    /// Signer address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.connection.address()
    }

    fn matches(&self, key: &ChainKey, endpoint: &str) -> bool {
        self.chain.key() == key && self.endpoint == endpoint
    }

    /// Native balance of `address`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified RPC error.
    pub async fn native_balance(&self, address: &str) -> GatewayResult<Balance> {
        let owner = parse_address(address)?;
        let wei = self.connection.native_balance(owner).await?;
        let currency = self.chain.native_currency();
        Ok(Balance::new(
            u128_from_u256(wei)?,
            currency.decimals,
            currency.symbol.clone(),
        ))
    }

    /// ERC-20 balance of `owner`, with the token's decimals and symbol.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, `Decode` for a non-conforming token, or a
    /// classified RPC error.
    pub async fn token_balance(&self, token: &str, owner: &str) -> GatewayResult<Balance> {
        let owner = parse_address(owner)?;
        let balance_of = ContractCall::parse(
            token,
            "function balanceOf(address) view returns (uint256)",
            vec![Token::Address(owner)],
        )?;
        let raw = match self.read_contract(&balance_of).await?.as_slice() {
            [Token::Uint(v)] => u128_from_u256(*v)?,
            other => return Err(GatewayError::decode(format!("balanceOf returned {other:?}"))),
        };
        let decimals = self.read_decimals(token).await?;
        let symbol = self.read_label(token, "symbol").await;
        Ok(Balance::new(raw, decimals, symbol))
    }

    /// ERC-20 name, symbol and decimals.
    ///
    /// Name and symbol are optional in ERC-20 and read as empty when absent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, `Decode` if `decimals()` is missing or out
    /// of range, or a classified RPC error.
    pub async fn token_info(&self, token: &str) -> GatewayResult<TokenInfo> {
        parse_address(token)?;
        let decimals = self.read_decimals(token).await?;
        let name = self.read_label(token, "name").await;
        let symbol = self.read_label(token, "symbol").await;
        Ok(TokenInfo {
            address: token.trim().to_string(),
            name,
            symbol,
            decimals,
        })
    }

    /// ERC-20 allowance of `spender` over `owner`'s tokens.
    ///
    /// Unlimited approvals above `u128::MAX` read as `u128::MAX`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, `Decode` for a non-conforming token, or a
    /// classified RPC error.
    pub async fn allowance(&self, token: &str, owner: &str, spender: &str) -> GatewayResult<Balance> {
        let owner = parse_address(owner)?;
        let spender = parse_address(spender)?;
        let call = ContractCall::parse(
            token,
            "function allowance(address,address) view returns (uint256)",
            vec![Token::Address(owner), Token::Address(spender)],
        )?;
        let raw = match self.read_contract(&call).await?.as_slice() {
            [Token::Uint(v)] if *v > U256::from(u128::MAX) => u128::MAX,
            [Token::Uint(v)] => v.as_u128(),
            other => return Err(GatewayError::decode(format!("allowance returned {other:?}"))),
        };
        let decimals = self.read_decimals(token).await?;
        let symbol = self.read_label(token, "symbol").await;
        Ok(Balance::new(raw, decimals, symbol))
    }

    async fn read_decimals(&self, token: &str) -> GatewayResult<u8> {
        let call = ContractCall::parse(token, "function decimals() view returns (uint8)", vec![])?;
        match self.read_contract(&call).await?.as_slice() {
            [Token::Uint(v)] if *v <= U256::from(u8::MAX) => Ok(v.low_u32() as u8),
            other => Err(GatewayError::decode(format!("decimals returned {other:?}"))),
        }
    }

    async fn read_label(&self, token: &str, function: &str) -> String {
        let signature = format!("function {function}() view returns (string)");
        let result = match ContractCall::parse(token, &signature, vec![]) {
            Ok(call) => self.read_contract(&call).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(tokens) => match tokens.as_slice() {
                [Token::String(s)] => s.clone(),
                _ => String::new(),
            },
            Err(e) => {
                debug!(token, function, error = %e, "token label unreadable");
                String::new()
            }
        }
    }

    /// Raw `eth_call`.
    ///
    /// # Errors
    ///
    /// Returns a classified RPC error.
    pub async fn call_raw(&self, to: Address, data: Vec<u8>) -> GatewayResult<Bytes> {
        self.connection.call(to, Bytes::from(data)).await
    }

    /// Read-only contract call, decoded against the function outputs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, an encoding rejection, `Decode`, or a
    /// classified RPC error.
    pub async fn read_contract(&self, call: &ContractCall) -> GatewayResult<Vec<Token>> {
        let target = parse_address(&call.target)?;
        let data = call.encode()?;
        let output = self.call_raw(target, data).await?;
        call.decode_output(&output)
    }

    /// Sends native currency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified broadcast error.
    pub async fn transfer_native(&self, to: &str, amount: u128) -> GatewayResult<SubmittedTx> {
        let recipient = parse_address(to)?;
        let tx = EvmTxRequest {
            to: recipient,
            value: U256::from(amount),
            data: Bytes::new(),
        };
        self.submit(tx, to, amount).await
    }

    /// Sends ERC-20 tokens with `transfer(address,uint256)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified broadcast error.
    pub async fn transfer_token(
        &self,
        token: &str,
        to: &str,
        amount: u128,
    ) -> GatewayResult<SubmittedTx> {
        let recipient = parse_address(to)?;
        let call = ContractCall::parse(
            token,
            "function transfer(address,uint256) returns (bool)",
            vec![Token::Address(recipient), Token::Uint(U256::from(amount))],
        )?;
        let mut summary = self.write_contract(&call, 0).await?;
        summary.to = to.to_string();
        summary.value = amount;
        Ok(summary)
    }

    /// Approves `spender` to move up to `amount` of the signer's tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified broadcast error.
    pub async fn approve_token(
        &self,
        token: &str,
        spender: &str,
        amount: u128,
    ) -> GatewayResult<SubmittedTx> {
        let spender = parse_address(spender)?;
        let call = ContractCall::parse(
            token,
            "function approve(address,uint256) returns (bool)",
            vec![Token::Address(spender), Token::Uint(U256::from(amount))],
        )?;
        self.write_contract(&call, 0).await
    }

    /// State-changing contract call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, an encoding rejection, or a classified
    /// broadcast error.
    pub async fn write_contract(&self, call: &ContractCall, value: u128) -> GatewayResult<SubmittedTx> {
        let target = parse_address(&call.target)?;
        let tx = EvmTxRequest {
            to: target,
            value: U256::from(value),
            data: Bytes::from(call.encode()?),
        };
        self.submit(tx, &call.target, value).await
    }

    /// Looks up a transaction by hash; `None` if the node does not know it.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` for a malformed hash or a classified RPC error.
    pub async fn transaction_status(&self, hash: &str) -> GatewayResult<Option<TxLookup>> {
        let hash = parse_tx_hash(hash)?;
        if let Some(receipt) = self.connection.transaction_receipt(&hash).await? {
            let status = if receipt.success {
                TxStatus::Confirmed
            } else {
                TxStatus::Failed
            };
            return Ok(Some(TxLookup {
                hash: hash.0,
                status,
                block_number: receipt.block_number,
                note: None,
            }));
        }
        if self.connection.transaction_known(&hash).await? {
            return Ok(Some(TxLookup {
                hash: hash.0,
                status: TxStatus::Pending,
                block_number: None,
                note: Some("not mined yet".into()),
            }));
        }
        Ok(None)
    }

    /// Estimated fee of a native transfer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified RPC error.
    pub async fn estimate_transfer_fee(&self, to: &str, amount: u128) -> GatewayResult<FeeEstimate> {
        let tx = EvmTxRequest {
            to: parse_address(to)?,
            value: U256::from(amount),
            data: Bytes::new(),
        };
        self.estimate_fee(&tx).await
    }

    /// Estimated fee of a state-changing contract call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, an encoding rejection, `Reverted` if the
    /// call would fail, or a classified RPC error.
    pub async fn estimate_contract_fee(
        &self,
        call: &ContractCall,
        value: u128,
    ) -> GatewayResult<FeeEstimate> {
        let tx = EvmTxRequest {
            to: parse_address(&call.target)?,
            value: U256::from(value),
            data: Bytes::from(call.encode()?),
        };
        self.estimate_fee(&tx).await
    }

    async fn estimate_fee(&self, tx: &EvmTxRequest) -> GatewayResult<FeeEstimate> {
        let (gas_limit, gas_price) =
            tokio::try_join!(self.connection.estimate_gas(tx), self.connection.gas_price())?;
        let fee = gas_limit
            .checked_mul(gas_price)
            .ok_or_else(|| GatewayError::decode("fee overflow"))?;
        let currency = self.chain.native_currency();
        Ok(FeeEstimate {
            gas_limit: Some(u128_from_u256(gas_limit)?),
            gas_price: Some(u128_from_u256(gas_price)?),
            fee: Balance::new(u128_from_u256(fee)?, currency.decimals, currency.symbol.clone()),
        })
    }

    /// Signs `message` as an EIP-191 personal message; returns `0x` hex.
    ///
    /// # Errors
    ///
    /// Returns `Authorization` if the signer fails.
    pub async fn sign_message(&self, message: &[u8]) -> GatewayResult<String> {
        let signature = self.connection.sign_message(message).await?;
        Ok(format!("0x{signature}"))
    }

    async fn submit(&self, tx: EvmTxRequest, to: &str, value: u128) -> GatewayResult<SubmittedTx> {
        let hash = self.connection.broadcast(tx).await?;
        debug!(chain = %self.chain.key(), %hash, "transaction broadcast");

        let submitted = SubmittedTx {
            hash: hash.clone(),
            from: format!("{:?}", self.address()),
            to: to.to_string(),
            value,
            status: TxStatus::Pending,
            block_number: None,
            note: None,
        };

        // Errors after broadcast never propagate: the transaction may still land.
        match timeout(
            self.confirmation_timeout,
            self.connection.wait_for_receipt(&hash, self.confirmations),
        )
        .await
        {
            Ok(Ok(receipt)) => Ok(SubmittedTx {
                status: if receipt.success {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Failed
                },
                block_number: receipt.block_number,
                ..submitted
            }),
            Ok(Err(e)) => {
                warn!(chain = %self.chain.key(), %hash, error = %e, "receipt unavailable");
                Ok(submitted.pending(format!("receipt unavailable: {e}")))
            }
            Err(_) => Ok(submitted.pending(format!(
                "not confirmed within {}s",
                self.confirmation_timeout.as_secs()
            ))),
        }
    }
}

/// Parses an EVM address.
///
/// # Errors
///
/// Returns `TerminalOperation(InvalidAddress)`.
pub fn parse_address(address: &str) -> GatewayResult<Address> {
    let trimmed = address.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(GatewayError::invalid_address(address));
    }
    trimmed
        .parse()
        .map_err(|_| GatewayError::invalid_address(address))
}

/// Checks an EIP-191 personal-message signature by `address`.
///
/// # Errors
///
/// Returns `InvalidAddress` or `Decode` for a malformed signature.
pub fn verify_message(address: &str, message: &[u8], signature: &str) -> GatewayResult<bool> {
    verify_personal_signature(parse_address(address)?, message, signature)
}

fn parse_tx_hash(hash: &str) -> GatewayResult<TxHash> {
    let trimmed = hash.trim();
    let valid = trimmed.len() == 66
        && trimmed.starts_with("0x")
        && trimmed.bytes().skip(2).all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(GatewayError::terminal(
            TerminalReason::Rejected,
            format!("invalid transaction hash: {hash}"),
        ));
    }
    Ok(TxHash::new(trimmed))
}

/// Chain-switchable EVM client handle.
pub struct EvmHandle {
    registry: Arc<ChainRegistry>,
    connector: Arc<dyn EvmConnector>,
    binding: RwLock<EvmBinding>,
    address: Address,
    confirmation_timeout: Duration,
    confirmations: usize,
}

impl fmt::Debug for EvmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl EvmHandle {
    /// Binds signing material (via `connector`) to `initial_chain`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain`, `Unsupported` for a non-EVM chain, or the
    /// connector's error.
    pub fn configure(
        registry: Arc<ChainRegistry>,
        connector: Arc<dyn EvmConnector>,
        initial_chain: &ChainKey,
        rpc_override: Option<&str>,
    ) -> GatewayResult<Self> {
        let binding = build_binding(
            &registry,
            connector.as_ref(),
            initial_chain,
            rpc_override,
            DEFAULT_CONFIRMATION_TIMEOUT,
            1,
        )?;
        let address = binding.address();
        info!(
            chain = %initial_chain,
            endpoint = binding.endpoint(),
            address = ?address,
            "EVM handle configured"
        );
        Ok(Self {
            registry,
            connector,
            binding: RwLock::new(binding),
            address,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            confirmations: 1,
        })
    }

    /// Sets the receipt wait bound.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self.binding.get_mut().confirmation_timeout = timeout;
        self
    }

    /// Sets the number of confirmations to wait for.
    #[must_use]
    pub fn with_confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations;
        self.binding.get_mut().confirmations = confirmations;
        self
    }

    /// Signer address; identical on every chain.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Registry the handle resolves chains against.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// Key of the currently bound chain.
    pub async fn current_chain(&self) -> ChainKey {
        self.binding.read().await.chain.key().clone()
    }

    /// Read guard over the current binding, whatever chain it is.
    pub async fn current(&self) -> RwLockReadGuard<'_, EvmBinding> {
        self.binding.read().await
    }

    /// Rebinds the handle to `key`.
    ///
    /// The replacement binding is fully built before the write lock is
    /// taken; on error the current binding is untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain`, `Unsupported` for a non-EVM chain, or the
    /// connector's error.
    pub async fn switch_chain(&self, key: &ChainKey, rpc_override: Option<&str>) -> GatewayResult<()> {
        let next = self.build(key, rpc_override)?;
        let mut guard = self.binding.write().await;
        debug!(from = %guard.chain.key(), to = %key, endpoint = next.endpoint(), "switching chain");
        *guard = next;
        Ok(())
    }

    /// Returns a read guard over a binding for exactly `key` and its
    /// resolved endpoint, switching first if needed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain`, `Unsupported` for a non-EVM chain, or the
    /// connector's error.
    pub async fn bind(
        &self,
        key: &ChainKey,
        rpc_override: Option<&str>,
    ) -> GatewayResult<RwLockReadGuard<'_, EvmBinding>> {
        let endpoint = self.registry.endpoint_for(key, rpc_override)?;
        {
            let guard = self.binding.read().await;
            if guard.matches(key, &endpoint) {
                return Ok(guard);
            }
        }

        let next = self.build(key, Some(&endpoint))?;
        let mut guard = self.binding.write().await;
        if !guard.matches(key, &endpoint) {
            debug!(from = %guard.chain.key(), to = %key, %endpoint, "switching chain");
            *guard = next;
        }
        Ok(guard.downgrade())
    }

    /// Signs `message` with the handle's key; the signature is the same on
    /// every chain.
    ///
    /// # Errors
    ///
    /// Returns `Authorization` if the signer fails.
    pub async fn sign_message(&self, message: &[u8]) -> GatewayResult<String> {
        self.binding.read().await.sign_message(message).await
    }

    /// Probes the bound chain with `eth_blockNumber`.
    pub async fn health_check(&self) -> FamilyHealth {
        let binding = self.binding.read().await;
        let started = Instant::now();
        let key = binding.chain.key().clone();
        match binding.connection.block_number().await {
            Ok(block) => FamilyHealth::up(key, started.elapsed(), block),
            Err(e) => FamilyHealth::down(key, started.elapsed(), e.to_string()),
        }
    }

    fn build(&self, key: &ChainKey, rpc_override: Option<&str>) -> GatewayResult<EvmBinding> {
        build_binding(
            &self.registry,
            self.connector.as_ref(),
            key,
            rpc_override,
            self.confirmation_timeout,
            self.confirmations,
        )
    }
}

fn build_binding(
    registry: &ChainRegistry,
    connector: &dyn EvmConnector,
    key: &ChainKey,
    rpc_override: Option<&str>,
    confirmation_timeout: Duration,
    confirmations: usize,
) -> GatewayResult<EvmBinding> {
    let chain = registry.resolve(key)?;
    if chain.family() != ProtocolFamily::Evm {
        return Err(GatewayError::terminal(
            TerminalReason::Unsupported,
            format!("{key} is not an EVM chain"),
        ));
    }
    let endpoint = registry.endpoint_for(key, rpc_override)?;
    let connection = connector.connect(chain, &endpoint)?;
    Ok(EvmBinding {
        chain: chain.clone(),
        endpoint,
        connection,
        aggregator: registry.aggregator_for(chain),
        confirmation_timeout,
        confirmations,
    })
}
