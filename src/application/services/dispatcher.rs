//! # Dispatcher
//!
//! Routes one [`OperationRequest`] to the handle of its chain's protocol
//! family.
//!
//! Preconditions (unknown chain, missing handle) are raised; everything
//! that fails once the request reached a handle is captured into the
//! returned [`OperationResult`]. State-changing operations run under the
//! retry wrapper, reads run once.

use crate::application::services::retry::{RetryPolicy, execute_with_retry};
use crate::domain::chain::{ChainDescriptor, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use crate::domain::operation::{
    OperationKind, OperationOutput, OperationRequest, OperationResult, TxLookup, TxSummary,
};
use crate::infrastructure::blockchain::alt::AltHandle;
use crate::infrastructure::blockchain::client::SubmittedTx;
use crate::infrastructure::blockchain::evm::{EvmBinding, EvmHandle};
use crate::infrastructure::blockchain::registry::ChainRegistry;
use std::sync::Arc;
use tracing::debug;

/// Routes requests to the configured family handles.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ChainRegistry>,
    evm: Option<Arc<EvmHandle>>,
    alt: Option<Arc<AltHandle>>,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Creates a dispatcher over the given handles.
    #[must_use]
    pub fn new(
        registry: Arc<ChainRegistry>,
        evm: Option<Arc<EvmHandle>>,
        alt: Option<Arc<AltHandle>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            evm,
            alt,
            retry,
        }
    }

    /// Chain registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    /// EVM handle, if configured.
    #[must_use]
    pub fn evm(&self) -> Option<&Arc<EvmHandle>> {
        self.evm.as_ref()
    }

    /// Alternate-chain handle, if configured.
    #[must_use]
    pub fn alt(&self) -> Option<&Arc<AltHandle>> {
        self.alt.as_ref()
    }

    /// Retry policy for state-changing operations.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Checks that `request` can be routed, without any I/O.
    ///
    /// An alternate-family request must target the network the alternate
    /// handle is bound to.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain` or `BackendNotConfigured`.
    pub fn preflight(&self, request: &OperationRequest) -> GatewayResult<ProtocolFamily> {
        let chain = self.registry.resolve(&request.chain)?;
        let family = chain.family();
        let configured = match family {
            ProtocolFamily::Evm => self.evm.is_some(),
            ProtocolFamily::Alt => self
                .alt
                .as_ref()
                .is_some_and(|alt| alt.chain_key() == chain.key()),
        };
        if !configured {
            return Err(GatewayError::BackendNotConfigured {
                family,
                chain: chain.key().clone(),
            });
        }
        Ok(family)
    }

    /// Executes one request.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain` or `BackendNotConfigured`. Failures after
    /// routing are reported inside the result.
    pub async fn execute(
        &self,
        request: OperationRequest,
    ) -> GatewayResult<OperationResult<OperationOutput>> {
        let family = self.preflight(&request)?;
        let chain = self.registry.resolve(&request.chain)?;
        debug!(
            chain = %request.chain,
            operation = request.kind.name(),
            target = request.kind.target(),
            "dispatching"
        );

        let outcome = match family {
            ProtocolFamily::Evm => self.run_evm(&request, chain).await,
            ProtocolFamily::Alt => self.run_alt(&request, chain).await,
        };
        if let Err(e) = &outcome {
            debug!(chain = %request.chain, target = request.kind.target(), error = %e, "operation failed");
        }

        Ok(OperationResult {
            target: request.kind.target().to_string(),
            chain: request.chain,
            outcome,
        })
    }

    async fn run_evm(
        &self,
        request: &OperationRequest,
        chain: &ChainDescriptor,
    ) -> GatewayResult<OperationOutput> {
        let handle = self.evm.as_ref().ok_or_else(|| GatewayError::BackendNotConfigured {
            family: ProtocolFamily::Evm,
            chain: request.chain.clone(),
        })?;
        let guard = handle
            .bind(&request.chain, request.rpc_override.as_deref())
            .await?;
        let binding: &EvmBinding = &guard;

        let submitted = match &request.kind {
            OperationKind::NativeBalance { address } => {
                return binding.native_balance(address).await.map(OperationOutput::Balance);
            }
            OperationKind::TokenBalance { token, address } => {
                return binding
                    .token_balance(token, address)
                    .await
                    .map(OperationOutput::Balance);
            }
            OperationKind::ContractRead { call } => {
                return binding.read_contract(call).await.map(OperationOutput::Call);
            }
            OperationKind::NativeTransfer { to, amount } => {
                execute_with_retry(&self.retry, || binding.transfer_native(to, *amount)).await?
            }
            OperationKind::TokenTransfer { token, to, amount } => {
                execute_with_retry(&self.retry, || binding.transfer_token(token, to, *amount))
                    .await?
            }
            OperationKind::ContractWrite { call, value } => {
                execute_with_retry(&self.retry, || binding.write_contract(call, *value)).await?
            }
            OperationKind::TokenApproval {
                token,
                spender,
                amount,
            } => {
                execute_with_retry(&self.retry, || binding.approve_token(token, spender, *amount))
                    .await?
            }
            OperationKind::TokenAllowance {
                token,
                owner,
                spender,
            } => {
                return binding
                    .allowance(token, owner, spender)
                    .await
                    .map(OperationOutput::Balance);
            }
            OperationKind::TokenMetadata { token } => {
                return binding.token_info(token).await.map(OperationOutput::Token);
            }
            OperationKind::TransactionStatus { hash } => {
                let lookup = binding.transaction_status(hash).await?;
                return found(lookup, hash, chain).map(OperationOutput::Lookup);
            }
        };
        Ok(OperationOutput::Transaction(summarize(chain, submitted)))
    }

    async fn run_alt(
        &self,
        request: &OperationRequest,
        chain: &ChainDescriptor,
    ) -> GatewayResult<OperationOutput> {
        let handle = self.alt.as_ref().ok_or_else(|| GatewayError::BackendNotConfigured {
            family: ProtocolFamily::Alt,
            chain: request.chain.clone(),
        })?;

        let submitted = match &request.kind {
            OperationKind::NativeBalance { address } => {
                return handle.native_balance(address).await.map(OperationOutput::Balance);
            }
            OperationKind::TokenBalance { token, address } => {
                return handle
                    .token_balance(token, address)
                    .await
                    .map(OperationOutput::Balance);
            }
            OperationKind::NativeTransfer { to, amount } => {
                execute_with_retry(&self.retry, || handle.transfer_native(to, *amount)).await?
            }
            OperationKind::TokenTransfer { token, to, amount } => {
                execute_with_retry(&self.retry, || handle.transfer_token(token, to, *amount))
                    .await?
            }
            OperationKind::TransactionStatus { hash } => {
                let lookup = handle.transaction_status(hash).await?;
                return found(lookup, hash, chain).map(OperationOutput::Lookup);
            }
            OperationKind::ContractRead { .. }
            | OperationKind::ContractWrite { .. }
            | OperationKind::TokenApproval { .. }
            | OperationKind::TokenAllowance { .. }
            | OperationKind::TokenMetadata { .. } => {
                return Err(GatewayError::terminal(
                    TerminalReason::Unsupported,
                    format!("{} is not available on {}", request.kind.name(), chain.key()),
                ));
            }
        };
        Ok(OperationOutput::Transaction(summarize(chain, submitted)))
    }
}

fn found(lookup: Option<TxLookup>, hash: &str, chain: &ChainDescriptor) -> GatewayResult<TxLookup> {
    lookup.ok_or_else(|| {
        GatewayError::terminal(
            TerminalReason::Rejected,
            format!("transaction {hash} not found on {}", chain.key()),
        )
    })
}

fn summarize(chain: &ChainDescriptor, tx: SubmittedTx) -> TxSummary {
    TxSummary {
        explorer_url: chain.explorer_tx_url(tx.hash.as_str()),
        hash: tx.hash.0,
        from: tx.from,
        to: tx.to,
        value: tx.value,
        chain: chain.key().clone(),
        status: tx.status,
        block_number: tx.block_number,
        note: tx.note,
    }
}
