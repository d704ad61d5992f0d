//! # Multicall Batcher
//!
//! Packs independent read-only calls into one Multicall3 `eth_call`.
//!
//! [`MulticallBatcher::multicall`] uses `aggregate`: one reverting call
//! reverts the whole aggregate and no slot is returned.
//! [`MulticallBatcher::try_multicall`] uses `tryAggregate(false, ..)`: a
//! reverting call only fails its own slot. In both modes each slot is
//! decoded on its own, so a malformed return value fails only that slot.
//!
//! The EVM binding is held for the whole round trip; a concurrent chain
//! switch waits until the results are decoded.

use crate::domain::chain::{ChainKey, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use crate::domain::operation::{BatchResult, ContractCall, OperationResult};
use crate::infrastructure::blockchain::evm::{EvmHandle, parse_address};
use crate::infrastructure::blockchain::multicall::{
    decode_aggregate, decode_try_aggregate, encode_aggregate, encode_try_aggregate,
};
use ethers::abi::Token;
use ethers::types::Address;
use std::sync::Arc;
use tracing::debug;

/// Multicall batching over the EVM handle.
#[derive(Debug, Clone)]
pub struct MulticallBatcher {
    evm: Arc<EvmHandle>,
}

impl MulticallBatcher {
    /// Creates a batcher over `evm`.
    #[must_use]
    pub fn new(evm: Arc<EvmHandle>) -> Self {
        Self { evm }
    }

    /// Executes `calls` through `aggregate`, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain`, `MulticallUnsupported`, `InvalidAddress` for
    /// a malformed target, or the aggregate call's failure.
    pub async fn multicall(
        &self,
        chain: &ChainKey,
        calls: &[ContractCall],
    ) -> GatewayResult<BatchResult<Vec<Token>>> {
        let Some(encoded) = self.prepare(chain, calls)? else {
            return Ok(BatchResult::empty());
        };

        let binding = self.evm.bind(chain, None).await?;
        let aggregator = binding
            .aggregator()
            .ok_or_else(|| GatewayError::MulticallUnsupported {
                chain: chain.clone(),
            })?;
        debug!(%chain, calls = calls.len(), "multicall aggregate");
        let raw = binding
            .call_raw(aggregator, encode_aggregate(&encoded))
            .await?;
        let slots = decode_aggregate(&raw)?;
        drop(binding);

        check_len(slots.len(), calls.len())?;
        Ok(BatchResult::new(
            calls
                .iter()
                .zip(slots)
                .map(|(call, data)| slot_result(chain, call, call.decode_output(&data)))
                .collect(),
        ))
    }

    /// Executes `calls` through `tryAggregate(false, ..)`, isolating
    /// reverts per slot.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain`, `MulticallUnsupported`, `InvalidAddress` for
    /// a malformed target, or the aggregate call's failure.
    pub async fn try_multicall(
        &self,
        chain: &ChainKey,
        calls: &[ContractCall],
    ) -> GatewayResult<BatchResult<Vec<Token>>> {
        let Some(encoded) = self.prepare(chain, calls)? else {
            return Ok(BatchResult::empty());
        };

        let binding = self.evm.bind(chain, None).await?;
        let aggregator = binding
            .aggregator()
            .ok_or_else(|| GatewayError::MulticallUnsupported {
                chain: chain.clone(),
            })?;
        debug!(%chain, calls = calls.len(), "multicall tryAggregate");
        let raw = binding
            .call_raw(aggregator, encode_try_aggregate(false, &encoded))
            .await?;
        let slots = decode_try_aggregate(&raw)?;
        drop(binding);

        check_len(slots.len(), calls.len())?;
        Ok(BatchResult::new(
            calls
                .iter()
                .zip(slots)
                .map(|(call, (success, data))| {
                    let outcome = if success {
                        call.decode_output(&data)
                    } else {
                        Err(GatewayError::terminal(
                            TerminalReason::Reverted,
                            format!("{} reverted", call.function.name),
                        ))
                    };
                    slot_result(chain, call, outcome)
                })
                .collect(),
        ))
    }

    /// Validates the chain and encodes the calls; `None` for an empty list.
    fn prepare(
        &self,
        chain: &ChainKey,
        calls: &[ContractCall],
    ) -> GatewayResult<Option<Vec<(Address, Vec<u8>)>>> {
        let registry = self.evm.registry();
        let descriptor = registry.resolve(chain)?;
        if descriptor.family() != ProtocolFamily::Evm || registry.aggregator_for(descriptor).is_none()
        {
            return Err(GatewayError::MulticallUnsupported {
                chain: chain.clone(),
            });
        }
        if calls.is_empty() {
            return Ok(None);
        }
        calls
            .iter()
            .map(|call| Ok((parse_address(&call.target)?, call.encode()?)))
            .collect::<GatewayResult<Vec<_>>>()
            .map(Some)
    }
}

fn check_len(got: usize, expected: usize) -> GatewayResult<()> {
    if got != expected {
        return Err(GatewayError::decode(format!(
            "aggregate returned {got} slots for {expected} calls"
        )));
    }
    Ok(())
}

fn slot_result(
    chain: &ChainKey,
    call: &ContractCall,
    outcome: GatewayResult<Vec<Token>>,
) -> OperationResult<Vec<Token>> {
    OperationResult {
        target: call.target.clone(),
        chain: chain.clone(),
        outcome,
    }
}
