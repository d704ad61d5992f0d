//! # Batch Engine
//!
//! Applies one operation to many targets, or one query to many chains.
//!
//! Every request of a batch is preflighted before any network call, so an
//! unknown chain or a missing handle fails the whole batch up front. After
//! that, every item is attempted and its failure recorded in place: the
//! result has exactly one entry per request, in input order.
//!
//! # Concurrency
//!
//! Read-only batches that stay on one EVM chain and endpoint, and any batch
//! that only touches the alternate chain, run with bounded parallelism
//! through `buffered`, which keeps input order. Batches that span several
//! EVM chains, and EVM transfers, run one request at a time.

use crate::application::services::dispatcher::Dispatcher;
use crate::domain::chain::{ChainKey, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::operation::{
    Balance, BatchResult, ChainBalance, OperationOutput, OperationRequest, OperationResult,
    TxSummary,
};
use crate::infrastructure::blockchain::evm::parse_address;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum in-flight requests for parallel-eligible batches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl BatchConfig {
    /// Creates a configuration with the given parallelism.
    #[must_use]
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

/// One recipient of a multi-recipient transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Recipient address.
    pub to: String,
    /// Amount in base units.
    pub amount: u128,
}

impl Transfer {
    /// Creates a transfer.
    #[must_use]
    pub fn new(to: impl Into<String>, amount: u128) -> Self {
        Self {
            to: to.into(),
            amount,
        }
    }
}

/// Fan-out over targets and chains.
#[derive(Debug, Clone)]
pub struct BatchEngine {
    dispatcher: Arc<Dispatcher>,
    config: BatchConfig,
}

impl BatchEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, config: BatchConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Creates a new engine with default configuration.
    #[must_use]
    pub fn with_defaults(dispatcher: Arc<Dispatcher>) -> Self {
        Self::new(dispatcher, BatchConfig::default())
    }

    /// Underlying dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Runs `requests`, returning one result per request in input order.
    ///
    /// # Errors
    ///
    /// Returns the first precondition failure (`UnknownChain`,
    /// `BackendNotConfigured`) found while preflighting; no request is
    /// executed in that case.
    pub async fn run_batch(
        &self,
        requests: Vec<OperationRequest>,
    ) -> GatewayResult<BatchResult<OperationOutput>> {
        let mut families = Vec::with_capacity(requests.len());
        for request in &requests {
            families.push(self.dispatcher.preflight(request)?);
        }
        if requests.is_empty() {
            return Ok(BatchResult::empty());
        }

        let parallel = parallel_eligible(&requests, &families);
        debug!(
            size = requests.len(),
            parallel,
            concurrency = self.config.concurrency,
            "running batch"
        );

        let results: Vec<_> = if parallel {
            stream::iter(requests)
                .map(|request| self.execute_item(request))
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.execute_item(request).await);
            }
            results
        };
        Ok(BatchResult::new(results))
    }

    /// Native balances of `addresses` on one chain.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `chain`.
    pub async fn native_balances<S: AsRef<str>>(
        &self,
        chain: &ChainKey,
        addresses: &[S],
    ) -> GatewayResult<BatchResult<Balance>> {
        let requests = addresses
            .iter()
            .map(|a| OperationRequest::native_balance(chain.clone(), a.as_ref()))
            .collect();
        Ok(narrow(self.run_batch(requests).await?, into_balance))
    }

    /// Token balances of `addresses` on one chain.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `chain`.
    pub async fn token_balances<S: AsRef<str>>(
        &self,
        chain: &ChainKey,
        token: &str,
        addresses: &[S],
    ) -> GatewayResult<BatchResult<Balance>> {
        let requests = addresses
            .iter()
            .map(|a| OperationRequest::token_balance(chain.clone(), token, a.as_ref()))
            .collect();
        Ok(narrow(self.run_batch(requests).await?, into_balance))
    }

    /// Sends native currency to each recipient.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `chain`.
    pub async fn transfer_native_many(
        &self,
        chain: &ChainKey,
        transfers: &[Transfer],
    ) -> GatewayResult<BatchResult<TxSummary>> {
        let requests = transfers
            .iter()
            .map(|t| OperationRequest::native_transfer(chain.clone(), &t.to, t.amount))
            .collect();
        Ok(narrow(self.run_batch(requests).await?, into_transaction))
    }

    /// Sends `token` to each recipient.
    ///
    /// # Errors
    ///
    /// Returns a precondition failure for `chain`.
    pub async fn transfer_token_many(
        &self,
        chain: &ChainKey,
        token: &str,
        transfers: &[Transfer],
    ) -> GatewayResult<BatchResult<TxSummary>> {
        let requests = transfers
            .iter()
            .map(|t| OperationRequest::token_transfer(chain.clone(), token, &t.to, t.amount))
            .collect();
        Ok(narrow(self.run_batch(requests).await?, into_transaction))
    }

    /// Native balance of one account on every registered chain.
    ///
    /// EVM chains are visited in registration order, one at a time. The
    /// alternate chain is queried once, for `alt_address` or the alternate
    /// handle's own address. Chains whose query fails are left out. A
    /// family without a configured handle is skipped.
    ///
    /// # Errors
    ///
    /// Returns `BackendNotConfigured` if neither family has a handle, or
    /// `InvalidAddress` if `evm_address` is malformed.
    pub async fn sweep_native_balances(
        &self,
        evm_address: &str,
        alt_address: Option<&str>,
    ) -> GatewayResult<Vec<ChainBalance>> {
        let registry = self.dispatcher.registry();
        let evm = self.dispatcher.evm();
        let alt = self.dispatcher.alt();
        if evm.is_none() && alt.is_none() {
            let chain = registry
                .evm_chains()
                .next()
                .map_or_else(|| ChainKey::new("EVM"), |c| c.key().clone());
            return Err(GatewayError::BackendNotConfigured {
                family: ProtocolFamily::Evm,
                chain,
            });
        }

        let mut balances = Vec::new();
        if evm.is_some() {
            parse_address(evm_address)?;
            for chain in registry.evm_chains() {
                let request = OperationRequest::native_balance(chain.key().clone(), evm_address);
                if let Some(entry) = self.sweep_one(request).await {
                    balances.push(entry);
                }
            }
        }

        if let Some(alt) = alt {
            let address = alt_address.map_or_else(|| alt.address(), str::to_string);
            let request = OperationRequest::native_balance(alt.chain_key().clone(), address);
            if let Some(entry) = self.sweep_one(request).await {
                balances.push(entry);
            }
        }
        Ok(balances)
    }

    async fn sweep_one(&self, request: OperationRequest) -> Option<ChainBalance> {
        let OperationResult {
            target,
            chain,
            outcome,
        } = self.execute_item(request).await;
        match outcome.and_then(into_balance) {
            Ok(balance) => Some(ChainBalance {
                chain,
                address: target,
                balance,
            }),
            Err(e) => {
                warn!(chain = %chain, address = %target, error = %e, "dropping chain from sweep");
                None
            }
        }
    }

    async fn execute_item(&self, request: OperationRequest) -> OperationResult<OperationOutput> {
        let target = request.kind.target().to_string();
        let chain = request.chain.clone();
        match self.dispatcher.execute(request).await {
            Ok(result) => result,
            Err(e) => OperationResult::failure(target, chain, e),
        }
    }
}

fn parallel_eligible(requests: &[OperationRequest], families: &[ProtocolFamily]) -> bool {
    if families.iter().all(|f| *f == ProtocolFamily::Alt) {
        return true;
    }
    let Some(first) = requests.first() else {
        return true;
    };
    families.iter().all(|f| *f == ProtocolFamily::Evm)
        && requests.iter().all(|r| {
            !r.kind.is_state_changing()
                && r.chain == first.chain
                && r.rpc_override == first.rpc_override
        })
}

fn into_balance(output: OperationOutput) -> GatewayResult<Balance> {
    match output {
        OperationOutput::Balance(balance) => Ok(balance),
        other => Err(GatewayError::decode(format!("expected a balance, got {other:?}"))),
    }
}

fn into_transaction(output: OperationOutput) -> GatewayResult<TxSummary> {
    match output {
        OperationOutput::Transaction(tx) => Ok(tx),
        other => Err(GatewayError::decode(format!("expected a transaction, got {other:?}"))),
    }
}

fn narrow<T>(
    batch: BatchResult<OperationOutput>,
    f: impl Fn(OperationOutput) -> GatewayResult<T>,
) -> BatchResult<T> {
    BatchResult::new(
        batch
            .into_iter()
            .map(|r| OperationResult {
                target: r.target,
                chain: r.chain,
                outcome: r.outcome.and_then(&f),
            })
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::retry::RetryPolicy;
    use crate::domain::error::TerminalReason;
    use crate::domain::operation::TxStatus;
    use crate::infrastructure::blockchain::solana::Pubkey;
    use crate::testing::{
        MockAltConnection, MockEvmConnector, addr, alt_handle, evm_handle, test_registry,
    };
    use proptest::prelude::*;
    use std::time::Duration;

    fn engine(
        connector: &Arc<MockEvmConnector>,
        alt: Option<Arc<MockAltConnection>>,
    ) -> BatchEngine {
        let registry = Arc::new(test_registry());
        let dispatcher = Dispatcher::new(
            registry.clone(),
            Some(evm_handle(connector.clone(), registry)),
            alt.map(alt_handle),
            RetryPolicy::new(2, 1, 5, 0.0),
        );
        BatchEngine::with_defaults(Arc::new(dispatcher))
    }

    fn hex(byte: u8) -> String {
        format!("{:?}", addr(byte))
    }

    #[tokio::test]
    async fn precondition_fails_whole_batch_before_io() {
        let connector = Arc::new(MockEvmConnector::new());
        let err = engine(&connector, None)
            .run_batch(vec![
                OperationRequest::native_balance("A", hex(1)),
                OperationRequest::native_balance("NOPE", hex(2)),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, GatewayError::unknown_chain("NOPE"));
        assert_eq!(connector.state.network_calls(), 0);
    }

    #[tokio::test]
    async fn transfer_batch_isolates_invalid_recipient() {
        let connector = Arc::new(MockEvmConnector::new());
        let transfers = [
            Transfer::new(hex(1), 10),
            Transfer::new("not-an-address", 10),
            Transfer::new(hex(2), 10),
        ];

        let batch = engine(&connector, None)
            .transfer_native_many(&ChainKey::new("A"), &transfers)
            .await
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.success_count(), 2);
        assert_eq!(
            batch.get(1).and_then(|r| r.error()).and_then(GatewayError::terminal_reason),
            Some(TerminalReason::InvalidAddress)
        );
        assert_eq!(batch.get(2).unwrap().target, hex(2));
        assert_eq!(connector.state.broadcasts().len(), 2);
    }

    #[tokio::test]
    async fn balances_keep_input_order() {
        let connector = Arc::new(MockEvmConnector::new());
        for i in 1..=6u8 {
            connector.state.set_balance(1, addr(i), u64::from(i) * 100);
        }
        let addresses: Vec<String> = (1..=6u8).rev().map(hex).collect();

        let batch = engine(&connector, None)
            .native_balances(&ChainKey::new("A"), &addresses)
            .await
            .unwrap();

        let raws: Vec<u128> = batch.iter().map(|r| r.value().unwrap().raw).collect();
        assert_eq!(raws, vec![600, 500, 400, 300, 200, 100]);
    }

    #[tokio::test]
    async fn alt_reads_run_concurrently() {
        let connector = Arc::new(MockEvmConnector::new());
        let conn = Arc::new(MockAltConnection::new());
        conn.set_balance_delay(Duration::from_millis(50));
        let addresses: Vec<String> = (1..=4u8).map(|i| Pubkey::new_from_array([i; 32]).to_string()).collect();

        let started = tokio::time::Instant::now();
        let batch = engine(&connector, Some(conn))
            .native_balances(&ChainKey::new("ALT"), &addresses)
            .await
            .unwrap();

        assert_eq!(batch.success_count(), 4);
        assert!(started.elapsed() < Duration::from_millis(180));
    }

    #[test]
    fn mixed_evm_chains_run_sequentially() {
        let requests = vec![
            OperationRequest::native_balance("A", hex(1)),
            OperationRequest::native_balance("B", hex(1)),
        ];
        let families = vec![ProtocolFamily::Evm; 2];
        assert!(!parallel_eligible(&requests, &families));

        let transfers = vec![
            OperationRequest::native_transfer("A", hex(1), 1),
            OperationRequest::native_transfer("A", hex(2), 1),
        ];
        assert!(!parallel_eligible(&transfers, &families));

        let reads = vec![
            OperationRequest::native_balance("A", hex(1)),
            OperationRequest::native_balance("A", hex(2)),
        ];
        assert!(parallel_eligible(&reads, &families));
    }

    #[tokio::test]
    async fn sweep_drops_failing_chains() {
        let connector = Arc::new(MockEvmConnector::new());
        connector.state.set_balance(1, addr(9), 1);
        connector.state.set_balance(10, addr(9), 3);
        connector.state.fail_chain(2);
        let conn = Arc::new(MockAltConnection::new());
        let engine = engine(&connector, Some(conn.clone()));
        conn.set_balance(&engine.dispatcher().alt().unwrap().address(), 42);

        let sweep = engine.sweep_native_balances(&hex(9), None).await.unwrap();

        let chains: Vec<&str> = sweep.iter().map(|b| b.chain.as_str()).collect();
        assert_eq!(chains, vec!["A", "C", "ALT"]);
        assert_eq!(sweep.last().unwrap().balance, Balance::new(42, 9, "SOL"));
    }

    #[tokio::test]
    async fn sweep_rejects_malformed_evm_address() {
        let connector = Arc::new(MockEvmConnector::new());
        let err = engine(&connector, None)
            .sweep_native_balances("0xnope", None)
            .await
            .unwrap_err();
        assert_eq!(err.terminal_reason(), Some(TerminalReason::InvalidAddress));
    }

    #[tokio::test]
    async fn alt_transfers_report_each_signature() {
        let connector = Arc::new(MockEvmConnector::new());
        let conn = Arc::new(MockAltConnection::new());
        conn.set_status_after_polls(0, "confirmed", None);
        let transfers = [
            Transfer::new(Pubkey::new_from_array([3; 32]).to_string(), 5),
            Transfer::new(Pubkey::new_from_array([4; 32]).to_string(), 6),
        ];

        let batch = engine(&connector, Some(conn.clone()))
            .transfer_native_many(&ChainKey::new("ALT"), &transfers)
            .await
            .unwrap();

        assert_eq!(batch.success_count(), 2);
        assert!(batch.iter().all(|r| r.value().unwrap().status == TxStatus::Confirmed));
        assert_eq!(conn.sent().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn batch_length_and_order_match_input(valid in proptest::collection::vec(any::<bool>(), 0..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let connector = Arc::new(MockEvmConnector::new());
            let targets: Vec<String> = valid
                .iter()
                .enumerate()
                .map(|(i, ok)| if *ok { hex(u8::try_from(i).unwrap() + 1) } else { format!("bad-{i}") })
                .collect();
            let requests = targets
                .iter()
                .map(|t| OperationRequest::native_balance("A", t.as_str()))
                .collect();

            let batch = runtime.block_on(engine(&connector, None).run_batch(requests)).unwrap();

            prop_assert_eq!(batch.len(), targets.len());
            for ((result, target), ok) in batch.iter().zip(&targets).zip(&valid) {
                prop_assert_eq!(&result.target, target);
                prop_assert_eq!(result.is_success(), *ok);
            }
        }
    }
}
