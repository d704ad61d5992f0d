//! Gateway behaviour through the public API only.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Signature, U256};
use omnichain::application::Gateway;
use omnichain::application::services::{BatchConfig, RetryPolicy, Transfer};
use omnichain::domain::{
    AltNetwork, ChainDescriptor, ChainKey, GatewayError, NativeCurrency, OperationRequest,
    ProtocolFamily, TerminalReason, TxStatus,
};
use omnichain::infrastructure::blockchain::{
    ChainRegistry, EvmConnection, EvmConnector, EvmHandle, EvmTxRequest, TxHash, TxReceipt,
};
use std::sync::{Arc, Mutex};

type Broadcasts = Arc<Mutex<Vec<(u64, Address, U256)>>>;

#[derive(Debug, Default)]
struct RecordingConnector {
    broadcasts: Broadcasts,
}

#[derive(Debug)]
struct RecordingConnection {
    chain_id: u64,
    endpoint: String,
    broadcasts: Broadcasts,
}

impl EvmConnector for RecordingConnector {
    fn connect(
        &self,
        chain: &ChainDescriptor,
        endpoint: &str,
    ) -> omnichain::domain::GatewayResult<Arc<dyn EvmConnection>> {
        Ok(Arc::new(RecordingConnection {
            chain_id: chain.chain_id().unwrap_or_default(),
            endpoint: endpoint.to_string(),
            broadcasts: self.broadcasts.clone(),
        }))
    }
}

#[async_trait]
impl EvmConnection for RecordingConnection {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn address(&self) -> Address {
        Address::repeat_byte(0xee)
    }

    async fn native_balance(&self, _address: Address) -> omnichain::domain::GatewayResult<U256> {
        Ok(U256::exp10(18) * 5)
    }

    async fn call(&self, _to: Address, _data: Bytes) -> omnichain::domain::GatewayResult<Bytes> {
        Err(GatewayError::terminal(TerminalReason::Reverted, "execution reverted"))
    }

    async fn broadcast(&self, tx: EvmTxRequest) -> omnichain::domain::GatewayResult<TxHash> {
        let mut broadcasts = self.broadcasts.lock().unwrap();
        broadcasts.push((self.chain_id, tx.to, tx.value));
        Ok(TxHash::new(format!("0x{:064x}", broadcasts.len())))
    }

    async fn wait_for_receipt(
        &self,
        hash: &TxHash,
        _confirmations: usize,
    ) -> omnichain::domain::GatewayResult<TxReceipt> {
        Ok(TxReceipt {
            tx_hash: hash.clone(),
            block_number: Some(7),
            success: true,
        })
    }

    async fn block_number(&self) -> omnichain::domain::GatewayResult<u64> {
        Ok(7)
    }

    async fn transaction_receipt(
        &self,
        _hash: &TxHash,
    ) -> omnichain::domain::GatewayResult<Option<TxReceipt>> {
        Ok(None)
    }

    async fn transaction_known(&self, _hash: &TxHash) -> omnichain::domain::GatewayResult<bool> {
        Ok(false)
    }

    async fn estimate_gas(&self, _tx: &EvmTxRequest) -> omnichain::domain::GatewayResult<U256> {
        Ok(U256::from(21_000u64))
    }

    async fn gas_price(&self) -> omnichain::domain::GatewayResult<U256> {
        Ok(U256::from(1u64))
    }

    async fn sign_message(&self, _message: &[u8]) -> omnichain::domain::GatewayResult<Signature> {
        Err(GatewayError::terminal(TerminalReason::Authorization, "no key"))
    }
}

fn registry() -> Arc<ChainRegistry> {
    let eth = || NativeCurrency::new("Ether", "ETH", 18);
    Arc::new(
        ChainRegistry::new(vec![
            ChainDescriptor::evm("A", "Chain A", 1, "http://a.rpc", "https://a.scan", eth()),
            ChainDescriptor::evm("B", "Chain B", 2, "http://b.rpc", "https://b.scan", eth()),
            ChainDescriptor::alt(
                "ALT",
                "Solana Devnet",
                AltNetwork::Devnet,
                "http://alt.rpc",
                "https://explorer.solana.com",
                NativeCurrency::new("Solana", "SOL", 9),
            ),
        ])
        .unwrap(),
    )
}

fn gateway() -> (Gateway, Broadcasts) {
    let connector = Arc::new(RecordingConnector::default());
    let broadcasts = connector.broadcasts.clone();
    let registry = registry();
    let evm = EvmHandle::configure(registry.clone(), connector, &ChainKey::new("A"), None).unwrap();
    let gateway = Gateway::new(
        registry,
        Some(Arc::new(evm)),
        None,
        RetryPolicy::no_retry(),
        BatchConfig::default(),
    );
    (gateway, broadcasts)
}

#[tokio::test]
async fn native_transfer_batch_isolates_bad_recipient() {
    let (gateway, broadcasts) = gateway();
    let first = format!("{:?}", Address::repeat_byte(1));
    let second = format!("{:?}", Address::repeat_byte(2));

    let batch = gateway
        .batch()
        .transfer_native_many(
            &ChainKey::new("A"),
            &[
                Transfer::new(&first, 10),
                Transfer::new("not-an-address", 20),
                Transfer::new(&second, 30),
            ],
        )
        .await
        .unwrap();

    assert_eq!(batch.len(), 3);
    let sent = batch.get(0).unwrap().value().unwrap();
    assert_eq!(sent.status, TxStatus::Confirmed);
    assert_eq!(sent.block_number, Some(7));
    assert!(sent.explorer_url.starts_with("https://a.scan/tx/0x"));
    assert_eq!(
        batch.get(1).unwrap().error().and_then(GatewayError::terminal_reason),
        Some(TerminalReason::InvalidAddress)
    );
    assert_eq!(batch.get(2).unwrap().value().unwrap().to, second);

    let broadcasts = broadcasts.lock().unwrap().clone();
    assert_eq!(
        broadcasts,
        vec![
            (1, Address::repeat_byte(1), U256::from(10u64)),
            (1, Address::repeat_byte(2), U256::from(30u64)),
        ]
    );
}

#[tokio::test]
async fn request_for_other_chain_switches_binding() {
    let (gateway, broadcasts) = gateway();
    let to = format!("{:?}", Address::repeat_byte(3));

    let result = gateway
        .dispatcher()
        .execute(OperationRequest::native_transfer("b", &to, 1))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.chain, ChainKey::new("B"));
    assert_eq!(
        gateway.dispatcher().evm().unwrap().current_chain().await,
        ChainKey::new("B")
    );
    assert_eq!(broadcasts.lock().unwrap()[0].0, 2);
}

#[tokio::test]
async fn unknown_chain_rejects_whole_batch() {
    let (gateway, broadcasts) = gateway();
    let to = format!("{:?}", Address::repeat_byte(4));

    let err = gateway
        .batch()
        .run_batch(vec![
            OperationRequest::native_transfer("A", &to, 1),
            OperationRequest::native_transfer("NOWHERE", &to, 1),
        ])
        .await
        .unwrap_err();

    assert_eq!(err, GatewayError::UnknownChain("NOWHERE".into()));
    assert!(broadcasts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sweep_skips_unconfigured_family() {
    let (gateway, _) = gateway();
    let owner = format!("{:?}", Address::repeat_byte(5));

    let balances = gateway
        .batch()
        .sweep_native_balances(&owner, None)
        .await
        .unwrap();

    let chains: Vec<_> = balances.iter().map(|b| b.chain.as_str().to_string()).collect();
    assert_eq!(chains, vec!["A", "B"]);
    assert_eq!(balances[0].balance.to_string(), "5 ETH");
}

#[test]
fn alt_request_without_alt_handle_is_rejected() {
    let (gateway, _) = gateway();
    let err = tokio_test::block_on(
        gateway
            .dispatcher()
            .execute(OperationRequest::native_balance("ALT", "11111111111111111111111111111111")),
    )
    .unwrap_err();

    assert_eq!(
        err,
        GatewayError::BackendNotConfigured {
            family: ProtocolFamily::Alt,
            chain: ChainKey::new("ALT"),
        }
    );
}

#[tokio::test]
async fn lookup_of_unknown_transaction_is_captured() {
    let (gateway, broadcasts) = gateway();
    let result = gateway
        .dispatcher()
        .execute(OperationRequest::transaction_status("B", format!("0x{:064x}", 1)))
        .await
        .unwrap();

    assert_eq!(
        result.error().and_then(GatewayError::terminal_reason),
        Some(TerminalReason::Rejected)
    );
    assert!(broadcasts.lock().unwrap().is_empty());
}
