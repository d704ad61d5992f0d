//! In-crate mocks for the connection ports.

#![allow(clippy::unwrap_used)]

use crate::domain::chain::{AltNetwork, ChainDescriptor, NativeCurrency};
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use crate::infrastructure::blockchain::client::{
    AltConnection, BlockhashContext, EvmConnection, EvmConnector, EvmTxRequest, SignatureStatus,
    TokenAccount, TxHash, TxReceipt,
};
use crate::infrastructure::blockchain::alt::AltHandle;
use crate::infrastructure::blockchain::evm::EvmHandle;
use crate::infrastructure::blockchain::registry::ChainRegistry;
use crate::infrastructure::blockchain::solana::{AltKeypair, Commitment, Pubkey};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Signature, U256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn evm_chain(key: &str, chain_id: u64) -> ChainDescriptor {
    ChainDescriptor::evm(
        key,
        key,
        chain_id,
        format!("http://{}.default", key.to_lowercase()),
        format!("https://{}.explorer", key.to_lowercase()),
        NativeCurrency::new("Ether", "ETH", 18),
    )
}

pub fn solana_chain() -> ChainDescriptor {
    ChainDescriptor::alt(
        "ALT",
        "Solana Devnet",
        AltNetwork::Devnet,
        "http://alt.default",
        "https://explorer.solana.com",
        NativeCurrency::new("Solana", "SOL", 9),
    )
}

/// `{A: evm 1, B: evm 2, C: evm 10, ALT}` with the default aggregator table.
pub fn test_registry() -> ChainRegistry {
    ChainRegistry::new(vec![
        evm_chain("A", 1),
        evm_chain("B", 2),
        evm_chain("C", 10),
        solana_chain(),
    ])
    .unwrap()
}

/// Well-known development key (anvil account 0) the EVM mock signs with.
pub const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// EVM handle bound to `A`, with a short receipt wait.
pub fn evm_handle(connector: Arc<MockEvmConnector>, registry: Arc<ChainRegistry>) -> Arc<EvmHandle> {
    Arc::new(
        EvmHandle::configure(registry, connector, &"A".into(), None)
            .unwrap()
            .with_confirmation_timeout(Duration::from_millis(200)),
    )
}

/// Alternate handle on [`solana_chain`] with fast polling.
pub fn alt_handle(connection: Arc<MockAltConnection>) -> Arc<AltHandle> {
    Arc::new(
        AltHandle::new(
            solana_chain(),
            connection,
            AltKeypair::from_bytes(&[1u8; 32]).unwrap(),
            Commitment::Confirmed,
        )
        .unwrap()
        .with_confirmation_timeout(Duration::from_millis(60))
        .with_poll_interval(Duration::from_millis(5)),
    )
}

// ============================================================================
// EVM
// ============================================================================

type CallHandler = Box<dyn Fn(u64, Address, &[u8]) -> GatewayResult<Bytes> + Send + Sync>;

#[derive(Default)]
pub struct MockEvmState {
    balances: Mutex<HashMap<(u64, Address), U256>>,
    failing_chains: Mutex<Vec<u64>>,
    call_handler: Mutex<Option<CallHandler>>,
    broadcast_failures: Mutex<VecDeque<GatewayError>>,
    broadcasts: Mutex<Vec<(u64, EvmTxRequest)>>,
    transactions: Mutex<HashMap<String, Option<TxReceipt>>>,
    connects: Mutex<Vec<(u64, String)>>,
    receipt_delay: Mutex<Option<Duration>>,
    network_calls: AtomicUsize,
}

impl fmt::Debug for MockEvmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEvmState").finish_non_exhaustive()
    }
}

impl MockEvmState {
    pub fn set_balance(&self, chain_id: u64, address: Address, wei: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert((chain_id, address), U256::from(wei));
    }

    pub fn fail_chain(&self, chain_id: u64) {
        self.failing_chains.lock().unwrap().push(chain_id);
    }

    pub fn set_call_handler(
        &self,
        handler: impl Fn(u64, Address, &[u8]) -> GatewayResult<Bytes> + Send + Sync + 'static,
    ) {
        *self.call_handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn fail_next_broadcasts(&self, errors: Vec<GatewayError>) {
        self.broadcast_failures.lock().unwrap().extend(errors);
    }

    /// Registers a transaction the node knows; `None` means not mined yet.
    pub fn set_transaction(&self, hash: &str, receipt: Option<TxReceipt>) {
        self.transactions
            .lock()
            .unwrap()
            .insert(hash.to_string(), receipt);
    }

    pub fn set_receipt_delay(&self, delay: Duration) {
        *self.receipt_delay.lock().unwrap() = Some(delay);
    }

    pub fn broadcasts(&self) -> Vec<(u64, EvmTxRequest)> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<(u64, String)> {
        self.connects.lock().unwrap().clone()
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    fn touch(&self, chain_id: u64) -> GatewayResult<()> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_chains.lock().unwrap().contains(&chain_id) {
            return Err(GatewayError::transient(format!("chain {chain_id} unreachable")));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockEvmConnector {
    pub state: Arc<MockEvmState>,
    pub wallet: LocalWallet,
}

impl MockEvmConnector {
    pub const GAS_PRICE: u64 = 2_000_000_000;

    pub fn new() -> Self {
        Self {
            state: Arc::new(MockEvmState::default()),
            wallet: DEV_KEY.parse().unwrap(),
        }
    }
}

impl EvmConnector for MockEvmConnector {
    fn connect(
        &self,
        chain: &ChainDescriptor,
        endpoint: &str,
    ) -> GatewayResult<Arc<dyn EvmConnection>> {
        let chain_id = chain
            .chain_id()
            .ok_or_else(|| GatewayError::configuration("not evm"))?;
        self.state
            .connects
            .lock()
            .unwrap()
            .push((chain_id, endpoint.to_string()));
        Ok(Arc::new(MockEvmConnection {
            chain_id,
            endpoint: endpoint.to_string(),
            wallet: self.wallet.clone().with_chain_id(chain_id),
            state: self.state.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct MockEvmConnection {
    chain_id: u64,
    endpoint: String,
    wallet: LocalWallet,
    state: Arc<MockEvmState>,
}

#[async_trait]
impl EvmConnection for MockEvmConnection {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn native_balance(&self, address: Address) -> GatewayResult<U256> {
        self.state.touch(self.chain_id)?;
        Ok(self
            .state
            .balances
            .lock()
            .unwrap()
            .get(&(self.chain_id, address))
            .copied()
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> GatewayResult<Bytes> {
        self.state.touch(self.chain_id)?;
        match self.state.call_handler.lock().unwrap().as_ref() {
            Some(handler) => handler(self.chain_id, to, &data),
            None => Err(GatewayError::terminal(TerminalReason::Reverted, "execution reverted")),
        }
    }

    async fn broadcast(&self, tx: EvmTxRequest) -> GatewayResult<TxHash> {
        self.state.touch(self.chain_id)?;
        if let Some(err) = self.state.broadcast_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut broadcasts = self.state.broadcasts.lock().unwrap();
        broadcasts.push((self.chain_id, tx));
        let hash = TxHash::new(format!("0x{:064x}", broadcasts.len()));
        self.state.set_transaction(
            hash.as_str(),
            Some(TxReceipt {
                tx_hash: hash.clone(),
                block_number: Some(42),
                success: true,
            }),
        );
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        hash: &TxHash,
        _confirmations: usize,
    ) -> GatewayResult<TxReceipt> {
        let delay = *self.state.receipt_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(TxReceipt {
            tx_hash: hash.clone(),
            block_number: Some(42),
            success: true,
        })
    }

    async fn block_number(&self) -> GatewayResult<u64> {
        self.state.touch(self.chain_id)?;
        Ok(42)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> GatewayResult<Option<TxReceipt>> {
        self.state.touch(self.chain_id)?;
        Ok(self
            .state
            .transactions
            .lock()
            .unwrap()
            .get(hash.as_str())
            .cloned()
            .flatten())
    }

    async fn transaction_known(&self, hash: &TxHash) -> GatewayResult<bool> {
        self.state.touch(self.chain_id)?;
        Ok(self.state.transactions.lock().unwrap().contains_key(hash.as_str()))
    }

    async fn estimate_gas(&self, tx: &EvmTxRequest) -> GatewayResult<U256> {
        self.state.touch(self.chain_id)?;
        Ok(U256::from(if tx.data.is_empty() { 21_000u64 } else { 65_000 }))
    }

    async fn gas_price(&self) -> GatewayResult<U256> {
        self.state.touch(self.chain_id)?;
        Ok(U256::from(MockEvmConnector::GAS_PRICE))
    }

    async fn sign_message(&self, message: &[u8]) -> GatewayResult<Signature> {
        Ok(self.wallet.sign_message(message).await.unwrap())
    }
}

// ============================================================================
// Alternate chain
// ============================================================================

#[derive(Debug, Clone)]
struct ScriptedStatus {
    after_polls: usize,
    confirmation_status: String,
    err: Option<String>,
}

#[derive(Debug)]
pub struct MockAltConnection {
    balances: Mutex<HashMap<String, u64>>,
    token_accounts: Mutex<Vec<(String, String, TokenAccount)>>,
    status: Mutex<Option<ScriptedStatus>>,
    polls: AtomicUsize,
    block_height: Mutex<u64>,
    sent: Mutex<Vec<Vec<u8>>>,
    send_failures: Mutex<VecDeque<GatewayError>>,
    blockhash_fetches: AtomicUsize,
    balance_delay: Mutex<Option<Duration>>,
    fee_queries: Mutex<Vec<String>>,
}

impl MockAltConnection {
    pub const SLOT: u64 = 777;
    pub const LAST_VALID_HEIGHT: u64 = 200;
    pub const TOKEN_PROGRAM: &'static str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
    pub const FEE_LAMPORTS: u64 = 5_000;

    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            token_accounts: Mutex::new(Vec::new()),
            status: Mutex::new(None),
            polls: AtomicUsize::new(0),
            block_height: Mutex::new(100),
            sent: Mutex::new(Vec::new()),
            send_failures: Mutex::new(VecDeque::new()),
            blockhash_fetches: AtomicUsize::new(0),
            balance_delay: Mutex::new(None),
            fee_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_balance(&self, address: &str, lamports: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), lamports);
    }

    pub fn set_balance_delay(&self, delay: Duration) {
        *self.balance_delay.lock().unwrap() = Some(delay);
    }

    pub fn add_token_account(&self, owner: &str, mint: &str, account: Pubkey, amount: u128, decimals: u8) {
        self.token_accounts.lock().unwrap().push((
            owner.to_string(),
            mint.to_string(),
            TokenAccount {
                address: account.to_string(),
                program_id: Self::TOKEN_PROGRAM.to_string(),
                amount,
                decimals,
            },
        ));
    }

    pub fn set_status_after_polls(&self, polls: usize, status: &str, err: Option<&str>) {
        *self.status.lock().unwrap() = Some(ScriptedStatus {
            after_polls: polls,
            confirmation_status: status.to_string(),
            err: err.map(str::to_string),
        });
    }

    pub fn set_block_height(&self, height: u64) {
        *self.block_height.lock().unwrap() = height;
    }

    pub fn fail_next_sends(&self, errors: Vec<GatewayError>) {
        self.send_failures.lock().unwrap().extend(errors);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fee_queries(&self) -> Vec<String> {
        self.fee_queries.lock().unwrap().clone()
    }

    pub fn blockhash_fetches(&self) -> usize {
        self.blockhash_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AltConnection for MockAltConnection {
    fn endpoint(&self) -> &str {
        "http://alt.mock"
    }

    async fn balance(&self, address: &str) -> GatewayResult<u64> {
        let delay = *self.balance_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or_default())
    }

    async fn token_accounts(&self, owner: &str, mint: &str) -> GatewayResult<Vec<TokenAccount>> {
        Ok(self
            .token_accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, m, _)| o == owner && m == mint)
            .map(|(_, _, account)| account.clone())
            .collect())
    }

    async fn latest_blockhash(&self) -> GatewayResult<BlockhashContext> {
        let n = self.blockhash_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(BlockhashContext {
            blockhash: Pubkey::new_from_array([u8::try_from(n % 200).unwrap() + 1; 32]).to_string(),
            last_valid_block_height: Self::LAST_VALID_HEIGHT,
        })
    }

    async fn send_transaction(&self, wire: &[u8]) -> GatewayResult<String> {
        if let Some(err) = self.send_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(wire.to_vec());
        Ok(bs58::encode(&wire[1..65]).into_string())
    }

    async fn signature_status(
        &self,
        _signature: &str,
        _search_history: bool,
    ) -> GatewayResult<Option<SignatureStatus>> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.status.lock().unwrap().clone();
        Ok(scripted
            .filter(|s| poll >= s.after_polls)
            .map(|s| SignatureStatus {
                slot: Self::SLOT,
                confirmation_status: Some(s.confirmation_status),
                err: s.err,
            }))
    }

    async fn block_height(&self) -> GatewayResult<u64> {
        Ok(*self.block_height.lock().unwrap())
    }

    async fn fee_for_message(&self, message: &str) -> GatewayResult<Option<u64>> {
        self.fee_queries.lock().unwrap().push(message.to_string());
        Ok(Some(Self::FEE_LAMPORTS))
    }

    async fn slot(&self) -> GatewayResult<u64> {
        Ok(Self::SLOT)
    }
}
