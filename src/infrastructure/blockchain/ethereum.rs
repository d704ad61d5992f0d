//! # Ethereum Connection
//!
//! [`EvmConnection`] implementation using ethers-rs.
//!
//! Each connection wraps a `SignerMiddleware` over an HTTP provider, with
//! the wallet rebound to the target chain id so signatures are replay
//! protected per chain. The connector is cheap to call: building a
//! provider does not touch the network.

use super::client::{EvmConnection, EvmConnector, EvmTxRequest, TxHash, TxReceipt};
use crate::domain::chain::ChainDescriptor;
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::coins_bip39::English;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// EVM signing material.
#[derive(Clone, PartialEq, Eq)]
pub enum EvmSigner {
    /// Hex private key, with or without `0x`.
    PrivateKey(String),
    /// BIP-39 phrase with optional derivation path
    /// (default `m/44'/60'/0'/0/0`).
    Mnemonic {
        /// Space separated phrase.
        phrase: String,
        /// Derivation path override.
        path: Option<String>,
    },
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey(_) => f.write_str("EvmSigner::PrivateKey(<redacted>)"),
            Self::Mnemonic { path, .. } => f
                .debug_struct("EvmSigner::Mnemonic")
                .field("phrase", &"<redacted>")
                .field("path", path)
                .finish(),
        }
    }
}

impl EvmSigner {
    /// Builds the local wallet.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the key or phrase is invalid.
    pub fn wallet(&self) -> GatewayResult<LocalWallet> {
        match self {
            Self::PrivateKey(key) => key
                .trim()
                .trim_start_matches("0x")
                .parse::<LocalWallet>()
                .map_err(|e| GatewayError::configuration(format!("invalid EVM private key: {e}"))),
            Self::Mnemonic { phrase, path } => {
                let mut builder = MnemonicBuilder::<English>::default().phrase(phrase.trim());
                if let Some(path) = path {
                    builder = builder.derivation_path(path).map_err(|e| {
                        GatewayError::configuration(format!("invalid derivation path: {e}"))
                    })?;
                }
                builder
                    .build()
                    .map_err(|e| GatewayError::configuration(format!("invalid mnemonic: {e}")))
            }
        }
    }
}

/// Freshly generated EVM account.
pub struct GeneratedWallet {
    /// Checksummed address.
    pub address: String,
    /// Hex private key with `0x`, the format [`EvmSigner::PrivateKey`] reads.
    pub private_key: String,
}

impl fmt::Debug for GeneratedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedWallet")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl GeneratedWallet {
    /// Generates a random secp256k1 account.
    #[must_use]
    pub fn random() -> Self {
        let wallet = LocalWallet::new(&mut ethers::core::rand::thread_rng());
        Self {
            address: ethers::utils::to_checksum(&wallet.address(), None),
            private_key: format!("0x{}", ethers::utils::hex::encode(wallet.signer().to_bytes())),
        }
    }
}

/// Checks an EIP-191 personal-message signature against `address`.
///
/// A well-formed signature from another account yields `Ok(false)`.
///
/// # Errors
///
/// Returns `InvalidAddress` for a bad address and `Decode` for a malformed
/// signature.
pub fn verify_personal_signature(address: Address, message: &[u8], signature: &str) -> GatewayResult<bool> {
    let signature: Signature = signature
        .trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| GatewayError::decode(format!("signature: {e}")))?;
    Ok(signature.verify(message, address).is_ok())
}

fn parse_hash(hash: &TxHash) -> GatewayResult<H256> {
    hash.as_str()
        .parse()
        .map_err(|_| GatewayError::decode(format!("invalid transaction hash: {hash}")))
}

/// Builds [`EthersConnection`]s bound to one wallet.
#[derive(Debug, Clone)]
pub struct EthersConnector {
    wallet: LocalWallet,
    poll_interval: Duration,
}

impl EthersConnector {
    /// Creates a connector from signing material.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the signing material is invalid.
    pub fn new(signer: &EvmSigner) -> GatewayResult<Self> {
        Ok(Self {
            wallet: signer.wallet()?,
            poll_interval: Duration::from_secs(2),
        })
    }

    /// Sets the receipt polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Signer address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

impl EvmConnector for EthersConnector {
    fn connect(
        &self,
        chain: &ChainDescriptor,
        endpoint: &str,
    ) -> GatewayResult<Arc<dyn EvmConnection>> {
        let chain_id = chain.chain_id().ok_or_else(|| {
            GatewayError::configuration(format!("{} is not an EVM chain", chain.key()))
        })?;

        let provider = Provider::<Http>::try_from(endpoint)
            .map_err(|e| GatewayError::configuration(format!("invalid endpoint {endpoint}: {e}")))?
            .interval(self.poll_interval);
        let wallet = self.wallet.clone().with_chain_id(chain_id);

        Ok(Arc::new(EthersConnection {
            chain_id,
            endpoint: endpoint.to_string(),
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
        }))
    }
}

/// Signer-bound ethers connection to one endpoint.
#[derive(Debug)]
pub struct EthersConnection {
    chain_id: u64,
    endpoint: String,
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

fn classify(e: impl fmt::Display) -> GatewayError {
    GatewayError::from_rpc_message(e.to_string())
}

#[async_trait]
impl EvmConnection for EthersConnection {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn address(&self) -> Address {
        self.client.address()
    }

    async fn native_balance(&self, address: Address) -> GatewayResult<U256> {
        self.client.get_balance(address, None).await.map_err(classify)
    }

    async fn call(&self, to: Address, data: Bytes) -> GatewayResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client.call(&tx, None).await.map_err(classify)
    }

    async fn broadcast(&self, tx: EvmTxRequest) -> GatewayResult<TxHash> {
        let request = TransactionRequest::new()
            .to(tx.to)
            .value(tx.value)
            .data(tx.data);

        let pending = self
            .client
            .send_transaction(request, None)
            .await
            .map_err(classify)?;

        Ok(TxHash::new(format!("{:?}", pending.tx_hash())))
    }

    async fn wait_for_receipt(
        &self,
        hash: &TxHash,
        confirmations: usize,
    ) -> GatewayResult<TxReceipt> {
        let tx_hash = parse_hash(hash)?;

        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .confirmations(confirmations)
            .await
            .map_err(classify)?
            .ok_or_else(|| GatewayError::transient(format!("transaction {hash} dropped")))?;

        Ok(TxReceipt {
            tx_hash: hash.clone(),
            block_number: receipt.block_number.map(|n| n.as_u64()),
            success: receipt.status.is_some_and(|s| s.as_u64() == 1),
        })
    }

    async fn block_number(&self) -> GatewayResult<u64> {
        self.client
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(classify)
    }

    async fn transaction_receipt(&self, hash: &TxHash) -> GatewayResult<Option<TxReceipt>> {
        let receipt = self
            .client
            .get_transaction_receipt(parse_hash(hash)?)
            .await
            .map_err(classify)?;
        Ok(receipt.map(|r| TxReceipt {
            tx_hash: hash.clone(),
            block_number: r.block_number.map(|n| n.as_u64()),
            success: r.status.is_some_and(|s| s.as_u64() == 1),
        }))
    }

    async fn transaction_known(&self, hash: &TxHash) -> GatewayResult<bool> {
        let tx = self
            .client
            .get_transaction(parse_hash(hash)?)
            .await
            .map_err(classify)?;
        Ok(tx.is_some())
    }

    async fn estimate_gas(&self, tx: &EvmTxRequest) -> GatewayResult<U256> {
        let request: TypedTransaction = TransactionRequest::new()
            .from(self.client.address())
            .to(tx.to)
            .value(tx.value)
            .data(tx.data.clone())
            .into();
        self.client
            .estimate_gas(&request, None)
            .await
            .map_err(classify)
    }

    async fn gas_price(&self) -> GatewayResult<U256> {
        self.client.get_gas_price().await.map_err(classify)
    }

    async fn sign_message(&self, message: &[u8]) -> GatewayResult<Signature> {
        self.client
            .signer()
            .sign_message(message)
            .await
            .map_err(|e| GatewayError::terminal(TerminalReason::Authorization, e.to_string()))
    }
}
