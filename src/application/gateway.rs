//! # Gateway
//!
//! Facade that builds the registry, the family handles, and the services
//! on top of them from an [`AppConfig`].
//!
//! A family without signing material gets no handle; requests for its
//! chains fail with `BackendNotConfigured`.

use crate::application::services::batch::{BatchConfig, BatchEngine};
use crate::application::services::dispatcher::Dispatcher;
use crate::application::services::multicall::MulticallBatcher;
use crate::application::services::retry::RetryPolicy;
use crate::config::AppConfig;
use crate::domain::chain::{ChainKey, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::health::FamilyHealth;
use crate::domain::operation::{FeeEstimate, OperationRequest};
use crate::infrastructure::blockchain::alt::AltHandle;
use crate::infrastructure::blockchain::ethereum::EthersConnector;
use crate::infrastructure::blockchain::evm::EvmHandle;
use crate::infrastructure::blockchain::registry::ChainRegistry;
use crate::infrastructure::blockchain::solana::{AltKeypair, SolanaRpcClient};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Health of each configured family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// EVM handle probe, `None` if not configured.
    pub evm: Option<FamilyHealth>,
    /// Alternate handle probe, `None` if not configured.
    pub alt: Option<FamilyHealth>,
}

impl HealthReport {
    /// Returns true if every configured family answered.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.evm.iter().chain(self.alt.iter()).all(|h| h.healthy)
    }
}

/// Entry point wiring handles and services together.
#[derive(Debug, Clone)]
pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    batch: BatchEngine,
    multicall: Option<MulticallBatcher>,
}

impl Gateway {
    /// Wires services over existing handles.
    #[must_use]
    pub fn new(
        registry: Arc<ChainRegistry>,
        evm: Option<Arc<EvmHandle>>,
        alt: Option<Arc<AltHandle>>,
        retry: RetryPolicy,
        batch: BatchConfig,
    ) -> Self {
        let multicall = evm.clone().map(MulticallBatcher::new);
        let dispatcher = Arc::new(Dispatcher::new(registry, evm, alt, retry));
        Self {
            batch: BatchEngine::new(dispatcher.clone(), batch),
            dispatcher,
            multicall,
        }
    }

    /// Builds the registry and handles described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for invalid signing material, or
    /// `UnknownChain` if the default or alternate chain is not registered.
    pub fn from_config(config: &AppConfig) -> GatewayResult<Self> {
        let registry = Arc::new(
            ChainRegistry::defaults()
                .with_configured_endpoints(config.rpc_urls.clone())
                .with_env_endpoints(),
        );

        let evm = match config.signing.evm_signer() {
            Some(signer) => {
                let connector = Arc::new(EthersConnector::new(&signer)?);
                let handle = EvmHandle::configure(
                    registry.clone(),
                    connector,
                    &ChainKey::new(&config.default_chain),
                    None,
                )?
                .with_confirmation_timeout(config.confirmation_timeout());
                Some(Arc::new(handle))
            }
            None => None,
        };

        let alt = match config.signing.alt_secret() {
            Some(secret) => {
                let key = ChainKey::new(&config.alt_chain);
                let chain = registry.resolve(&key)?;
                if chain.family() != ProtocolFamily::Alt {
                    return Err(GatewayError::configuration(format!(
                        "alt_chain {key} is not a Solana cluster"
                    )));
                }
                let endpoint = registry.endpoint_for(&key, None)?;
                let client = SolanaRpcClient::new(
                    endpoint,
                    config.alt_commitment,
                    config.request_timeout(),
                )?;
                let handle = AltHandle::new(
                    chain.clone(),
                    Arc::new(client),
                    AltKeypair::parse(secret)?,
                    config.alt_commitment,
                )?
                .with_confirmation_timeout(config.confirmation_timeout());
                Some(Arc::new(handle))
            }
            None => None,
        };

        info!(
            chains = registry.len(),
            evm = evm.is_some(),
            alt = alt.is_some(),
            "gateway configured"
        );
        Ok(Self::new(
            registry,
            evm,
            alt,
            config.retry.clone(),
            config.batch.clone(),
        ))
    }

    /// Chain registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChainRegistry> {
        self.dispatcher.registry()
    }

    /// Single-request dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Batch engine.
    #[must_use]
    pub fn batch(&self) -> &BatchEngine {
        &self.batch
    }

    /// Multicall batcher, available when the EVM handle is configured.
    #[must_use]
    pub fn multicall(&self) -> Option<&MulticallBatcher> {
        self.multicall.as_ref()
    }

    /// EVM signer address.
    #[must_use]
    pub fn evm_address(&self) -> Option<Address> {
        self.dispatcher.evm().map(|h| h.address())
    }

    /// Solana account address.
    #[must_use]
    pub fn alt_address(&self) -> Option<String> {
        self.dispatcher.alt().map(|h| h.address())
    }

    /// Estimated fee of a native transfer on `chain`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChain`, `BackendNotConfigured`, `InvalidAddress`, or
    /// a classified RPC error.
    pub async fn estimate_transfer_fee(
        &self,
        chain: &ChainKey,
        to: &str,
        amount: u128,
    ) -> GatewayResult<FeeEstimate> {
        let request = OperationRequest::native_transfer(chain.clone(), to, amount);
        match (self.dispatcher.preflight(&request)?, self.dispatcher.evm(), self.dispatcher.alt()) {
            (ProtocolFamily::Evm, Some(evm), _) => {
                let binding = evm.bind(chain, None).await?;
                binding.estimate_transfer_fee(to, amount).await
            }
            (ProtocolFamily::Alt, _, Some(alt)) => alt.estimate_transfer_fee(to, amount).await,
            (family, _, _) => Err(GatewayError::BackendNotConfigured {
                family,
                chain: chain.clone(),
            }),
        }
    }

    /// Signs `message` with the configured key of `family`.
    ///
    /// EVM signatures are EIP-191 personal messages in `0x` hex; Solana
    /// signatures are raw ed25519 in base58.
    ///
    /// # Errors
    ///
    /// Returns `BackendNotConfigured` if `family` has no key, or
    /// `Authorization` if signing fails.
    pub async fn sign_message(&self, family: ProtocolFamily, message: &[u8]) -> GatewayResult<String> {
        let missing = || GatewayError::BackendNotConfigured {
            family,
            chain: ChainKey::new(family.to_string()),
        };
        match family {
            ProtocolFamily::Evm => {
                self.dispatcher
                    .evm()
                    .ok_or_else(missing)?
                    .sign_message(message)
                    .await
            }
            ProtocolFamily::Alt => Ok(self.dispatcher.alt().ok_or_else(missing)?.sign_message(message)),
        }
    }

    /// Probes each configured family concurrently.
    pub async fn health_check(&self) -> HealthReport {
        let evm = async {
            match self.dispatcher.evm() {
                Some(handle) => Some(handle.health_check().await),
                None => None,
            }
        };
        let alt = async {
            match self.dispatcher.alt() {
                Some(handle) => Some(handle.health_check().await),
                None => None,
            }
        };
        let (evm, alt) = tokio::join!(evm, alt);
        HealthReport { evm, alt }
    }
}
