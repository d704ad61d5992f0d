//! # Alternate-Chain Handle
//!
//! Client handle for the alternate (Solana) family.
//!
//! The handle is bound to one cluster for its whole lifetime and holds no
//! mutable state, so it is shared freely across tasks. Every transfer
//! fetches a fresh blockhash, signs against it, and confirms against the
//! same blockhash context. If the cluster's block height passes the
//! context's `last_valid_block_height` before the signature was ever seen,
//! the transaction can no longer land and the failure is transient, so the
//! retry wrapper resends. A signature seen on-chain is never resent: if it
//! does not reach the handle's commitment in time it is reported pending.

use super::client::{AltConnection, BlockhashContext, SubmittedTx, TokenAccount, TxHash};
use super::solana::{
    AltKeypair, Commitment, Instruction, Pubkey, encode_message, parse_pubkey, sign_transaction,
    verify_message,
};
use crate::domain::chain::{ChainDescriptor, ChainKey, ProtocolFamily};
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use crate::domain::health::FamilyHealth;
use crate::domain::operation::{Balance, FeeEstimate, TxLookup, TxStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

/// Default wait for a transaction to reach the handle's commitment.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Client handle for the alternate chain family.
#[derive(Debug)]
pub struct AltHandle {
    chain: ChainDescriptor,
    connection: Arc<dyn AltConnection>,
    keypair: AltKeypair,
    commitment: Commitment,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl AltHandle {
    /// Binds a keypair and connection to an alternate-family chain.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `chain` is not an alternate-family chain.
    pub fn new(
        chain: ChainDescriptor,
        connection: Arc<dyn AltConnection>,
        keypair: AltKeypair,
        commitment: Commitment,
    ) -> GatewayResult<Self> {
        if chain.family() != ProtocolFamily::Alt {
            return Err(GatewayError::configuration(format!(
                "{} is not an alternate-family chain",
                chain.key()
            )));
        }
        info!(
            chain = %chain.key(),
            endpoint = connection.endpoint(),
            address = %keypair.pubkey(),
            %commitment,
            "alternate-chain handle configured"
        );
        Ok(Self {
            chain,
            connection,
            keypair,
            commitment,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: Duration::from_millis(500),
        })
    }

    /// Sets the confirmation wait bound.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Sets the signature status polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound chain.
    #[must_use]
    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Bound chain key.
    #[must_use]
    pub fn chain_key(&self) -> &ChainKey {
        self.chain.key()
    }

    /// Endpoint of the bound connection.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.connection.endpoint()
    }

    /// Handle's own address.
    #[must_use]
    pub fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Commitment used for confirmation.
    #[must_use]
    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// Lamport balance of `address`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified RPC error.
    pub async fn native_balance(&self, address: &str) -> GatewayResult<Balance> {
        let owner = parse_pubkey(address)?;
        let lamports = self.connection.balance(&owner.to_string()).await?;
        let currency = self.chain.native_currency();
        Ok(Balance::new(
            u128::from(lamports),
            currency.decimals,
            currency.symbol.clone(),
        ))
    }

    /// Sum of `owner`'s token accounts for `mint`.
    ///
    /// An owner without token accounts has a zero balance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or a classified RPC error.
    pub async fn token_balance(&self, mint: &str, owner: &str) -> GatewayResult<Balance> {
        let mint = parse_pubkey(mint)?;
        let owner = parse_pubkey(owner)?;
        let accounts = self
            .connection
            .token_accounts(&owner.to_string(), &mint.to_string())
            .await?;
        let total = accounts
            .iter()
            .try_fold(0u128, |acc, a| acc.checked_add(a.amount))
            .ok_or_else(|| GatewayError::decode("token balance overflow"))?;
        let decimals = accounts.first().map_or(0, |a| a.decimals);
        Ok(Balance::new(total, decimals, ""))
    }

    /// Sends lamports from the handle's account.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, a rejection for amounts over `u64`, a
    /// classified RPC error, or `TransientNetwork` if the blockhash expired
    /// before confirmation.
    pub async fn transfer_native(&self, to: &str, amount: u128) -> GatewayResult<SubmittedTx> {
        let recipient = parse_pubkey(to)?;
        let lamports = to_u64(amount)?;
        let payer = self.keypair.pubkey();
        let instruction =
            solana_system_interface::instruction::transfer(&payer, &recipient, lamports);
        self.submit(&[instruction], to, amount).await
    }

    /// Sends tokens between the handle's and the recipient's existing token
    /// accounts for `mint`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, `InsufficientFunds` if no sender account
    /// holds `amount`, `Rejected` if the recipient has no token account, a
    /// classified RPC error, or `TransientNetwork` on blockhash expiry.
    pub async fn transfer_token(
        &self,
        mint: &str,
        to: &str,
        amount: u128,
    ) -> GatewayResult<SubmittedTx> {
        let mint_key = parse_pubkey(mint)?;
        let recipient = parse_pubkey(to)?;
        let raw = to_u64(amount)?;
        let owner = self.keypair.pubkey();

        let source = self
            .connection
            .token_accounts(&owner.to_string(), &mint_key.to_string())
            .await?
            .into_iter()
            .find(|a| a.amount >= amount)
            .ok_or_else(|| {
                GatewayError::terminal(
                    TerminalReason::InsufficientFunds,
                    format!("no token account of {owner} holds {amount} of {mint}"),
                )
            })?;
        let destination = self
            .connection
            .token_accounts(&recipient.to_string(), &mint_key.to_string())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                GatewayError::terminal(
                    TerminalReason::Rejected,
                    format!("{to} has no token account for {mint}"),
                )
            })?;

        let instruction = transfer_instruction(&source, &destination, &mint_key, &owner, raw)?;
        self.submit(&[instruction], to, amount).await
    }

    /// Looks up a signature, searching the node's full history; `None` if
    /// the node does not know it.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` for a malformed signature or a classified RPC
    /// error.
    pub async fn transaction_status(&self, signature: &str) -> GatewayResult<Option<TxLookup>> {
        let signature = signature.trim();
        let well_formed = bs58::decode(signature)
            .into_vec()
            .is_ok_and(|raw| raw.len() == 64);
        if !well_formed {
            return Err(GatewayError::terminal(
                TerminalReason::Rejected,
                format!("invalid transaction signature: {signature}"),
            ));
        }

        let Some(status) = self.connection.signature_status(signature, true).await? else {
            return Ok(None);
        };
        let reached = status.confirmation_status.as_deref();
        let (tx_status, note) = match status.err {
            Some(err) => (TxStatus::Failed, Some(err)),
            None if reached.is_some_and(|s| self.commitment.is_reached_by(s)) => {
                (TxStatus::Confirmed, None)
            }
            None => (
                TxStatus::Pending,
                Some(format!("{} so far", reached.unwrap_or("processed"))),
            ),
        };
        Ok(Some(TxLookup {
            hash: signature.to_string(),
            status: tx_status,
            block_number: Some(status.slot),
            note,
        }))
    }

    /// Fee of a native transfer at the current blockhash.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress`, a rejection for amounts over `u64`,
    /// `TransientNetwork` if the blockhash expired while quoting, or a
    /// classified RPC error.
    pub async fn estimate_transfer_fee(&self, to: &str, amount: u128) -> GatewayResult<FeeEstimate> {
        let recipient = parse_pubkey(to)?;
        let lamports = to_u64(amount)?;
        let payer = self.keypair.pubkey();
        let instruction =
            solana_system_interface::instruction::transfer(&payer, &recipient, lamports);
        let context = self.connection.latest_blockhash().await?;
        let message = encode_message(&payer, &[instruction], &context.blockhash)?;
        let fee = self
            .connection
            .fee_for_message(&message)
            .await?
            .ok_or_else(|| GatewayError::transient("blockhash expired while quoting fee"))?;
        let currency = self.chain.native_currency();
        Ok(FeeEstimate {
            gas_limit: None,
            gas_price: None,
            fee: Balance::new(u128::from(fee), currency.decimals, currency.symbol.clone()),
        })
    }

    /// Signs arbitrary bytes; returns the base58 signature.
    #[must_use]
    pub fn sign_message(&self, message: &[u8]) -> String {
        self.keypair.sign_message(message).to_string()
    }

    /// Checks a base58 signature of `message` by `address`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` or `Decode` for a malformed signature.
    pub fn verify_message(&self, address: &str, message: &[u8], signature: &str) -> GatewayResult<bool> {
        verify_message(address, message, signature)
    }

    /// Probes the connection with `getSlot`.
    pub async fn health_check(&self) -> FamilyHealth {
        let started = Instant::now();
        match self.connection.slot().await {
            Ok(slot) => FamilyHealth::up(self.chain.key().clone(), started.elapsed(), slot),
            Err(e) => FamilyHealth::down(self.chain.key().clone(), started.elapsed(), e.to_string()),
        }
    }

    async fn submit(
        &self,
        instructions: &[Instruction],
        to: &str,
        value: u128,
    ) -> GatewayResult<SubmittedTx> {
        let context = self.connection.latest_blockhash().await?;
        let payer = self.keypair.pubkey();
        let (expected_signature, wire) =
            sign_transaction(&self.keypair, instructions, &context.blockhash)?;

        let signature = self.connection.send_transaction(&wire).await?;
        if signature != expected_signature {
            debug!(%signature, %expected_signature, "node returned a different signature");
        }
        debug!(
            chain = %self.chain.key(),
            %signature,
            last_valid_block_height = context.last_valid_block_height,
            "transaction sent"
        );

        let tx = SubmittedTx {
            hash: TxHash::new(signature),
            from: payer.to_string(),
            to: to.to_string(),
            value,
            status: TxStatus::Confirmed,
            block_number: None,
            note: None,
        };
        self.confirm(tx, &context).await
    }

    async fn confirm(
        &self,
        mut tx: SubmittedTx,
        context: &BlockhashContext,
    ) -> GatewayResult<SubmittedTx> {
        let deadline = Instant::now() + self.confirmation_timeout;
        // Last status seen on-chain below the handle's commitment.
        let mut landed: Option<String> = None;
        loop {
            match self.connection.signature_status(tx.hash.as_str(), false).await {
                Ok(Some(status)) => {
                    tx.block_number = Some(status.slot);
                    if let Some(err) = status.err {
                        tx.status = TxStatus::Failed;
                        tx.note = Some(err);
                        return Ok(tx);
                    }
                    let reached = status.confirmation_status.as_deref();
                    if reached.is_some_and(|s| self.commitment.is_reached_by(s)) {
                        tx.status = TxStatus::Confirmed;
                        return Ok(tx);
                    }
                    landed = Some(reached.unwrap_or("processed").to_string());
                }
                Ok(None) => {}
                Err(e) => debug!(signature = %tx.hash, error = %e, "status poll failed"),
            }

            if landed.is_none() {
                match self.connection.block_height().await {
                    Ok(height) if height > context.last_valid_block_height => {
                        return Err(GatewayError::transient(format!(
                            "block height exceeded: blockhash {} expired before {} landed",
                            context.blockhash, tx.hash
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => debug!(signature = %tx.hash, error = %e, "block height poll failed"),
                }
            }

            if Instant::now() >= deadline {
                let note = match &landed {
                    Some(level) => format!(
                        "landed {level}, not {} within {}s",
                        self.commitment,
                        self.confirmation_timeout.as_secs()
                    ),
                    None => format!(
                        "not {} within {}s",
                        self.commitment,
                        self.confirmation_timeout.as_secs()
                    ),
                };
                return Ok(tx.pending(note));
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn to_u64(amount: u128) -> GatewayResult<u64> {
    u64::try_from(amount).map_err(|_| {
        GatewayError::terminal(
            TerminalReason::Rejected,
            format!("amount {amount} exceeds u64"),
        )
    })
}

fn transfer_instruction(
    source: &TokenAccount,
    destination: &TokenAccount,
    mint: &Pubkey,
    owner: &Pubkey,
    amount: u64,
) -> GatewayResult<Instruction> {
    let key = |value: &str, what: &str| {
        parse_pubkey(value).map_err(|_| GatewayError::decode(format!("{what}: {value}")))
    };
    let program = key(&source.program_id, "token program id")?;
    let source_key = key(&source.address, "token account")?;
    let destination_key = key(&destination.address, "token account")?;
    spl_token_2022_interface::instruction::transfer_checked(
        &program,
        &source_key,
        mint,
        &destination_key,
        owner,
        &[],
        amount,
        source.decimals,
    )
    .map_err(|e| {
        GatewayError::terminal(
            TerminalReason::Unsupported,
            format!("token program {}: {e}", source.program_id),
        )
    })
}
