//! # Solana Support
//!
//! Keys, transaction building and the JSON-RPC client for the alternate
//! family:
//!
//! - [`AltKeypair`]: signing key over `solana-sdk`'s `Keypair`
//! - [`sign_transaction`]: legacy transaction signed by the fee payer and
//!   serialized with `bincode`
//! - [`SolanaRpcClient`]: the JSON-RPC methods the alternate handle uses,
//!   over `reqwest`
//!
//! Only single-signer transactions are built: the fee payer is the only
//! signer of every transfer.

use super::client::{AltConnection, BlockhashContext, SignatureStatus, TokenAccount};
use crate::domain::error::{GatewayError, GatewayResult, TerminalReason};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Verifier, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use solana_sdk::hash::Hash;
use solana_sdk::message::Message;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

pub use solana_sdk::instruction::Instruction;
pub use solana_sdk::pubkey::Pubkey;

// ============================================================================
// Keys
// ============================================================================

/// Parses a base58 account address.
///
/// # Errors
///
/// Returns `InvalidAddress` if `address` is not a 32-byte base58 key.
pub fn parse_pubkey(address: &str) -> GatewayResult<Pubkey> {
    Pubkey::from_str(address.trim()).map_err(|_| GatewayError::invalid_address(address))
}

/// Alternate-chain signing key.
pub struct AltKeypair {
    keypair: Keypair,
}

impl fmt::Debug for AltKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AltKeypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

impl AltKeypair {
    /// Generates a fresh random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    /// Parses signing material.
    ///
    /// Accepts a base58 64-byte secret key (seed followed by public key), a
    /// base58 32-byte seed, or a JSON byte array of either length.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the material cannot be decoded or the
    /// embedded public key does not match the seed.
    pub fn parse(secret: &str) -> GatewayResult<Self> {
        let secret = secret.trim();
        let bytes: Vec<u8> = if secret.starts_with('[') {
            serde_json::from_str(secret)
                .map_err(|e| GatewayError::configuration(format!("invalid key array: {e}")))?
        } else {
            bs58::decode(secret)
                .into_vec()
                .map_err(|e| GatewayError::configuration(format!("invalid base58 key: {e}")))?
        };
        Self::from_bytes(&bytes)
    }

    /// Builds a keypair from 32 seed bytes or 64 keypair bytes.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for any other length or a mismatched keypair.
    pub fn from_bytes(bytes: &[u8]) -> GatewayResult<Self> {
        let keypair = match bytes.len() {
            64 => {
                let keypair = Keypair::try_from(bytes)
                    .map_err(|e| GatewayError::configuration(format!("invalid keypair: {e}")))?;
                let public = keypair.pubkey().to_bytes();
                if bytes.get(32..) != Some(&public[..]) {
                    return Err(GatewayError::configuration(
                        "keypair public half does not match its seed",
                    ));
                }
                keypair
            }
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(bytes);
                Keypair::new_from_array(seed)
            }
            n => {
                return Err(GatewayError::configuration(format!(
                    "secret key must be 32 or 64 bytes, got {n}"
                )));
            }
        };
        Ok(Self { keypair })
    }

    /// Public key.
    #[must_use]
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Base58 64-byte secret key, the format [`AltKeypair::parse`] reads.
    #[must_use]
    pub fn to_base58_string(&self) -> String {
        self.keypair.to_base58_string()
    }

    /// Signs arbitrary bytes.
    #[must_use]
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

/// Checks a base58 ed25519 signature of `message` by `address`.
///
/// A well-formed signature that does not match yields `Ok(false)`.
///
/// # Errors
///
/// Returns `InvalidAddress` for a bad address and `Decode` for a signature
/// that is not 64 base58 bytes.
pub fn verify_message(address: &str, message: &[u8], signature: &str) -> GatewayResult<bool> {
    let signer = parse_pubkey(address)?;
    let raw = bs58::decode(signature.trim())
        .into_vec()
        .map_err(|e| GatewayError::decode(format!("signature: {e}")))?;
    let signature = ed25519_dalek::Signature::from_slice(&raw)
        .map_err(|e| GatewayError::decode(format!("signature: {e}")))?;
    let Ok(key) = VerifyingKey::from_bytes(&signer.to_bytes()) else {
        return Ok(false);
    };
    Ok(key.verify(message, &signature).is_ok())
}

/// Commitment level for reads and confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Seen by the connected node.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted.
    Finalized,
}

impl Commitment {
    /// JSON-RPC name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Returns true if a reported confirmation status meets this level.
    #[must_use]
    pub fn is_reached_by(&self, status: &str) -> bool {
        status
            .parse::<Self>()
            .is_ok_and(|reached| reached >= *self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(format!("unknown commitment: {other}")),
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Base64 wire encoding of an unsigned legacy message paid by `payer`.
///
/// # Errors
///
/// Returns `Decode` for a malformed blockhash.
pub fn encode_message(
    payer: &Pubkey,
    instructions: &[Instruction],
    recent_blockhash: &str,
) -> GatewayResult<String> {
    let blockhash = Hash::from_str(recent_blockhash)
        .map_err(|_| GatewayError::decode(format!("invalid blockhash: {recent_blockhash}")))?;
    let message = Message::new_with_blockhash(instructions, Some(payer), &blockhash);
    Ok(BASE64.encode(message.serialize()))
}

/// Builds a legacy transaction paid and signed by `payer` and returns
/// `(signature, wire bytes)`.
///
/// # Errors
///
/// Returns `Decode` for a malformed blockhash, `Unsupported` if the
/// instructions need a signer other than the payer, and `Authorization` if
/// signing fails.
pub fn sign_transaction(
    payer: &AltKeypair,
    instructions: &[Instruction],
    recent_blockhash: &str,
) -> GatewayResult<(String, Vec<u8>)> {
    let blockhash = Hash::from_str(recent_blockhash)
        .map_err(|_| GatewayError::decode(format!("invalid blockhash: {recent_blockhash}")))?;
    let message = Message::new_with_blockhash(instructions, Some(&payer.pubkey()), &blockhash);
    if message.header.num_required_signatures != 1 {
        return Err(GatewayError::terminal(
            TerminalReason::Unsupported,
            "only single-signer transactions are supported",
        ));
    }

    let mut tx = Transaction::new_unsigned(message);
    tx.try_sign(&[&payer.keypair], blockhash)
        .map_err(|e| GatewayError::terminal(TerminalReason::Authorization, e.to_string()))?;
    let signature = tx
        .signatures
        .first()
        .map(ToString::to_string)
        .ok_or_else(|| GatewayError::decode("signed transaction has no signature"))?;
    let wire = bincode::serialize(&tx)
        .map_err(|e| GatewayError::decode(format!("transaction encoding: {e}")))?;
    Ok((signature, wire))
}

// ============================================================================
// JSON-RPC client
// ============================================================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignatureStatus {
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    owner: String,
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedToken,
}

#[derive(Debug, Deserialize)]
struct ParsedToken {
    info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
    decimals: u8,
}

/// Solana JSON-RPC client over `reqwest`.
#[derive(Debug)]
pub struct SolanaRpcClient {
    http: reqwest::Client,
    endpoint: String,
    commitment: Commitment,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        commitment: Commitment,
        request_timeout: Duration,
    ) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::configuration(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            commitment,
            next_id: AtomicU64::new(1),
        })
    }

    /// Commitment used for reads and preflight.
    #[must_use]
    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> GatewayResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, endpoint = %self.endpoint, "solana rpc request");

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_http(method, &e))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(GatewayError::transient(format!("{method}: HTTP {status}")));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::decode(format!("{method}: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(GatewayError::from_rpc_message(format!(
                "{method}: {} (code {})",
                error.message, error.code
            )));
        }
        parsed
            .result
            .ok_or_else(|| GatewayError::decode(format!("{method}: missing result")))
    }

    fn config(&self) -> Value {
        json!({ "commitment": self.commitment.as_str() })
    }
}

fn classify_http(method: &str, e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GatewayError::transient(format!("{method}: {e}"))
    } else if e.is_decode() {
        GatewayError::decode(format!("{method}: {e}"))
    } else {
        GatewayError::from_rpc_message(format!("{method}: {e}"))
    }
}

#[async_trait]
impl AltConnection for SolanaRpcClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn balance(&self, address: &str) -> GatewayResult<u64> {
        let resp: WithContext<u64> = self
            .rpc("getBalance", json!([address, self.config()]))
            .await?;
        Ok(resp.value)
    }

    async fn token_accounts(&self, owner: &str, mint: &str) -> GatewayResult<Vec<TokenAccount>> {
        let resp: WithContext<Vec<KeyedAccount>> = self
            .rpc(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "mint": mint },
                    { "encoding": "jsonParsed", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;

        resp.value
            .into_iter()
            .map(|keyed| {
                let amount = &keyed.account.data.parsed.info.token_amount;
                Ok(TokenAccount {
                    address: keyed.pubkey,
                    program_id: keyed.account.owner,
                    amount: amount.amount.parse().map_err(|_| {
                        GatewayError::decode(format!("token amount: {}", amount.amount))
                    })?,
                    decimals: amount.decimals,
                })
            })
            .collect()
    }

    async fn latest_blockhash(&self) -> GatewayResult<BlockhashContext> {
        let resp: WithContext<LatestBlockhash> = self
            .rpc("getLatestBlockhash", json!([self.config()]))
            .await?;
        Ok(BlockhashContext {
            blockhash: resp.value.blockhash,
            last_valid_block_height: resp.value.last_valid_block_height,
        })
    }

    async fn send_transaction(&self, wire: &[u8]) -> GatewayResult<String> {
        self.rpc(
            "sendTransaction",
            json!([
                BASE64.encode(wire),
                { "encoding": "base64", "preflightCommitment": self.commitment.as_str() }
            ]),
        )
        .await
    }

    async fn signature_status(
        &self,
        signature: &str,
        search_history: bool,
    ) -> GatewayResult<Option<SignatureStatus>> {
        let resp: WithContext<Vec<Option<RawSignatureStatus>>> = self
            .rpc(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": search_history }]),
            )
            .await?;

        Ok(resp.value.into_iter().next().flatten().map(|raw| SignatureStatus {
            slot: raw.slot,
            confirmation_status: raw.confirmation_status,
            err: raw.err.filter(|v| !v.is_null()).map(|v| v.to_string()),
        }))
    }

    async fn block_height(&self) -> GatewayResult<u64> {
        self.rpc("getBlockHeight", json!([self.config()])).await
    }

    async fn fee_for_message(&self, message: &str) -> GatewayResult<Option<u64>> {
        let resp: WithContext<Option<u64>> = self
            .rpc("getFeeForMessage", json!([message, self.config()]))
            .await?;
        Ok(resp.value)
    }

    async fn slot(&self) -> GatewayResult<u64> {
        self.rpc("getSlot", json!([self.config()])).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn keypair() -> AltKeypair {
        AltKeypair::from_bytes(&[7u8; 32]).unwrap()
    }

    fn client_for(server: &MockServer) -> SolanaRpcClient {
        SolanaRpcClient::new(server.uri(), Commitment::Confirmed, Duration::from_secs(5)).unwrap()
    }

    async fn mock_result(server: &MockServer, rpc_method: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": result,
            })))
            .mount(server)
            .await;
    }

    const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
    const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    fn blockhash() -> String {
        bs58::encode([3u8; 32]).into_string()
    }

    #[test]
    fn pubkey_rejects_bad_input() {
        let err = parse_pubkey("not-base58!").unwrap_err();
        assert_eq!(err.terminal_reason(), Some(TerminalReason::InvalidAddress));
        let short = bs58::encode([1u8; 31]).into_string();
        assert!(parse_pubkey(&short).is_err());
        assert_eq!(parse_pubkey(&format!(" {SYSTEM_PROGRAM} ")).unwrap(), key(0));
    }

    #[test]
    fn keypair_formats_agree() {
        let seed_only = keypair();
        let mut full = [7u8; 64];
        full[32..].copy_from_slice(&seed_only.pubkey().to_bytes());

        let from_base58 = AltKeypair::parse(&bs58::encode(full).into_string()).unwrap();
        let from_json = AltKeypair::parse(&serde_json::to_string(&full.to_vec()).unwrap()).unwrap();
        let from_seed = AltKeypair::parse(&bs58::encode([7u8; 32]).into_string()).unwrap();

        assert_eq!(from_base58.pubkey(), seed_only.pubkey());
        assert_eq!(from_json.pubkey(), seed_only.pubkey());
        assert_eq!(from_seed.pubkey(), seed_only.pubkey());
        assert_eq!(seed_only.to_base58_string(), bs58::encode(full).into_string());
    }

    #[test]
    fn keypair_rejects_mismatched_public_half() {
        let mut full = [7u8; 64];
        full[32..].copy_from_slice(&[9u8; 32]);
        assert!(AltKeypair::from_bytes(&full).is_err());
        assert!(AltKeypair::from_bytes(&[1u8; 10]).is_err());
    }

    #[test]
    fn generated_keypair_survives_export() {
        let generated = AltKeypair::generate();
        let restored = AltKeypair::parse(&generated.to_base58_string()).unwrap();
        assert_eq!(restored.pubkey(), generated.pubkey());
    }

    #[test]
    fn message_signature_verifies_for_signer_only() {
        let kp = keypair();
        let signature = kp.sign_message(b"omnichain login").to_string();
        let address = kp.pubkey().to_string();

        assert!(verify_message(&address, b"omnichain login", &signature).unwrap());
        assert!(!verify_message(&address, b"omnichain logout", &signature).unwrap());
        assert!(!verify_message(&key(2).to_string(), b"omnichain login", &signature).unwrap());
        assert!(matches!(
            verify_message(&address, b"x", "abc"),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn commitment_ordering() {
        assert!(Commitment::Confirmed.is_reached_by("finalized"));
        assert!(Commitment::Confirmed.is_reached_by("confirmed"));
        assert!(!Commitment::Confirmed.is_reached_by("processed"));
        assert!(!Commitment::Finalized.is_reached_by("bogus"));
    }

    #[test]
    fn native_transfer_transaction_is_signed_by_payer() {
        use ed25519_dalek::Signature as DalekSignature;

        let kp = keypair();
        let payer = kp.pubkey();
        let ix = solana_system_interface::instruction::transfer(&payer, &key(2), 1_000);
        let (signature, wire) = sign_transaction(&kp, &[ix], &blockhash()).unwrap();

        let tx: Transaction = bincode::deserialize(&wire).unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.signatures[0].to_string(), signature);
        assert_eq!(
            tx.message.account_keys,
            vec![payer, key(2), parse_pubkey(SYSTEM_PROGRAM).unwrap()]
        );
        assert_eq!(tx.message.recent_blockhash.to_string(), blockhash());

        let sig = DalekSignature::from_slice(tx.signatures[0].as_ref()).unwrap();
        let vk = VerifyingKey::from_bytes(&payer.to_bytes()).unwrap();
        assert!(vk.verify(&tx.message_data(), &sig).is_ok());
    }

    #[test]
    fn token_transfer_owner_is_the_payer() {
        let kp = keypair();
        let payer = kp.pubkey();
        let program = parse_pubkey(TOKEN_PROGRAM).unwrap();
        let ix = spl_token_2022_interface::instruction::transfer_checked(
            &program,
            &key(10),
            &key(11),
            &key(12),
            &payer,
            &[],
            5,
            6,
        )
        .unwrap();
        let (_, wire) = sign_transaction(&kp, &[ix], &blockhash()).unwrap();

        let tx: Transaction = bincode::deserialize(&wire).unwrap();
        assert_eq!(tx.message.header.num_required_signatures, 1);
        assert_eq!(tx.message.account_keys[0], payer);
        assert!(tx.message.account_keys.contains(&program));
    }

    #[test]
    fn foreign_signer_is_unsupported() {
        let kp = keypair();
        let ix = solana_system_interface::instruction::transfer(&key(4), &key(2), 1);
        let err = sign_transaction(&kp, &[ix], &blockhash()).unwrap_err();
        assert_eq!(err.terminal_reason(), Some(TerminalReason::Unsupported));
    }

    #[test]
    fn malformed_blockhash_is_decode_error() {
        let ix = solana_system_interface::instruction::transfer(&keypair().pubkey(), &key(2), 1);
        let err = sign_transaction(&keypair(), &[ix], "0OIl").unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn rpc_balance_and_blockhash() {
        let server = MockServer::start().await;
        mock_result(&server, "getBalance", json!({ "context": { "slot": 1 }, "value": 2_500_000_000u64 })).await;
        mock_result(
            &server,
            "getLatestBlockhash",
            json!({
                "context": { "slot": 1 },
                "value": { "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N", "lastValidBlockHeight": 300 }
            }),
        )
        .await;

        let client = client_for(&server);
        assert_eq!(client.balance("addr").await.unwrap(), 2_500_000_000);
        let ctx = client.latest_blockhash().await.unwrap();
        assert_eq!(ctx.last_valid_block_height, 300);
    }

    #[tokio::test]
    async fn rpc_error_object_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32002, "message": "Transaction simulation failed: Blockhash not found" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).send_transaction(&[1, 2, 3]).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server).slot().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rpc_signature_status_and_token_accounts() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "getSignatureStatuses",
            json!({
                "context": { "slot": 9 },
                "value": [{ "slot": 9, "confirmations": 0, "err": null, "confirmationStatus": "confirmed" }]
            }),
        )
        .await;
        mock_result(
            &server,
            "getTokenAccountsByOwner",
            json!({
                "context": { "slot": 9 },
                "value": [{
                    "pubkey": "acct1",
                    "account": {
                        "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                        "data": { "parsed": { "info": { "tokenAmount": { "amount": "1500000", "decimals": 6 } } } }
                    }
                }]
            }),
        )
        .await;

        let client = client_for(&server);
        let status = client.signature_status("sig", false).await.unwrap().unwrap();
        assert_eq!(status.confirmation_status.as_deref(), Some("confirmed"));
        assert_eq!(status.err, None);

        let accounts = client.token_accounts("owner", "mint").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].amount, 1_500_000);
        assert_eq!(accounts[0].decimals, 6);
    }

    #[tokio::test]
    async fn rpc_fee_for_expired_message_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getFeeForMessage", "params": ["AQAB"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "context": { "slot": 9 }, "value": null },
            })))
            .mount(&server)
            .await;
        mock_result(&server, "getFeeForMessage", json!({ "context": { "slot": 9 }, "value": 5000 })).await;

        let client = client_for(&server);
        assert_eq!(client.fee_for_message("AQAB").await.unwrap(), None);
        assert_eq!(client.fee_for_message("AQAC").await.unwrap(), Some(5_000));
    }
}
