//! Command-line front end for the omnichain gateway.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use omnichain::application::Gateway;
use omnichain::config::{AppConfig, LogConfig, LogFormat};
use omnichain::domain::{ChainKey, OperationOutput, OperationRequest, ProtocolFamily};
use omnichain::infrastructure::blockchain::{AltKeypair, GeneratedWallet};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Omnichain CLI
#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-chain dispatch over EVM chains and Solana")]
struct Cli {
    /// Configuration file (overrides OMNICHAIN_CONFIG_FILE)
    #[arg(long)]
    config: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    command: Command,
}

/// CLI commands
#[derive(Subcommand, Debug)]
enum Command {
    /// List registered chains
    Chains,

    /// Query a native or token balance
    Balance {
        /// Chain key, e.g. BASE or SOLANA
        chain: String,
        /// Account to query
        address: String,
        /// Token contract or mint
        #[arg(long)]
        token: Option<String>,
    },

    /// Native balance on every registered chain
    Sweep {
        /// EVM address to query
        evm_address: String,
        /// Solana address (defaults to the configured key's address)
        #[arg(long)]
        alt_address: Option<String>,
    },

    /// Send native currency or tokens
    Transfer {
        /// Chain key
        chain: String,
        /// Recipient
        to: String,
        /// Amount in base units (wei, lamports, token units)
        amount: u128,
        /// Token contract or mint
        #[arg(long)]
        token: Option<String>,
        /// Endpoint override for this request
        #[arg(long)]
        rpc: Option<String>,
    },

    /// Token name, symbol and decimals
    Token {
        /// Chain key
        chain: String,
        /// Token contract
        token: String,
    },

    /// Amount `spender` may move on behalf of `owner`
    Allowance {
        /// Chain key
        chain: String,
        /// Token contract
        token: String,
        /// Token holder
        owner: String,
        /// Approved spender
        spender: String,
    },

    /// Approve a spender for a token amount
    Approve {
        /// Chain key
        chain: String,
        /// Token contract
        token: String,
        /// Spender to approve
        spender: String,
        /// Amount in token units
        amount: u128,
    },

    /// Look up a transaction by hash or signature
    Tx {
        /// Chain key
        chain: String,
        /// Transaction hash or signature
        hash: String,
    },

    /// Estimate the fee of a native transfer
    Fee {
        /// Chain key
        chain: String,
        /// Recipient
        to: String,
        /// Amount in base units
        amount: u128,
    },

    /// Sign a message with the configured key
    Sign {
        /// `evm` or `alt`
        family: String,
        /// Message text
        message: String,
    },

    /// Generate a fresh key pair
    NewWallet {
        /// `evm` or `alt`
        family: String,
    },

    /// Probe each configured family
    Health,
}

#[derive(Serialize)]
struct ChainRow<'a> {
    key: &'a str,
    name: &'a str,
    family: String,
    network: String,
    rpc_url: &'a str,
    multicall: bool,
}

fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.include_target)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(config.include_target)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn parse_family(family: &str) -> Result<ProtocolFamily> {
    match family.to_ascii_lowercase().as_str() {
        "evm" => Ok(ProtocolFamily::Evm),
        "alt" | "solana" => Ok(ProtocolFamily::Alt),
        other => bail!("unknown family {other:?}, expected evm or alt"),
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_output(output: &OperationOutput) -> Result<()> {
    match output {
        OperationOutput::Transaction(tx) => print_json(tx),
        OperationOutput::Balance(balance) => print_json(&serde_json::json!({
            "raw": balance.raw.to_string(),
            "decimals": balance.decimals,
            "symbol": balance.symbol,
            "display": balance.to_string(),
        })),
        OperationOutput::Call(tokens) => {
            println!("{tokens:?}");
            Ok(())
        }
        OperationOutput::Token(info) => print_json(info),
        OperationOutput::Lookup(lookup) => print_json(lookup),
    }
}

async fn run_single(gateway: &Gateway, request: OperationRequest) -> Result<()> {
    let result = gateway.dispatcher().execute(request).await?;
    match result.outcome {
        Ok(output) => print_output(&output),
        Err(e) => bail!("{} on {}: {e}", result.target, result.chain),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = AppConfig::from_file(path)
                .with_context(|| format!("loading configuration from {path}"))?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        }
        None => AppConfig::load().context("loading configuration")?,
    };
    config.validate().context("validating configuration")?;
    init_logging(&config.log);

    if let Command::NewWallet { family } = &cli.command {
        return match parse_family(family)? {
            ProtocolFamily::Evm => {
                let wallet = GeneratedWallet::random();
                print_json(&serde_json::json!({
                    "address": wallet.address,
                    "private_key": wallet.private_key,
                }))
            }
            ProtocolFamily::Alt => {
                let keypair = AltKeypair::generate();
                print_json(&serde_json::json!({
                    "address": keypair.pubkey().to_string(),
                    "private_key": keypair.to_base58_string(),
                }))
            }
        };
    }

    let gateway = Gateway::from_config(&config).context("building gateway")?;

    match cli.command {
        Command::Chains => {
            let registry = gateway.registry();
            let rows: Vec<ChainRow<'_>> = registry
                .all()
                .map(|c| ChainRow {
                    key: c.key().as_str(),
                    name: c.name(),
                    family: c.family().to_string(),
                    network: c.network().to_string(),
                    rpc_url: c.rpc_url(),
                    multicall: registry.aggregator_for(c).is_some(),
                })
                .collect();
            print_json(&rows)
        }
        Command::Balance {
            chain,
            address,
            token,
        } => {
            let request = match token {
                Some(token) => OperationRequest::token_balance(chain, token, address),
                None => OperationRequest::native_balance(chain, address),
            };
            run_single(&gateway, request).await
        }
        Command::Sweep {
            evm_address,
            alt_address,
        } => {
            let balances = gateway
                .batch()
                .sweep_native_balances(&evm_address, alt_address.as_deref())
                .await?;
            let rows: Vec<_> = balances
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "chain": b.chain,
                        "address": b.address,
                        "balance": b.balance.to_string(),
                    })
                })
                .collect();
            print_json(&rows)
        }
        Command::Transfer {
            chain,
            to,
            amount,
            token,
            rpc,
        } => {
            let mut request = match token {
                Some(token) => OperationRequest::token_transfer(chain, token, to, amount),
                None => OperationRequest::native_transfer(chain, to, amount),
            };
            if let Some(rpc) = rpc {
                request = request.with_rpc_override(rpc);
            }
            run_single(&gateway, request).await
        }
        Command::Token { chain, token } => {
            run_single(&gateway, OperationRequest::token_metadata(chain, token)).await
        }
        Command::Allowance {
            chain,
            token,
            owner,
            spender,
        } => {
            run_single(
                &gateway,
                OperationRequest::token_allowance(chain, token, owner, spender),
            )
            .await
        }
        Command::Approve {
            chain,
            token,
            spender,
            amount,
        } => {
            run_single(
                &gateway,
                OperationRequest::token_approval(chain, token, spender, amount),
            )
            .await
        }
        Command::Tx { chain, hash } => {
            run_single(&gateway, OperationRequest::transaction_status(chain, hash)).await
        }
        Command::Fee { chain, to, amount } => {
            let estimate = gateway
                .estimate_transfer_fee(&ChainKey::new(chain), &to, amount)
                .await?;
            print_json(&estimate)
        }
        Command::Sign { family, message } => {
            let signature = gateway
                .sign_message(parse_family(&family)?, message.as_bytes())
                .await?;
            println!("{signature}");
            Ok(())
        }
        Command::NewWallet { .. } => Ok(()),
        Command::Health => {
            let report = gateway.health_check().await;
            print_json(&report)?;
            if !report.is_healthy() {
                bail!("one or more families are unhealthy");
            }
            Ok(())
        }
    }
}
