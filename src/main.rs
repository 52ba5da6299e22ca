//! txpipe command line
//!
//! Thin front end over the library pipeline: derive addresses, send
//! multi-signer transfers, create tokens and NFTs, look up status.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_program,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txpipe::config::Config;
use txpipe::metrics::PipelineMetrics;
use txpipe::rpc::SolanaRpc;
use txpipe::tx_builder::metadata::Attribute;
use txpipe::tx_builder::{
    ChainPolicy, ContentStore, Effect, HttpContentStore, LocalSigner, MetadataDocument,
    MetadataUri, PlannedEffect, SubmissionOutcome, TokenMetadata, TransactionAssembler, TransactionRequest,
    TxPipeline, MINT_ACCOUNT_SPACE,
};
use txpipe::wallet;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "txpipe.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    dump_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive a program address from seeds (str:, pubkey:, hex:, u64: prefixes)
    Derive {
        #[arg(long)]
        program: String,
        #[arg(long = "seed", required = true)]
        seeds: Vec<String>,
    },

    /// Fund a temporary account, pay the recipient from it, optionally sweep
    /// the remainder back, all in one transaction
    Transfer {
        #[arg(long)]
        to: String,
        #[arg(long)]
        lamports: u64,
        #[arg(long)]
        sweep: bool,
    },

    /// Create a mint with metadata, then mint to the payer and an optional recipient
    CreateToken(TokenArgs),

    /// Upload a metadata document and mint a single non-fungible token
    CreateNft(NftArgs),

    /// Look up the status of a transaction
    Status { signature: String },

    /// Show the balance of an account (defaults to the payer)
    Balance { address: Option<String> },
}

#[derive(ClapArgs, Debug)]
struct TokenArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    symbol: String,
    #[arg(long)]
    uri: String,
    #[arg(long, default_value_t = 9)]
    decimals: u8,
    /// Base units minted to the payer
    #[arg(long)]
    amount: u64,
    #[arg(long)]
    recipient: Option<String>,
    /// Base units minted to the recipient
    #[arg(long, default_value_t = 0)]
    recipient_amount: u64,
    /// Override the configured chain policy
    #[arg(long)]
    chain_policy: Option<ChainPolicy>,
}

#[derive(ClapArgs, Debug)]
struct NftArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    symbol: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    image: Option<String>,
    /// trait=value, repeatable
    #[arg(long = "attribute")]
    attributes: Vec<String>,
    #[arg(long, default_value_t = 1000)]
    seller_fee_bps: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    init_logging(&config, args.verbose, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), rpc = %config.rpc.url, "txpipe starting");

    let metrics = PipelineMetrics::new()?;
    let result = run(&args, &config, metrics.clone()).await;

    if args.dump_metrics {
        println!("{}", metrics.gather_text()?);
    }
    result
}

/// Initialize logging subsystem
fn init_logging(config: &Config, verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "txpipe=debug,info".to_string()
    } else {
        config.logging.filter.clone()
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        Config::from_env()
    }
}

fn build_pipeline(config: &Config, metrics: PipelineMetrics) -> Result<TxPipeline<SolanaRpc>> {
    let commitment = config.rpc.commitment_config()?;
    let rpc = SolanaRpc::new(config.rpc.url.clone(), config.rpc.timeout(), commitment)
        .with_skip_preflight(config.rpc.skip_preflight);

    let assembler = TransactionAssembler::new()
        .with_version(config.assembly.message_version)
        .with_size_limit(config.assembly.size_limit)
        .with_compute_budget(config.assembly.compute_budget);

    let mut pipeline = TxPipeline::new(Arc::new(rpc))
        .with_assembler(assembler)
        .with_submit_timeout(config.submission.timeout())
        .with_confirmation(config.submission.confirm_poll_interval(), config.submission.confirm_max_polls)
        .with_metrics(metrics);

    if config.assembly.disable_account_inference {
        pipeline = pipeline.without_account_inference();
    }

    if let Some(url) = &config.metadata.content_store_url {
        let mut store = HttpContentStore::new(url.clone(), Duration::from_secs(config.metadata.upload_timeout_secs))?;
        if let Some(token) = &config.metadata.auth_token {
            store = store.with_auth_token(token.clone());
        }
        let store: Arc<dyn ContentStore> = Arc::new(store);
        pipeline = pipeline.with_content_store(store);
    }

    Ok(pipeline)
}

async fn run(args: &Args, config: &Config, metrics: PipelineMetrics) -> Result<()> {
    // Derivation is offline; everything else needs the pipeline
    if let Command::Derive { program, seeds } = &args.command {
        return derive(program, seeds);
    }
    let pipeline = build_pipeline(config, metrics)?;

    match &args.command {
        Command::Derive { .. } => Ok(()),
        Command::Transfer { to, lamports, sweep } => {
            let payer = load_payer(config)?;
            transfer(&pipeline, payer, parse_pubkey(to)?, *lamports, *sweep).await
        }
        Command::CreateToken(token) => {
            let payer = load_payer(config)?;
            let policy = token.chain_policy.unwrap_or(config.submission.chain_policy);
            create_token(&pipeline, payer, token, policy).await
        }
        Command::CreateNft(nft) => {
            let payer = load_payer(config)?;
            create_nft(&pipeline, payer, nft).await
        }
        Command::Status { signature } => {
            let signature = Signature::from_str(signature).context("Invalid signature")?;
            match pipeline.status(&signature).await? {
                Some(status) => println!("{}: {:?}", signature, status),
                None => println!("{}: not found", signature),
            }
            Ok(())
        }
        Command::Balance { address } => {
            let account = match address {
                Some(address) => parse_pubkey(address)?,
                None => load_payer(config)?.pubkey(),
            };
            let lamports = pipeline.balance(&account).await?;
            println!("{}: {} lamports", account, lamports);
            Ok(())
        }
    }
}

fn load_payer(config: &Config) -> Result<Keypair> {
    let path = wallet::expand_home(&config.signer.keypair_path);
    let keypair = wallet::load_keypair(&path)?;
    info!(payer = %keypair.pubkey(), "Fee payer loaded");
    Ok(keypair)
}

fn parse_pubkey(value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("Invalid public key: {}", value))
}

fn parse_seed(raw: &str) -> Result<Vec<u8>> {
    let Some((kind, value)) = raw.split_once(':') else {
        return Ok(raw.as_bytes().to_vec());
    };
    match kind {
        "str" => Ok(value.as_bytes().to_vec()),
        "pubkey" => Ok(parse_pubkey(value)?.to_bytes().to_vec()),
        "hex" => hex::decode(value).with_context(|| format!("Invalid hex seed: {}", value)),
        "u64" => Ok(value
            .parse::<u64>()
            .with_context(|| format!("Invalid u64 seed: {}", value))?
            .to_le_bytes()
            .to_vec()),
        other => bail!("Unknown seed kind '{}'", other),
    }
}

fn derive(program: &str, seeds: &[String]) -> Result<()> {
    let program = parse_pubkey(program)?;
    let seeds = seeds.iter().map(|s| parse_seed(s)).collect::<Result<Vec<_>>>()?;
    let seed_refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();

    let derived = txpipe::tx_builder::AddressDeriver::new().derive(&seed_refs, &program)?;
    println!("address: {}", derived.address);
    println!("bump:    {}", derived.bump);
    Ok(())
}

fn report(outcome: &SubmissionOutcome) {
    match outcome {
        SubmissionOutcome::Accepted(sig) => println!("accepted: {}", sig),
        SubmissionOutcome::Recovered(sig) => println!("recovered after ambiguous failure: {}", sig),
        SubmissionOutcome::Unknown { expected, failure } => {
            warn!(raw = %failure.raw, "Submission outcome unknown");
            println!("unknown outcome, check status of: {}", expected);
        }
    }
}

async fn transfer(
    pipeline: &TxPipeline<SolanaRpc>,
    payer: Keypair,
    to: Pubkey,
    lamports: u64,
    sweep: bool,
) -> Result<()> {
    let temp = Keypair::new();
    let rent = pipeline.rent_exempt_lamports(0).await?;
    let payer_key = payer.pubkey();
    let temp_key = temp.pubkey();

    let mut request = TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "fund-temp",
            Effect::CreateAccount {
                new_account: temp_key,
                lamports: rent + lamports,
                space: 0,
                owner: system_program::id(),
            },
        ))
        .with_effect(PlannedEffect::new(
            "pay",
            Effect::Transfer {
                from: temp_key,
                to,
                lamports,
            },
        ))
        .with_signer(Arc::new(LocalSigner::new(payer)))
        .with_signer(Arc::new(LocalSigner::new(temp)));

    if sweep {
        // Whatever the transfer left behind; known when the message is built
        request = request.with_effect(
            PlannedEffect::new(
                "sweep",
                Effect::Transfer {
                    from: temp_key,
                    to: payer_key,
                    lamports: rent,
                },
            )
            .after("pay"),
        );
    }

    info!(temp = %temp_key, to = %to, lamports, sweep, "Submitting temp-account transfer");
    let outcome = pipeline.execute(request).await?;
    report(&outcome);
    Ok(())
}

async fn create_token(
    pipeline: &TxPipeline<SolanaRpc>,
    payer: Keypair,
    args: &TokenArgs,
    policy: ChainPolicy,
) -> Result<()> {
    let mint = Keypair::new();
    let mint_key = mint.pubkey();
    let payer_key = payer.pubkey();
    let rent = pipeline.rent_exempt_lamports(MINT_ACCOUNT_SPACE as usize).await?;

    let payer: Arc<LocalSigner> = Arc::new(LocalSigner::new(payer));
    let metadata = TokenMetadata::new(&args.name, &args.symbol, MetadataUri::Resolved(args.uri.clone()));
    metadata.validate()?;

    let create = TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "create-mint",
            Effect::CreateAccount {
                new_account: mint_key,
                lamports: rent,
                space: MINT_ACCOUNT_SPACE,
                owner: spl_token::id(),
            },
        ))
        .with_effect(PlannedEffect::new(
            "initialize-mint",
            Effect::InitializeMint {
                mint: mint_key,
                decimals: args.decimals,
                mint_authority: payer_key,
                freeze_authority: Some(payer_key),
            },
        ))
        .with_effect(PlannedEffect::new(
            "metadata",
            Effect::CreateMetadata {
                mint: mint_key,
                mint_authority: payer_key,
                update_authority: payer_key,
                metadata,
            },
        ))
        .with_signer(payer.clone())
        .with_signer(Arc::new(LocalSigner::new(mint)));

    let mut distribute = TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "payer-account",
            Effect::CreateAssociatedAccount {
                wallet: payer_key,
                mint: mint_key,
                idempotent: true,
            },
        ))
        .with_effect(PlannedEffect::new(
            "mint-payer",
            Effect::MintTo {
                mint: mint_key,
                wallet: payer_key,
                mint_authority: payer_key,
                amount: args.amount,
            },
        ))
        .with_signer(payer);

    if let Some(recipient) = &args.recipient {
        let recipient = parse_pubkey(recipient)?;
        distribute = distribute
            .with_effect(PlannedEffect::new(
                "recipient-account",
                Effect::CreateAssociatedAccount {
                    wallet: recipient,
                    mint: mint_key,
                    idempotent: true,
                },
            ))
            .with_effect(PlannedEffect::new(
                "mint-recipient",
                Effect::MintTo {
                    mint: mint_key,
                    wallet: recipient,
                    mint_authority: payer_key,
                    amount: args.recipient_amount,
                },
            ));
    }

    info!(mint = %mint_key, policy = ?policy, "Creating token");
    let outcomes = pipeline.execute_chain(vec![create, distribute], policy).await?;
    println!("mint: {}", mint_key);
    outcomes.iter().for_each(report);
    Ok(())
}

async fn create_nft(pipeline: &TxPipeline<SolanaRpc>, payer: Keypair, args: &NftArgs) -> Result<()> {
    let mint = Keypair::new();
    let mint_key = mint.pubkey();
    let payer_key = payer.pubkey();
    let rent = pipeline.rent_exempt_lamports(MINT_ACCOUNT_SPACE as usize).await?;

    let attributes = args
        .attributes
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(trait_type, value)| Attribute {
                    trait_type: trait_type.to_string(),
                    value: value.to_string(),
                })
                .with_context(|| format!("Attribute must be trait=value: {}", pair))
        })
        .collect::<Result<Vec<_>>>()?;

    let document = MetadataDocument {
        name: args.name.clone(),
        symbol: args.symbol.clone(),
        description: args.description.clone(),
        image: args.image.clone(),
        attributes,
    };
    let metadata = TokenMetadata::new(&args.name, &args.symbol, MetadataUri::Pending(document))
        .with_seller_fee(args.seller_fee_bps);
    metadata.validate()?;

    let request = TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "create-mint",
            Effect::CreateAccount {
                new_account: mint_key,
                lamports: rent,
                space: MINT_ACCOUNT_SPACE,
                owner: spl_token::id(),
            },
        ))
        .with_effect(PlannedEffect::new(
            "initialize-mint",
            Effect::InitializeMint {
                mint: mint_key,
                decimals: 0,
                mint_authority: payer_key,
                freeze_authority: Some(payer_key),
            },
        ))
        .with_effect(PlannedEffect::new(
            "metadata",
            Effect::CreateMetadata {
                mint: mint_key,
                mint_authority: payer_key,
                update_authority: payer_key,
                metadata,
            },
        ))
        .with_effect(PlannedEffect::new(
            "owner-account",
            Effect::CreateAssociatedAccount {
                wallet: payer_key,
                mint: mint_key,
                idempotent: true,
            },
        ))
        .with_effect(PlannedEffect::new(
            "mint-one",
            Effect::MintTo {
                mint: mint_key,
                wallet: payer_key,
                mint_authority: payer_key,
                amount: 1,
            },
        ))
        .with_effect(
            PlannedEffect::new(
                "master-edition",
                Effect::CreateMasterEdition {
                    mint: mint_key,
                    update_authority: payer_key,
                    mint_authority: payer_key,
                    holder: payer_key,
                    max_supply: Some(0),
                },
            )
            .after("mint-one"),
        )
        .with_signer(Arc::new(LocalSigner::new(payer)))
        .with_signer(Arc::new(LocalSigner::new(mint)));

    info!(mint = %mint_key, "Creating NFT");
    let outcome = pipeline.execute(request).await?;
    println!("mint: {}", mint_key);
    report(&outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use txpipe::tx_builder::InstructionSequencer;

    #[test]
    fn test_parse_seed_kinds() {
        assert_eq!(parse_seed("str:vault").unwrap(), b"vault".to_vec());
        assert_eq!(parse_seed("vault").unwrap(), b"vault".to_vec());
        assert_eq!(parse_seed("hex:dead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(parse_seed("u64:1").unwrap(), 1u64.to_le_bytes().to_vec());

        let key = Pubkey::new_unique();
        assert_eq!(parse_seed(&format!("pubkey:{}", key)).unwrap(), key.to_bytes().to_vec());

        assert!(parse_seed("hex:zz").is_err());
        assert!(parse_seed("blob:1").is_err());
    }

    #[test]
    fn test_cli_parses_create_token() {
        let args = Args::try_parse_from([
            "txpipe",
            "create-token",
            "--name",
            "Monkey",
            "--symbol",
            "MOK",
            "--uri",
            "https://example.com/mok.json",
            "--amount",
            "100",
            "--chain-policy",
            "optimistic",
        ])
        .unwrap();

        match args.command {
            Command::CreateToken(token) => {
                assert_eq!(token.decimals, 9);
                assert_eq!(token.chain_policy, Some(ChainPolicy::Optimistic));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_sequencer_orders_cli_transfer() {
        // fund-temp must precede pay even when declared out of order
        let temp = Pubkey::new_unique();
        let effects = vec![
            PlannedEffect::new(
                "pay",
                Effect::Transfer {
                    from: temp,
                    to: Pubkey::new_unique(),
                    lamports: 1,
                },
            ),
            PlannedEffect::new(
                "fund-temp",
                Effect::CreateAccount {
                    new_account: temp,
                    lamports: 2,
                    space: 0,
                    owner: system_program::id(),
                },
            ),
        ];
        let ordered = InstructionSequencer::new(Default::default()).sequence(effects).unwrap();
        assert_eq!(ordered[0].label, "fund-temp");
    }
}
