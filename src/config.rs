//! Configuration loading
//!
//! TOML file, optional `.env`, then `TXPIPE_*` environment overrides.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};

use crate::tx_builder::assembler::{MessageVersion, PACKET_DATA_SIZE};
use crate::tx_builder::instructions::ComputeBudget;
use crate::tx_builder::pipeline::ChainPolicy;

pub const ENV_RPC_URL: &str = "TXPIPE_RPC_URL";
pub const ENV_KEYPAIR: &str = "TXPIPE_KEYPAIR";
pub const ENV_CHAIN_POLICY: &str = "TXPIPE_CHAIN_POLICY";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub signer: SignerConfig,

    #[serde(default)]
    pub assembly: AssemblyConfig,

    #[serde(default)]
    pub submission: SubmissionConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    #[serde(default)]
    pub skip_preflight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Path to the fee payer keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default)]
    pub message_version: MessageVersion,

    #[serde(default = "default_size_limit")]
    pub size_limit: usize,

    #[serde(default)]
    pub compute_budget: ComputeBudget,

    /// Order only by declared `after` labels
    #[serde(default)]
    pub disable_account_inference: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Single send attempt timeout in seconds
    #[serde(default = "default_submit_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub chain_policy: ChainPolicy,

    #[serde(default = "default_confirm_poll_interval")]
    pub confirm_poll_interval_ms: u64,

    #[serde(default = "default_confirm_max_polls")]
    pub confirm_max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// HTTP content store for metadata documents
    #[serde(default)]
    pub content_store_url: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.devnet.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_size_limit() -> usize { PACKET_DATA_SIZE }
fn default_submit_timeout() -> u64 { 30 }
fn default_confirm_poll_interval() -> u64 { 500 }
fn default_confirm_max_polls() -> u32 { 60 }
fn default_upload_timeout() -> u64 { 30 }
fn default_log_filter() -> String { "txpipe=info,warn".to_string() }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            timeout_secs: default_rpc_timeout(),
            commitment: default_commitment(),
            skip_preflight: false,
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            message_version: MessageVersion::default(),
            size_limit: default_size_limit(),
            compute_budget: ComputeBudget::default(),
            disable_account_inference: false,
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_submit_timeout(),
            chain_policy: ChainPolicy::default(),
            confirm_poll_interval_ms: default_confirm_poll_interval(),
            confirm_max_polls: default_confirm_max_polls(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            content_store_url: None,
            auth_token: None,
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl RpcConfig {
    pub fn commitment_config(&self) -> anyhow::Result<CommitmentConfig> {
        let commitment = CommitmentLevel::from_str(&self.commitment)
            .map_err(|_| anyhow::anyhow!("invalid commitment '{}'", self.commitment))?;
        Ok(CommitmentConfig { commitment })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SubmissionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus `.env` and environment overrides (no file)
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(path) = lookup(ENV_KEYPAIR) {
            self.signer.keypair_path = path;
        }
        if let Some(policy) = lookup(ENV_CHAIN_POLICY) {
            self.submission.chain_policy = ChainPolicy::from_str(&policy).map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.url.trim().is_empty() {
            bail!("rpc.url must not be empty");
        }
        self.rpc.commitment_config()?;
        if self.assembly.size_limit == 0 || self.assembly.size_limit > PACKET_DATA_SIZE {
            bail!(
                "assembly.size_limit must be in 1..={} (got {})",
                PACKET_DATA_SIZE,
                self.assembly.size_limit
            );
        }
        if self.submission.timeout_secs == 0 {
            bail!("submission.timeout_secs must be positive");
        }
        if self.submission.confirm_max_polls == 0 {
            bail!("submission.confirm_max_polls must be positive");
        }
        if let Some(url) = &self.metadata.content_store_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("metadata.content_store_url must be an http(s) url (got {})", url);
            }
        }
        Ok(())
    }
}
