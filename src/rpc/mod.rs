//! Network RPC collaborator
//!
//! The pipeline never talks to a node directly; it goes through
//! [`LedgerRpc`], owned by the caller and passed in explicitly.
//! [`SolanaRpc`] is the production implementation over the nonblocking
//! `solana-client` RPC client.

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

use crate::tx_builder::errors::SubmissionError;

pub mod classify;
pub mod errors;
pub mod solana;

pub use errors::LedgerRpcError;
pub use solana::SolanaRpc;

/// Observed status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Processed,
    Confirmed,
    Finalized,
    /// Landed but the transaction itself failed
    Failed(String),
}

impl SignatureStatus {
    /// Landed at confirmed commitment or better without error
    pub fn is_confirmed(&self) -> bool {
        matches!(self, SignatureStatus::Confirmed | SignatureStatus::Finalized)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SignatureStatus::Failed(_))
    }
}

/// Network operations the pipeline depends on
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Latest blockhash usable as a freshness token
    async fn latest_blockhash(&self) -> Result<Hash, LedgerRpcError>;

    /// Current stored value of a durable nonce account
    async fn nonce_value(&self, nonce_account: &Pubkey) -> Result<Hash, LedgerRpcError>;

    async fn minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64, LedgerRpcError>;

    async fn balance(&self, account: &Pubkey) -> Result<u64, LedgerRpcError>;

    /// Single submission attempt; resolves once the node accepts the
    /// transaction into its pending pool, with failures already classified
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SubmissionError>;

    /// `None` when the node has no record of the signature
    async fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, LedgerRpcError>;
}
