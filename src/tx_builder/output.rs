//! Fully signed transaction ready for submission

use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use crate::tx_builder::context::FreshnessToken;
use crate::tx_builder::errors::AssemblyError;

/// A message with every required signature attached
///
/// Only the multi-signer constructs these, so `signatures[0]` is always
/// the payer's signature over the final message bytes. That signature is
/// the transaction id and is known before anything touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: VersionedTransaction,
    required_signers: Vec<Pubkey>,
    freshness: FreshnessToken,
}

impl SignedTransaction {
    pub(crate) fn new(tx: VersionedTransaction, required_signers: Vec<Pubkey>, freshness: FreshnessToken) -> Self {
        Self {
            tx,
            required_signers,
            freshness,
        }
    }

    /// Precomputed transaction id (payer signature)
    pub fn transaction_id(&self) -> Signature {
        self.tx.signatures[0]
    }

    pub fn tx_ref(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }

    pub fn freshness(&self) -> &FreshnessToken {
        &self.freshness
    }

    /// Serialized wire bytes
    pub fn wire_bytes(&self) -> Result<Vec<u8>, AssemblyError> {
        bincode::serialize(&self.tx).map_err(|e| AssemblyError::Serialization { reason: e.to_string() })
    }

    pub fn to_base64(&self) -> Result<String, AssemblyError> {
        Ok(STANDARD.encode(self.wire_bytes()?))
    }

    pub fn into_tx(self) -> VersionedTransaction {
        self.tx
    }
}
