//! Signing providers and multi-party signature collection
//!
//! A transaction may need several signers (fee payer, freshly created
//! accounts, mint authorities). Each is backed by a [`SigningProvider`];
//! local keys, hardware wallets and remote signers all look the same to
//! the [`MultiSigner`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use thiserror::Error;
use tracing::debug;

use crate::tx_builder::assembler::UnsignedMessage;
use crate::tx_builder::errors::SignatureError;
use crate::tx_builder::output::SignedTransaction;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Something that can sign bytes as one public key
#[async_trait]
pub trait SigningProvider: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Sign the exact serialized message bytes
    async fn sign_bytes(&self, message: &[u8]) -> Result<Signature, ProviderError>;
}

/// In-process keypair
pub struct LocalSigner {
    keypair: Keypair,
}

impl LocalSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProviderError> {
        if bytes.len() != 64 {
            return Err(ProviderError(format!(
                "Invalid keypair length: expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes.iter().all(|&b| b == 0) {
            return Err(ProviderError("Invalid keypair: all-zero key rejected".to_string()));
        }
        let keypair = Keypair::try_from(bytes).map_err(|e| ProviderError(e.to_string()))?;
        Ok(Self::new(keypair))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner").field("pubkey", &self.keypair.pubkey()).finish()
    }
}

#[async_trait]
impl SigningProvider for LocalSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_bytes(&self, message: &[u8]) -> Result<Signature, ProviderError> {
        self.keypair
            .try_sign_message(message)
            .map_err(|e| ProviderError(e.to_string()))
    }
}

/// Collects every required signature for a compiled message
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiSigner;

impl MultiSigner {
    pub fn new() -> Self {
        Self
    }

    /// Sign `message` with the providers matching its required signers
    ///
    /// Providers for keys the message does not need are ignored. When two
    /// providers share a key the first one wins. Signatures are requested
    /// concurrently and placed by signer position, not by completion order.
    pub async fn sign(
        &self,
        message: UnsignedMessage,
        providers: &[Arc<dyn SigningProvider>],
    ) -> Result<SignedTransaction, SignatureError> {
        let mut by_key: HashMap<Pubkey, &Arc<dyn SigningProvider>> = HashMap::with_capacity(providers.len());
        for provider in providers {
            by_key.entry(provider.pubkey()).or_insert(provider);
        }

        let required = message.required_signers().to_vec();
        let missing: Vec<Pubkey> = required
            .iter()
            .filter(|key| !by_key.contains_key(*key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SignatureError::MissingSignature { missing });
        }

        let bytes = message.message_bytes();
        let requests = required.iter().enumerate().map(|(position, signer)| {
            let provider = Arc::clone(by_key[signer]);
            let bytes = bytes.as_slice();
            async move {
                let signature = provider
                    .sign_bytes(bytes)
                    .await
                    .map_err(|e| SignatureError::Provider {
                        signer: *signer,
                        reason: e.to_string(),
                    })?;
                if !signature.verify(signer.as_ref(), bytes) {
                    return Err(SignatureError::InvalidSignature {
                        signer: *signer,
                        position,
                    });
                }
                Ok(signature)
            }
        });
        let signatures = try_join_all(requests).await?;

        debug!(
            signers = signatures.len(),
            transaction_id = %signatures[0],
            "All required signatures collected"
        );

        let freshness = *message.freshness();
        let tx = VersionedTransaction {
            signatures,
            message: message.into_message(),
        };
        Ok(SignedTransaction::new(tx, required, freshness))
    }
}
