use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    nonce::state::{State as NonceState, Versions as NonceVersions},
    pubkey::Pubkey,
    signature::Signature,
    system_program,
    transaction::VersionedTransaction,
};
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use tracing::{debug, warn};

use super::{classify::classify_send_error, LedgerRpc, LedgerRpcError, SignatureStatus};
use crate::tx_builder::errors::SubmissionError;

/// [`LedgerRpc`] over a single JSON-RPC endpoint
pub struct SolanaRpc {
    client: RpcClient,
    endpoint: String,
    commitment: CommitmentConfig,
    skip_preflight: bool,
}

impl SolanaRpc {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, commitment: CommitmentConfig) -> Self {
        let endpoint = endpoint.into();
        let client = RpcClient::new_with_timeout_and_commitment(endpoint.clone(), timeout, commitment);
        Self {
            client,
            endpoint,
            commitment,
            skip_preflight: false,
        }
    }

    pub fn with_skip_preflight(mut self, skip: bool) -> Self {
        self.skip_preflight = skip;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client_error(&self, err: solana_rpc_client_api::client_error::Error) -> LedgerRpcError {
        LedgerRpcError::from_client_error(&err, &self.endpoint)
    }
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment.commitment)
            .field("skip_preflight", &self.skip_preflight)
            .finish()
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerRpcError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| self.client_error(e))
    }

    async fn nonce_value(&self, nonce_account: &Pubkey) -> Result<Hash, LedgerRpcError> {
        let account = self
            .client
            .get_account_with_commitment(nonce_account, self.commitment)
            .await
            .map_err(|e| self.client_error(e))?
            .value
            .ok_or_else(|| LedgerRpcError::AccountNotFound {
                account: nonce_account.to_string(),
                endpoint: self.endpoint.clone(),
            })?;

        if account.owner != system_program::id() {
            return Err(LedgerRpcError::InvalidAccountData {
                account: nonce_account.to_string(),
                reason: format!("owned by {}, not the system program", account.owner),
            });
        }

        let versions: NonceVersions =
            bincode::deserialize(&account.data).map_err(|e| LedgerRpcError::InvalidAccountData {
                account: nonce_account.to_string(),
                reason: e.to_string(),
            })?;

        match versions.state() {
            NonceState::Initialized(data) => Ok(data.blockhash()),
            NonceState::Uninitialized => Err(LedgerRpcError::InvalidAccountData {
                account: nonce_account.to_string(),
                reason: "nonce account is not initialized".to_string(),
            }),
        }
    }

    async fn minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64, LedgerRpcError> {
        self.client
            .get_minimum_balance_for_rent_exemption(space)
            .await
            .map_err(|e| self.client_error(e))
    }

    async fn balance(&self, account: &Pubkey) -> Result<u64, LedgerRpcError> {
        self.client
            .get_balance(account)
            .await
            .map_err(|e| self.client_error(e))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SubmissionError> {
        // One attempt per call; the node must not rebroadcast on our behalf
        let config = RpcSendTransactionConfig {
            skip_preflight: self.skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };

        match self.client.send_transaction_with_config(tx, config).await {
            Ok(signature) => {
                debug!(endpoint = %self.endpoint, signature = %signature, "Transaction accepted by node");
                Ok(signature)
            }
            Err(e) => {
                let classified = classify_send_error(&e);
                warn!(
                    endpoint = %self.endpoint,
                    ambiguous = classified.is_ambiguous(),
                    error = %e,
                    "sendTransaction failed"
                );
                Err(classified)
            }
        }
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, LedgerRpcError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.client_error(e))?;

        let Some(status) = response.value.into_iter().next().flatten() else {
            return Ok(None);
        };

        if let Some(err) = status.err {
            return Ok(Some(SignatureStatus::Failed(format!("{:?}", err))));
        }

        Ok(Some(match status.confirmation_status {
            Some(TransactionConfirmationStatus::Finalized) => SignatureStatus::Finalized,
            Some(TransactionConfirmationStatus::Confirmed) => SignatureStatus::Confirmed,
            _ => SignatureStatus::Processed,
        }))
    }
}
