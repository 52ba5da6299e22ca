//! Freshness tokens and the per-attempt execution context
//!
//! Every transaction carries either a recent blockhash or the stored value
//! of a durable nonce account. The token is fetched once per attempt and is
//! never shared between concurrent pipelines.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey};
use tracing::debug;

use crate::observability::{CorrelationId, TraceContext};
use crate::rpc::LedgerRpc;
use crate::tx_builder::errors::{PipelineError, Stage};

/// Where the caller wants the freshness token to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FreshnessSource {
    /// Latest blockhash; short validity window
    #[default]
    Recent,
    /// Durable nonce; the transaction must advance it first
    DurableNonce {
        nonce_account: Pubkey,
        authority: Pubkey,
    },
}

/// Resolved freshness value embedded in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessToken {
    RecentBlockhash(Hash),
    DurableNonce {
        nonce_account: Pubkey,
        authority: Pubkey,
        nonce_value: Hash,
    },
}

impl FreshnessToken {
    /// Value placed in the message's recent_blockhash field
    pub fn blockhash(&self) -> Hash {
        match self {
            FreshnessToken::RecentBlockhash(hash) => *hash,
            FreshnessToken::DurableNonce { nonce_value, .. } => *nonce_value,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, FreshnessToken::DurableNonce { .. })
    }

    /// (nonce_account, authority) for durable tokens
    pub fn nonce_accounts(&self) -> Option<(Pubkey, Pubkey)> {
        match self {
            FreshnessToken::RecentBlockhash(_) => None,
            FreshnessToken::DurableNonce {
                nonce_account,
                authority,
                ..
            } => Some((*nonce_account, *authority)),
        }
    }
}

/// Execution context for one pipeline attempt
pub struct ExecutionContext {
    pub freshness: FreshnessToken,
    pub trace_context: Option<TraceContext>,
    fetched_at: Instant,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("freshness", &self.freshness)
            .field("age_ms", &self.age().as_millis())
            .field(
                "trace_context",
                &self
                    .trace_context
                    .as_ref()
                    .map(|ctx| format!("trace_id={}, span_id={}", ctx.trace_id(), ctx.span_id())),
            )
            .finish()
    }
}

impl ExecutionContext {
    pub fn new(freshness: FreshnessToken, trace_context: Option<TraceContext>) -> Self {
        Self {
            freshness,
            trace_context,
            fetched_at: Instant::now(),
        }
    }

    /// Fetch a fresh token from the network for this attempt
    pub async fn prepare<R>(
        rpc: &R,
        source: &FreshnessSource,
        trace_context: Option<TraceContext>,
    ) -> Result<Self, PipelineError>
    where
        R: LedgerRpc + ?Sized,
    {
        let freshness = match source {
            FreshnessSource::Recent => {
                let hash = rpc
                    .latest_blockhash()
                    .await
                    .map_err(|e| PipelineError::rpc(Stage::Freshness, e))?;
                FreshnessToken::RecentBlockhash(hash)
            }
            FreshnessSource::DurableNonce {
                nonce_account,
                authority,
            } => {
                let nonce_value = rpc
                    .nonce_value(nonce_account)
                    .await
                    .map_err(|e| PipelineError::rpc(Stage::Freshness, e))?;
                FreshnessToken::DurableNonce {
                    nonce_account: *nonce_account,
                    authority: *authority,
                    nonce_value,
                }
            }
        };

        debug!(
            durable = freshness.is_durable(),
            blockhash = %freshness.blockhash(),
            "Freshness token fetched"
        );

        Ok(Self::new(freshness, trace_context))
    }

    pub fn is_durable(&self) -> bool {
        self.freshness.is_durable()
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.trace_context.as_ref().map(TraceContext::correlation_id)
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}
