//! Error types for the transaction pipeline
//!
//! Every pipeline stage has its own error enum so callers can match on the
//! exact failure, and [`PipelineError`] wraps them all with the [`Stage`]
//! that produced it. Errors are designed to be:
//! - Structural: derivation, dependency, size and signature errors indicate a
//!   caller-side construction bug and are never retried
//! - Explicit about ambiguity: a submission that may or may not have landed is
//!   its own variant, never folded into "failed"
//! - Observable: `category()` feeds metrics labels, `stage()` feeds tracing

use std::fmt;

use itertools::Itertools;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

use crate::rpc::LedgerRpcError;
use crate::tx_builder::metadata::ContentStoreError;

/// Pipeline stage an error (or a log event) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Derive,
    ResolveContent,
    Sequence,
    BuildEffect,
    Freshness,
    Assemble,
    Sign,
    Submit,
    Recover,
    Status,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Derive => "derive",
            Stage::ResolveContent => "resolve_content",
            Stage::Sequence => "sequence",
            Stage::BuildEffect => "build_effect",
            Stage::Freshness => "freshness",
            Stage::Assemble => "assemble",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
            Stage::Recover => "recover",
            Stage::Status => "status",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program-derived address search failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// Every bump value produced an on-curve (signable) address
    #[error("No valid address: no bump seed yields an off-curve address (owner={owner}, seeds={seed_count})")]
    NoValidAddress { owner: Pubkey, seed_count: usize },

    #[error("Too many seeds: {count} (max {max})")]
    TooManySeeds { count: usize, max: usize },

    #[error("Seed #{index} is {len} bytes (max {max})")]
    SeedTooLong { index: usize, len: usize, max: usize },
}

/// Effect ordering failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// No total order satisfies every edge; `unresolved` lists the effects
    /// left on the cycle (or blocked behind it)
    #[error("Cyclic dependency among effects: [{}]", .unresolved.join(", "))]
    CyclicDependency { unresolved: Vec<String> },

    #[error("Effect #{index} '{label}' depends on unknown effect '{missing}'")]
    UnknownDependency {
        index: usize,
        label: String,
        missing: String,
    },

    #[error("Duplicate effect label '{label}' at #{index}")]
    DuplicateLabel { index: usize, label: String },
}

/// Message compilation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Serialized transaction exceeds the network's hard packet limit.
    /// The caller must split the work into several transactions.
    #[error("Transaction too large: {size} bytes exceeds limit of {limit} bytes")]
    TransactionTooLarge { size: usize, limit: usize },

    #[error("No instructions to assemble")]
    EmptyInstructions,

    #[error("Message compilation failed: {reason}")]
    Compile { reason: String },

    /// Durable-nonce transactions must start with exactly one advance_nonce_account
    #[error("Invalid instruction order: {reason}")]
    InvalidOrder { reason: String },

    #[error("Fee payer {payer} is not the first signer+writable account")]
    PayerNotFirst { payer: Pubkey },

    #[error("Message serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Signature collection failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// One or more required signers had no signing provider
    #[error("Missing signature from required signer(s): {}", .missing.iter().join(", "))]
    MissingSignature { missing: Vec<Pubkey> },

    /// Provider returned a signature that does not verify against its key
    #[error("Invalid signature from {signer} at position {position}")]
    InvalidSignature { signer: Pubkey, position: usize },

    #[error("Signing provider for {signer} failed: {reason}")]
    Provider { signer: Pubkey, reason: String },
}

/// Why the network deterministically refused a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Blockhash or nonce no longer valid
    StaleFreshness,
    InsufficientFunds,
    /// Identical signed bytes were already processed
    AlreadyProcessed,
    /// Preflight simulation failed
    Preflight(String),
    Signing(String),
    Other(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::StaleFreshness => f.write_str("stale freshness token"),
            RejectionReason::InsufficientFunds => f.write_str("insufficient funds"),
            RejectionReason::AlreadyProcessed => f.write_str("already processed"),
            RejectionReason::Preflight(msg) => write!(f, "preflight failure: {}", msg),
            RejectionReason::Signing(msg) => write!(f, "signing failure: {}", msg),
            RejectionReason::Other(msg) => f.write_str(msg),
        }
    }
}

/// Raw payload of a submission whose outcome could not be confirmed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmbiguousFailure {
    /// Error text as reported by the transport or node
    pub raw: String,
    /// Program/simulation logs embedded in the error payload, if any
    pub logs: Vec<String>,
    /// Signature string echoed back by the transport, if any
    pub echoed_signature: Option<String>,
}

impl AmbiguousFailure {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Default::default()
        }
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_echoed_signature(mut self, signature: impl Into<String>) -> Self {
        self.echoed_signature = Some(signature.into());
        self
    }
}

/// Submission failures, split by whether the outcome is known
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// Deterministic refusal. Safe to report, never retried.
    #[error("Rejected by network: {reason}")]
    RejectedByNetwork {
        reason: RejectionReason,
        logs: Vec<String>,
    },

    /// The transaction may or may not execute. Resubmitting the same bytes
    /// can fail as "already processed"; rebuilding can duplicate effects.
    #[error("Ambiguous submission failure: {}", .0.raw)]
    AmbiguousFailure(AmbiguousFailure),
}

impl SubmissionError {
    pub fn rejected(reason: RejectionReason) -> Self {
        Self::RejectedByNetwork {
            reason,
            logs: Vec::new(),
        }
    }

    pub fn ambiguous(raw: impl Into<String>) -> Self {
        Self::AmbiguousFailure(AmbiguousFailure::new(raw))
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousFailure(_))
    }
}

/// Top-level error for a pipeline attempt
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[derive] {0}")]
    Derivation(#[from] DerivationError),

    #[error("[sequence] {0}")]
    Dependency(#[from] DependencyError),

    /// An effect could not be turned into instructions
    #[error("[build_effect] effect #{index} '{label}': {reason}")]
    EffectBuild {
        index: usize,
        label: String,
        reason: String,
    },

    #[error("[assemble] {0}")]
    Assembly(#[from] AssemblyError),

    #[error("[sign] {0}")]
    Signature(#[from] SignatureError),

    #[error("[submit] {0}")]
    Submission(#[from] SubmissionError),

    #[error("[{stage}] RPC error: {source}")]
    Rpc {
        stage: Stage,
        #[source]
        source: LedgerRpcError,
    },

    #[error("[resolve_content] {0}")]
    ContentStore(#[from] ContentStoreError),

    /// Confirm-before-next chaining stopped because a step did not land
    #[error("Chain halted at step #{index} (signature={signature}): {reason}")]
    ChainHalted {
        index: usize,
        signature: Signature,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Stage that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            Self::Derivation(_) => Stage::Derive,
            Self::Dependency(_) => Stage::Sequence,
            Self::EffectBuild { .. } => Stage::BuildEffect,
            Self::Assembly(_) => Stage::Assemble,
            Self::Signature(_) => Stage::Sign,
            Self::Submission(_) => Stage::Submit,
            Self::Rpc { stage, .. } => *stage,
            Self::ContentStore(_) => Stage::ResolveContent,
            Self::ChainHalted { .. } => Stage::Status,
            Self::Configuration(_) => Stage::Assemble,
        }
    }

    /// Check if the caller may retry the whole attempt
    ///
    /// Structural errors never are. Ambiguous submissions are not either:
    /// the caller must resolve the precomputed id by status lookup first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc { source, .. } => source.is_retryable(),
            Self::ContentStore(e) => e.is_transport(),

            Self::Derivation(_) => false,
            Self::Dependency(_) => false,
            Self::EffectBuild { .. } => false,
            Self::Assembly(_) => false,
            Self::Signature(_) => false,
            Self::Submission(_) => false,
            Self::ChainHalted { .. } => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Derivation(_) => "derivation",
            Self::Dependency(_) => "dependency",
            Self::EffectBuild { .. } => "effect",
            Self::Assembly(AssemblyError::TransactionTooLarge { .. }) => "size",
            Self::Assembly(_) => "assembly",
            Self::Signature(_) => "signature",
            Self::Submission(SubmissionError::RejectedByNetwork { .. }) => "rejected",
            Self::Submission(SubmissionError::AmbiguousFailure(_)) => "ambiguous",
            Self::Rpc { .. } => "rpc",
            Self::ContentStore(_) => "content_store",
            Self::ChainHalted { .. } => "chain",
            Self::Configuration(_) => "config",
        }
    }
}

// Convenience constructors
impl PipelineError {
    pub fn effect_failed(index: usize, label: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::EffectBuild {
            index,
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rpc(stage: Stage, source: LedgerRpcError) -> Self {
        Self::Rpc { stage, source }
    }
}
