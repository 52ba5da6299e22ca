//! Atomic transaction pipeline
//!
//! Builds one all-or-nothing transaction out of a set of desired ledger
//! effects and gets it onto the network exactly once.
//!
//! ## Stages
//!
//! - **derive**: deterministic program-derived addresses (cached)
//! - **sequencer**: dependency-respecting effect order
//! - **effects**: effect -> instruction encodings (system, SPL token, ATA, metadata)
//! - **assembler**: message compilation and the packet size limit
//! - **signer**: concurrent multi-party signing with verification
//! - **submit**: single send attempt with ambiguous/rejected classification
//! - **recover**: transaction id recovery from ambiguous failures
//! - **pipeline**: orchestration, chained requests and status lookups
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use solana_sdk::{commitment_config::CommitmentConfig, signature::Keypair, signer::Signer};
//! use txpipe::rpc::SolanaRpc;
//! use txpipe::tx_builder::{Effect, LocalSigner, PlannedEffect, TransactionRequest, TxPipeline};
//!
//! # async fn example() -> Result<(), txpipe::tx_builder::PipelineError> {
//! let rpc = Arc::new(SolanaRpc::new(
//!     "https://api.devnet.solana.com",
//!     std::time::Duration::from_secs(30),
//!     CommitmentConfig::confirmed(),
//! ));
//! let pipeline = TxPipeline::new(rpc);
//!
//! let payer = Keypair::new();
//! let recipient = Keypair::new().pubkey();
//! let request = TransactionRequest::new(payer.pubkey())
//!     .with_effect(PlannedEffect::new(
//!         "pay",
//!         Effect::Transfer { from: payer.pubkey(), to: recipient, lamports: 5_000 },
//!     ))
//!     .with_signer(Arc::new(LocalSigner::new(payer)));
//!
//! let outcome = pipeline.execute(request).await?;
//! println!("transaction id: {}", outcome.transaction_id());
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod context;
pub mod derive;
pub mod effects;
pub mod errors;
pub mod instructions;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod recover;
pub mod sequencer;
pub mod signer;
pub mod submit;

pub use assembler::{MessageVersion, TransactionAssembler, UnsignedMessage, PACKET_DATA_SIZE};
pub use context::{ExecutionContext, FreshnessSource, FreshnessToken};
pub use derive::{AddressDeriver, DerivedAddress};
pub use effects::{Effect, EffectContext, PlannedEffect, MINT_ACCOUNT_SPACE};
pub use errors::{
    AmbiguousFailure, AssemblyError, DependencyError, DerivationError, PipelineError, RejectionReason,
    SignatureError, Stage, SubmissionError,
};
pub use instructions::{plan_instructions, sanity_check_ix_order, ComputeBudget, InstructionPlan};
pub use metadata::{
    ContentStore, HttpContentStore, MetadataDocument, MetadataUri, TokenMetadata, TOKEN_METADATA_PROGRAM_ID,
};
pub use output::SignedTransaction;
pub use pipeline::{ChainPolicy, SubmissionOutcome, TransactionRequest, TxPipeline};
pub use recover::FailureRecoverer;
pub use sequencer::InstructionSequencer;
pub use signer::{LocalSigner, MultiSigner, ProviderError, SigningProvider};
pub use submit::Submitter;
