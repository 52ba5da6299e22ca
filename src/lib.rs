//! txpipe - atomic Solana transaction pipeline
//!
//! Derive addresses, order effects, assemble one size-checked message,
//! collect every signature and submit it exactly once, with transaction id
//! recovery when the transport fails ambiguously.

pub mod compat;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod rpc;
pub mod tx_builder;
pub mod wallet;

// Re-export commonly used types
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
