//! Message compilation and the packet size check
//!
//! The assembler turns an ordered instruction list into one compiled
//! message: a deduplicated account table with the fee payer first,
//! instructions rewritten as table indices, and the freshness token in the
//! blockhash slot. It refuses anything whose signed wire form would not
//! fit in one network packet.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use tracing::debug;

use crate::compat;
use crate::tx_builder::context::FreshnessToken;
use crate::tx_builder::errors::AssemblyError;
use crate::tx_builder::instructions::{plan_instructions, sanity_check_ix_order, ComputeBudget};

/// Hard cap on a serialized signed transaction (IPv6 MTU minus headers)
pub const PACKET_DATA_SIZE: usize = 1232;

/// Account indices are a single byte
const MAX_ACCOUNT_KEYS: usize = 256;

/// Wire format of the compiled message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageVersion {
    Legacy,
    #[default]
    V0,
}

/// A compiled message waiting for signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedMessage {
    message: VersionedMessage,
    required_signers: Vec<Pubkey>,
    wire_size: usize,
    freshness: FreshnessToken,
}

impl UnsignedMessage {
    pub fn message(&self) -> &VersionedMessage {
        &self.message
    }

    /// Exact bytes every signer signs
    pub fn message_bytes(&self) -> Vec<u8> {
        self.message.serialize()
    }

    /// Required signers in signature-slot order; the payer is first
    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }

    pub fn account_keys(&self) -> &[Pubkey] {
        compat::get_static_account_keys(&self.message)
    }

    /// Serialized size of the fully signed transaction
    pub fn wire_size(&self) -> usize {
        self.wire_size
    }

    pub fn freshness(&self) -> &FreshnessToken {
        &self.freshness
    }

    pub fn into_message(self) -> VersionedMessage {
        self.message
    }
}

/// Compiles ordered instructions into a single message
#[derive(Debug, Clone)]
pub struct TransactionAssembler {
    size_limit: usize,
    version: MessageVersion,
    compute_budget: ComputeBudget,
}

impl Default for TransactionAssembler {
    fn default() -> Self {
        Self {
            size_limit: PACKET_DATA_SIZE,
            version: MessageVersion::V0,
            compute_budget: ComputeBudget::default(),
        }
    }
}

impl TransactionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_version(mut self, version: MessageVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_compute_budget(mut self, compute_budget: ComputeBudget) -> Self {
        self.compute_budget = compute_budget;
        self
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Compile `ordered` into one message paid for by `payer`
    ///
    /// Pure and deterministic: identical inputs give byte-identical
    /// messages.
    pub fn assemble(
        &self,
        payer: &Pubkey,
        freshness: &FreshnessToken,
        ordered: &[Instruction],
    ) -> Result<UnsignedMessage, AssemblyError> {
        let plan = plan_instructions(freshness, &self.compute_budget, ordered)?;
        sanity_check_ix_order(&plan.instructions, plan.is_durable)?;

        let blockhash = freshness.blockhash();
        let message = self.compile(payer, &plan.instructions, blockhash)?;

        let account_keys = compat::get_static_account_keys(&message);
        if account_keys.first() != Some(payer) || !compat::is_static_key_writable(&message, 0) {
            return Err(AssemblyError::PayerNotFirst { payer: *payer });
        }

        let required_signers = compat::get_required_signers(&message).to_vec();
        let wire_size = signed_wire_size(&message, required_signers.len())?;

        debug!(
            payer = %payer,
            accounts = account_keys.len(),
            instructions = plan.instructions.len(),
            signers = required_signers.len(),
            wire_size,
            limit = self.size_limit,
            "Message compiled"
        );

        if wire_size > self.size_limit {
            return Err(AssemblyError::TransactionTooLarge {
                size: wire_size,
                limit: self.size_limit,
            });
        }

        Ok(UnsignedMessage {
            message,
            required_signers,
            wire_size,
            freshness: *freshness,
        })
    }

    fn compile(
        &self,
        payer: &Pubkey,
        instructions: &[Instruction],
        blockhash: Hash,
    ) -> Result<VersionedMessage, AssemblyError> {
        match self.version {
            MessageVersion::V0 => v0::Message::try_compile(payer, instructions, &[], blockhash)
                .map(VersionedMessage::V0)
                .map_err(|e| AssemblyError::Compile { reason: e.to_string() }),
            MessageVersion::Legacy => {
                let distinct = distinct_keys(payer, instructions);
                if distinct > MAX_ACCOUNT_KEYS {
                    return Err(AssemblyError::Compile {
                        reason: format!("{} distinct accounts exceed the {} index limit", distinct, MAX_ACCOUNT_KEYS),
                    });
                }
                Ok(VersionedMessage::Legacy(Message::new_with_blockhash(
                    instructions,
                    Some(payer),
                    &blockhash,
                )))
            }
        }
    }
}

fn distinct_keys(payer: &Pubkey, instructions: &[Instruction]) -> usize {
    let mut keys: HashSet<&Pubkey> = HashSet::new();
    keys.insert(payer);
    for ix in instructions {
        keys.insert(&ix.program_id);
        keys.extend(ix.accounts.iter().map(|meta| &meta.pubkey));
    }
    keys.len()
}

/// Size of the transaction once `num_signatures` signatures are attached
pub fn signed_wire_size(message: &VersionedMessage, num_signatures: usize) -> Result<usize, AssemblyError> {
    let placeholder = VersionedTransaction {
        signatures: vec![Signature::default(); num_signatures],
        message: message.clone(),
    };
    bincode::serialized_size(&placeholder)
        .map(|size| size as usize)
        .map_err(|e| AssemblyError::Serialization { reason: e.to_string() })
}
