//! Desired ledger effects and their instruction encodings
//!
//! An [`Effect`] is what the caller wants to happen (create an account, mint
//! tokens, ...). It knows which accounts it brings into existence
//! (`provides`) and which accounts must already exist when it runs
//! (`requires`); the sequencer turns those into ordering edges.
//! [`PlannedEffect`] adds a label, a tie-break priority and explicit
//! must-follow labels.

use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use thiserror::Error;

// TODO(migrate-system-instruction): switch to solana-system-interface
#[allow(deprecated)]
use solana_sdk::system_instruction;

use crate::tx_builder::derive::AddressDeriver;
use crate::tx_builder::errors::DerivationError;
use crate::tx_builder::metadata::{self, MetadataError, TokenMetadata};

/// Mint account size for the SPL token program
pub const MINT_ACCOUNT_SPACE: u64 = 82;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error("metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("program {program}: {reason}")]
    Program { program: &'static str, reason: String },
}

/// One desired state change on the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Allocate `space` bytes owned by `owner`, funded by the fee payer.
    /// `new_account` must sign.
    CreateAccount {
        new_account: Pubkey,
        lamports: u64,
        space: u64,
        owner: Pubkey,
    },
    InitializeMint {
        mint: Pubkey,
        decimals: u8,
        mint_authority: Pubkey,
        freeze_authority: Option<Pubkey>,
    },
    CreateMetadata {
        mint: Pubkey,
        mint_authority: Pubkey,
        update_authority: Pubkey,
        metadata: TokenMetadata,
    },
    /// Associated token account of `wallet` for `mint`. The idempotent form
    /// succeeds when the account already exists.
    CreateAssociatedAccount {
        wallet: Pubkey,
        mint: Pubkey,
        idempotent: bool,
    },
    /// Mint `amount` base units into the associated account of `wallet`
    MintTo {
        mint: Pubkey,
        wallet: Pubkey,
        mint_authority: Pubkey,
        amount: u64,
    },
    /// Seal a non-fungible mint: the edition account takes over the mint
    /// authority, so declare it `after` the mint-to that fills `holder`.
    CreateMasterEdition {
        mint: Pubkey,
        update_authority: Pubkey,
        mint_authority: Pubkey,
        holder: Pubkey,
        max_supply: Option<u64>,
    },
    /// Native lamport transfer; `from` must sign
    Transfer {
        from: Pubkey,
        to: Pubkey,
        lamports: u64,
    },
}

/// Inputs shared by all effect encodings of one transaction
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub payer: Pubkey,
    pub deriver: &'a AddressDeriver,
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::CreateAccount { .. } => "create-account",
            Effect::InitializeMint { .. } => "initialize-mint",
            Effect::CreateMetadata { .. } => "create-metadata",
            Effect::CreateAssociatedAccount { .. } => "create-associated-account",
            Effect::MintTo { .. } => "mint-to",
            Effect::CreateMasterEdition { .. } => "create-master-edition",
            Effect::Transfer { .. } => "transfer",
        }
    }

    /// Accounts this effect creates or makes ready for use
    pub fn provides(&self, deriver: &AddressDeriver) -> Result<Vec<Pubkey>, EffectError> {
        Ok(match self {
            Effect::CreateAccount { new_account, .. } => vec![*new_account],
            Effect::InitializeMint { mint, .. } => vec![*mint],
            Effect::CreateMetadata { mint, .. } => vec![deriver.metadata_account(mint)?.address],
            Effect::CreateAssociatedAccount { wallet, mint, .. } => {
                vec![deriver.associated_account(wallet, mint)?.address]
            }
            Effect::CreateMasterEdition { mint, .. } => vec![deriver.edition_account(mint)?.address],
            Effect::MintTo { .. } | Effect::Transfer { .. } => vec![],
        })
    }

    /// Accounts that must exist (and be ready) before this effect runs
    pub fn requires(&self, deriver: &AddressDeriver) -> Result<Vec<Pubkey>, EffectError> {
        Ok(match self {
            Effect::CreateAccount { .. } => vec![],
            Effect::InitializeMint { mint, .. } => vec![*mint],
            Effect::CreateMetadata { mint, .. } => vec![*mint],
            Effect::CreateAssociatedAccount { mint, .. } => vec![*mint],
            Effect::MintTo { mint, wallet, .. } => {
                vec![*mint, deriver.associated_account(wallet, mint)?.address]
            }
            Effect::CreateMasterEdition { mint, holder, .. } => vec![
                *mint,
                deriver.metadata_account(mint)?.address,
                deriver.associated_account(holder, mint)?.address,
            ],
            Effect::Transfer { from, .. } => vec![*from],
        })
    }

    /// Encode this effect as ledger instructions
    pub fn build(&self, ctx: &EffectContext<'_>) -> Result<Vec<Instruction>, EffectError> {
        let token_program = spl_token::id();

        let ix = match self {
            Effect::CreateAccount {
                new_account,
                lamports,
                space,
                owner,
            } => system_instruction::create_account(&ctx.payer, new_account, *lamports, *space, owner),

            Effect::InitializeMint {
                mint,
                decimals,
                mint_authority,
                freeze_authority,
            } => spl_token::instruction::initialize_mint2(
                &token_program,
                mint,
                mint_authority,
                freeze_authority.as_ref(),
                *decimals,
            )
            .map_err(|e| EffectError::Program {
                program: "spl-token",
                reason: e.to_string(),
            })?,

            Effect::CreateMetadata {
                mint,
                mint_authority,
                update_authority,
                metadata,
            } => {
                let metadata_account = ctx.deriver.metadata_account(mint)?;
                metadata::create_metadata_account_v3(
                    &metadata_account.address,
                    mint,
                    mint_authority,
                    &ctx.payer,
                    update_authority,
                    metadata,
                )?
            }

            Effect::CreateAssociatedAccount {
                wallet,
                mint,
                idempotent,
            } => {
                if *idempotent {
                    spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                        &ctx.payer,
                        wallet,
                        mint,
                        &token_program,
                    )
                } else {
                    spl_associated_token_account::instruction::create_associated_token_account(
                        &ctx.payer,
                        wallet,
                        mint,
                        &token_program,
                    )
                }
            }

            Effect::MintTo {
                mint,
                wallet,
                mint_authority,
                amount,
            } => {
                let destination = ctx.deriver.associated_account(wallet, mint)?;
                spl_token::instruction::mint_to(
                    &token_program,
                    mint,
                    &destination.address,
                    mint_authority,
                    &[],
                    *amount,
                )
                .map_err(|e| EffectError::Program {
                    program: "spl-token",
                    reason: e.to_string(),
                })?
            }

            Effect::CreateMasterEdition {
                mint,
                update_authority,
                mint_authority,
                max_supply,
                ..
            } => {
                let edition = ctx.deriver.edition_account(mint)?;
                let metadata_account = ctx.deriver.metadata_account(mint)?;
                metadata::create_master_edition_v3(
                    &edition.address,
                    mint,
                    update_authority,
                    mint_authority,
                    &ctx.payer,
                    &metadata_account.address,
                    *max_supply,
                )?
            }

            Effect::Transfer { from, to, lamports } => system_instruction::transfer(from, to, *lamports),
        };

        Ok(vec![ix])
    }
}

/// An effect with its ordering metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEffect {
    /// Unique within one transaction
    pub label: String,
    pub effect: Effect,
    /// Tie-break among ready effects; lower runs first
    pub priority: i32,
    /// Labels this effect must follow
    pub after: Vec<String>,
}

impl PlannedEffect {
    pub fn new(label: impl Into<String>, effect: Effect) -> Self {
        Self {
            label: label.into(),
            effect,
            priority: 0,
            after: Vec::new(),
        }
    }

    pub fn after(mut self, label: impl Into<String>) -> Self {
        self.after.push(label.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
