//! Instruction planning and ordering validation
//!
//! Final instruction layout of every message:
//! 1. advance_nonce_account (durable freshness only)
//! 2. Compute budget instructions (CU limit, priority fee)
//! 3. Effect instructions, in sequencer order

use serde::{Deserialize, Serialize};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction, instruction::Instruction, system_program,
};

// TODO(migrate-system-instruction): switch to solana-system-interface
#[allow(deprecated)]
use solana_sdk::system_instruction;

use crate::tx_builder::context::FreshnessToken;
use crate::tx_builder::errors::AssemblyError;

/// Optional compute budget prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBudget {
    /// 0 = omit the instruction
    #[serde(default)]
    pub unit_limit: u32,
    /// Micro-lamports per CU; 0 = omit the instruction
    #[serde(default)]
    pub unit_price_micro_lamports: u64,
}

/// Ordered instructions for one message
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    /// First instruction is advance_nonce_account
    pub is_durable: bool,
}

/// Prefix the effect instructions with the freshness and budget instructions
pub fn plan_instructions(
    freshness: &FreshnessToken,
    budget: &ComputeBudget,
    effect_ixs: &[Instruction],
) -> Result<InstructionPlan, AssemblyError> {
    if effect_ixs.is_empty() {
        return Err(AssemblyError::EmptyInstructions);
    }

    let mut instructions = Vec::with_capacity(effect_ixs.len() + 3);

    if let Some((nonce_account, authority)) = freshness.nonce_accounts() {
        instructions.push(system_instruction::advance_nonce_account(&nonce_account, &authority));
    }

    if budget.unit_limit > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(budget.unit_limit));
    }
    if budget.unit_price_micro_lamports > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            budget.unit_price_micro_lamports,
        ));
    }

    instructions.extend_from_slice(effect_ixs);

    Ok(InstructionPlan {
        instructions,
        is_durable: freshness.is_durable(),
    })
}

fn is_advance_nonce(ix: &Instruction) -> bool {
    // SystemInstruction::AdvanceNonceAccount, u32 LE discriminator 4
    ix.program_id == system_program::id() && ix.data.len() >= 4 && ix.data[..4] == [4, 0, 0, 0]
}

/// Validate placement of advance_nonce_account
///
/// Durable messages must start with exactly one advance; blockhash
/// messages must not contain any.
pub fn sanity_check_ix_order(instructions: &[Instruction], is_durable: bool) -> Result<(), AssemblyError> {
    let Some(first) = instructions.first() else {
        return Err(AssemblyError::EmptyInstructions);
    };

    if is_durable && !is_advance_nonce(first) {
        return Err(AssemblyError::InvalidOrder {
            reason: format!(
                "durable nonce transaction must start with advance_nonce_account, got program_id: {}",
                first.program_id
            ),
        });
    }

    let skip = usize::from(is_durable);
    if let Some(idx) = instructions
        .iter()
        .enumerate()
        .skip(skip)
        .find_map(|(idx, ix)| is_advance_nonce(ix).then_some(idx))
    {
        return Err(AssemblyError::InvalidOrder {
            reason: if is_durable {
                format!("multiple advance_nonce_account instructions (second at position {})", idx)
            } else {
                format!("blockhash transaction contains advance_nonce_account at position {}", idx)
            },
        });
    }

    Ok(())
}
