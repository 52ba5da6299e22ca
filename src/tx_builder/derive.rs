//! Program-derived address computation
//!
//! Addresses are pure functions of `(seeds, owner)`: the bump search walks
//! down from 255 and stops at the first hash that is off the ed25519 curve,
//! so the result can never be a signable key.
//!
//! [`AddressDeriver`] memoizes results in a shared `DashMap`. The cache is
//! read-mostly and safe to share across concurrent pipelines; two tasks
//! racing to populate the same entry both compute the same value.

use std::sync::Arc;

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tracing::trace;

use crate::tx_builder::errors::DerivationError;
use crate::tx_builder::metadata::TOKEN_METADATA_PROGRAM_ID;

/// Maximum length of a single seed in bytes
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of caller seeds (the bump occupies the 16th slot)
pub const MAX_CALLER_SEEDS: usize = 15;

/// A derived address together with the material needed to re-derive it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: Pubkey,
    pub bump: u8,
    pub owner: Pubkey,
    pub seeds: Vec<Vec<u8>>,
}

impl DerivedAddress {
    /// Seeds including the trailing bump, as a program would pass them to
    /// `invoke_signed`
    pub fn signer_seeds(&self) -> Vec<Vec<u8>> {
        let mut seeds = self.seeds.clone();
        seeds.push(vec![self.bump]);
        seeds
    }
}

type CacheKey = (Pubkey, Vec<Vec<u8>>);

/// Deterministic address deriver with a concurrent memo cache
#[derive(Debug, Clone, Default)]
pub struct AddressDeriver {
    cache: Arc<DashMap<CacheKey, (Pubkey, u8)>>,
}

impl AddressDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the program address for `seeds` under `owner`
    ///
    /// # Errors
    ///
    /// - `TooManySeeds` / `SeedTooLong` for seed material the ledger rejects
    /// - `NoValidAddress` if every bump lands on the curve
    pub fn derive(&self, seeds: &[&[u8]], owner: &Pubkey) -> Result<DerivedAddress, DerivationError> {
        validate_seeds(seeds)?;

        let key: CacheKey = (*owner, seeds.iter().map(|s| s.to_vec()).collect());

        let cached = self.cache.get(&key).map(|entry| *entry.value());
        let (address, bump) = match cached {
            Some(hit) => hit,
            None => {
                let found = Pubkey::try_find_program_address(seeds, owner).ok_or(
                    DerivationError::NoValidAddress {
                        owner: *owner,
                        seed_count: seeds.len(),
                    },
                )?;
                self.cache.insert(key.clone(), found);
                trace!(address = %found.0, bump = found.1, owner = %owner, "derived program address");
                found
            }
        };

        Ok(DerivedAddress {
            address,
            bump,
            owner: *owner,
            seeds: key.1,
        })
    }

    /// Associated token account of `wallet` for `mint`
    pub fn associated_account(&self, wallet: &Pubkey, mint: &Pubkey) -> Result<DerivedAddress, DerivationError> {
        let token_program = spl_token::id();
        self.derive(
            &[wallet.as_ref(), token_program.as_ref(), mint.as_ref()],
            &spl_associated_token_account::id(),
        )
    }

    /// Token metadata account attached to `mint`
    pub fn metadata_account(&self, mint: &Pubkey) -> Result<DerivedAddress, DerivationError> {
        self.derive(
            &[b"metadata", TOKEN_METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
            &TOKEN_METADATA_PROGRAM_ID,
        )
    }

    /// Master edition account of `mint`
    pub fn edition_account(&self, mint: &Pubkey) -> Result<DerivedAddress, DerivationError> {
        self.derive(
            &[
                b"metadata",
                TOKEN_METADATA_PROGRAM_ID.as_ref(),
                mint.as_ref(),
                b"edition",
            ],
            &TOKEN_METADATA_PROGRAM_ID,
        )
    }

    /// Number of memoized derivations
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

fn validate_seeds(seeds: &[&[u8]]) -> Result<(), DerivationError> {
    if seeds.len() > MAX_CALLER_SEEDS {
        return Err(DerivationError::TooManySeeds {
            count: seeds.len(),
            max: MAX_CALLER_SEEDS,
        });
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(DerivationError::SeedTooLong {
                index,
                len: seed.len(),
                max: MAX_SEED_LEN,
            });
        }
    }
    Ok(())
}
