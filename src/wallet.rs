//! Keypair file loading

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Load a keypair from a raw 64-byte file or a JSON byte array
/// (the `solana-keygen` format)
pub fn load_keypair(path: impl AsRef<Path>) -> Result<Keypair> {
    let path = path.as_ref();
    let keypair_bytes =
        std::fs::read(path).with_context(|| format!("Failed to read keypair file: {}", path.display()))?;

    let bytes = if keypair_bytes.len() == 64 {
        keypair_bytes
    } else {
        serde_json::from_slice::<Vec<u8>>(&keypair_bytes).context("Failed to parse keypair JSON")?
    };

    keypair_from_bytes(&bytes)
}

pub fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair> {
    if bytes.len() != 64 {
        anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
    }
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }
    Keypair::try_from(bytes).context("Invalid keypair bytes")
}
