//! Transaction id recovery from ambiguous submission failures
//!
//! Some transports fail after the node has already accepted the bytes and
//! still echo the signature somewhere in the error payload. Recovery is a
//! pure scan of that payload; it never queries the network.

use once_cell::sync::Lazy;
use regex::Regex;
use solana_sdk::signature::Signature;
use tracing::{debug, warn};

use crate::tx_builder::errors::AmbiguousFailure;

/// Base58 runs long enough to be a 64-byte signature
static SIGNATURE_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[1-9A-HJ-NP-Za-km-z]{64,88}").expect("valid signature regex"));

/// Extracts a transaction id from an ambiguous failure payload
#[derive(Debug, Clone, Default)]
pub struct FailureRecoverer {
    expected: Option<Signature>,
}

impl FailureRecoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only this signature counts as recovered; any other id in the payload
    /// belongs to a different transaction
    pub fn expecting(expected: Signature) -> Self {
        Self {
            expected: Some(expected),
        }
    }

    /// Echoed signature first, then the raw text, then the logs
    pub fn recover(&self, failure: &AmbiguousFailure) -> Option<Signature> {
        let sources = failure
            .echoed_signature
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(failure.raw.as_str()))
            .chain(failure.logs.iter().map(String::as_str));

        let candidates: Vec<Signature> = sources.flat_map(candidates_in).collect();

        let found = match self.expected {
            Some(expected) if candidates.contains(&expected) => Some(expected),
            Some(expected) => {
                if !candidates.is_empty() {
                    let seen: Vec<String> = candidates.iter().map(ToString::to_string).collect();
                    warn!(
                        expected = %expected,
                        candidates = ?seen,
                        "Failure payload names other transactions; not treating as recovered"
                    );
                }
                None
            }
            None => candidates.into_iter().next(),
        };

        debug!(recovered = ?found, "Signature recovery scan finished");
        found
    }
}

fn candidates_in(text: &str) -> impl Iterator<Item = Signature> + '_ {
    SIGNATURE_CANDIDATE
        .find_iter(text)
        .filter_map(|m| bs58::decode(m.as_str()).into_vec().ok())
        .filter_map(|bytes| Signature::try_from(bytes.as_slice()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{Keypair, Signer};

    fn sig() -> Signature {
        Keypair::new().sign_message(b"recover")
    }

    #[test]
    fn test_recovers_from_echoed_field() {
        let s = sig();
        let failure = AmbiguousFailure::new("gateway reset").with_echoed_signature(s.to_string());
        assert_eq!(FailureRecoverer::new().recover(&failure), Some(s));
    }

    #[test]
    fn test_recovers_from_raw_text() {
        let s = sig();
        let failure = AmbiguousFailure::new(format!("upstream closed after accepting {}; retry later", s));
        assert_eq!(FailureRecoverer::new().recover(&failure), Some(s));
    }

    #[test]
    fn test_recovers_from_logs() {
        let s = sig();
        let failure = AmbiguousFailure::new("timeout").with_logs(vec![
            "Program 11111111111111111111111111111111 invoke [1]".to_string(),
            format!("forwarded signature={}", s),
        ]);
        assert_eq!(FailureRecoverer::new().recover(&failure), Some(s));
    }

    #[test]
    fn test_nothing_recoverable() {
        let failure = AmbiguousFailure::new("connection reset by peer")
            .with_logs(vec!["Program 11111111111111111111111111111111 invoke [1]".to_string()]);
        assert_eq!(FailureRecoverer::new().recover(&failure), None);
    }

    #[test]
    fn test_prefers_expected_signature() {
        let other = sig();
        let expected = sig();
        let failure = AmbiguousFailure::new(format!("seen {} and {}", other, expected));

        assert_eq!(FailureRecoverer::new().recover(&failure), Some(other));
        assert_eq!(FailureRecoverer::expecting(expected).recover(&failure), Some(expected));
    }

    #[test]
    fn test_foreign_signature_is_not_recovered() {
        let foreign = sig();
        let expected = sig();
        let failure = AmbiguousFailure::new("bundle relay timed out")
            .with_logs(vec![format!("previous bundle landed: {}", foreign)]);

        assert_eq!(FailureRecoverer::new().recover(&failure), Some(foreign));
        assert_eq!(FailureRecoverer::expecting(expected).recover(&failure), None);
    }

    #[test]
    fn test_foreign_echo_is_not_recovered() {
        let expected = sig();
        let failure = AmbiguousFailure::new("reset").with_echoed_signature(sig().to_string());
        assert_eq!(FailureRecoverer::expecting(expected).recover(&failure), None);
    }

    #[test]
    fn test_pubkey_sized_runs_are_ignored() {
        // 32-byte values encode to at most 44 characters
        let failure = AmbiguousFailure::new(format!("account {} missing", solana_sdk::pubkey::Pubkey::new_unique()));
        assert_eq!(FailureRecoverer::new().recover(&failure), None);
    }
}
