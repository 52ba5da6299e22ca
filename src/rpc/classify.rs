//! Submission failure classification
//!
//! A send attempt either fails deterministically (the node told us the
//! transaction will never execute) or ambiguously (the request may have
//! reached a leader). Only the first is safe to report as a plain error.

use solana_rpc_client_api::{
    client_error::{Error as ClientError, ErrorKind},
    request::{RpcError, RpcResponseErrorData},
};
use solana_sdk::transaction::TransactionError;

use crate::tx_builder::errors::{AmbiguousFailure, RejectionReason, SubmissionError};

/// Map a client error from `sendTransaction` onto the submission taxonomy
pub fn classify_send_error(err: &ClientError) -> SubmissionError {
    match err.kind() {
        ErrorKind::TransactionError(tx_err) => {
            SubmissionError::rejected(rejection_from_transaction_error(tx_err))
        }

        ErrorKind::RpcError(RpcError::RpcResponseError { message, data, .. }) => match data {
            RpcResponseErrorData::SendTransactionPreflightFailure(sim) => {
                let logs = sim.logs.clone().unwrap_or_default();
                let reason = match &sim.err {
                    Some(tx_err) => classify_message(&format!("{:?}", tx_err))
                        .unwrap_or_else(|| RejectionReason::Preflight(message.clone())),
                    None => RejectionReason::Preflight(message.clone()),
                };
                SubmissionError::RejectedByNetwork { reason, logs }
            }
            _ => classify_text(message),
        },

        ErrorKind::SigningError(e) => {
            SubmissionError::rejected(RejectionReason::Signing(e.to_string()))
        }

        // Transport, middleware and decode failures happen after the bytes
        // may already have left this process.
        _ => classify_text(&err.to_string()),
    }
}

/// Classify free-form error text; unknown text is ambiguous
pub fn classify_text(raw: &str) -> SubmissionError {
    match classify_message(raw) {
        Some(reason) => SubmissionError::rejected(reason),
        None => SubmissionError::AmbiguousFailure(AmbiguousFailure::new(raw)),
    }
}

fn rejection_from_transaction_error(err: &TransactionError) -> RejectionReason {
    match err {
        TransactionError::BlockhashNotFound => RejectionReason::StaleFreshness,
        TransactionError::AlreadyProcessed => RejectionReason::AlreadyProcessed,
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. } => RejectionReason::InsufficientFunds,
        TransactionError::SignatureFailure => {
            RejectionReason::Signing("signature verification failed".to_string())
        }
        other => RejectionReason::Other(other.to_string()),
    }
}

fn classify_message(raw: &str) -> Option<RejectionReason> {
    let lower = raw.to_lowercase();

    if lower.contains("blockhash not found")
        || lower.contains("blockhashnotfound")
        || lower.contains("block height exceeded")
    {
        Some(RejectionReason::StaleFreshness)
    } else if lower.contains("already been processed") || lower.contains("alreadyprocessed") {
        Some(RejectionReason::AlreadyProcessed)
    } else if lower.contains("insufficient funds") || lower.contains("insufficientfunds") {
        Some(RejectionReason::InsufficientFunds)
    } else if lower.contains("signature verification failure")
        || lower.contains("signaturefailure")
    {
        Some(RejectionReason::Signing(raw.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_errors_are_rejections() {
        let err = ClientError::from(ErrorKind::TransactionError(TransactionError::BlockhashNotFound));
        assert_eq!(
            classify_send_error(&err),
            SubmissionError::rejected(RejectionReason::StaleFreshness)
        );

        let err = ClientError::from(ErrorKind::TransactionError(TransactionError::AlreadyProcessed));
        assert_eq!(
            classify_send_error(&err),
            SubmissionError::rejected(RejectionReason::AlreadyProcessed)
        );

        let err = ClientError::from(ErrorKind::TransactionError(
            TransactionError::InsufficientFundsForFee,
        ));
        assert_eq!(
            classify_send_error(&err),
            SubmissionError::rejected(RejectionReason::InsufficientFunds)
        );
    }

    #[test]
    fn test_transport_errors_are_ambiguous() {
        let err = ClientError::from(ErrorKind::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )));
        assert!(classify_send_error(&err).is_ambiguous());

        let err = ClientError::from(ErrorKind::Custom("gateway closed stream".to_string()));
        assert!(classify_send_error(&err).is_ambiguous());
    }

    #[test]
    fn test_rpc_response_text_classification() {
        let err = ClientError::from(ErrorKind::RpcError(RpcError::RpcResponseError {
            code: -32002,
            message: "Transaction simulation failed: Blockhash not found".to_string(),
            data: RpcResponseErrorData::Empty,
        }));
        assert_eq!(
            classify_send_error(&err),
            SubmissionError::rejected(RejectionReason::StaleFreshness)
        );

        let err = ClientError::from(ErrorKind::RpcError(RpcError::RpcResponseError {
            code: -32005,
            message: "Node is behind by 42 slots".to_string(),
            data: RpcResponseErrorData::Empty,
        }));
        assert!(classify_send_error(&err).is_ambiguous());
    }

    #[test]
    fn test_classify_text() {
        assert_eq!(
            classify_text("This transaction has already been processed"),
            SubmissionError::rejected(RejectionReason::AlreadyProcessed)
        );
        assert!(classify_text("error sending request for url").is_ambiguous());
    }
}
