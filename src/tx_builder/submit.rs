//! Single-attempt submission

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::metrics::{PipelineMetrics, Timer};
use crate::rpc::LedgerRpc;
use crate::tx_builder::errors::{AmbiguousFailure, SubmissionError};
use crate::tx_builder::output::SignedTransaction;
use solana_sdk::signature::Signature;

pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends each signed transaction exactly once
///
/// Never retries, never rebuilds; the caller decides what to do with an
/// ambiguous outcome.
pub struct Submitter<R: ?Sized> {
    rpc: Arc<R>,
    timeout: Duration,
    metrics: Option<PipelineMetrics>,
}

impl<R: LedgerRpc + ?Sized> Submitter<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        Self {
            rpc,
            timeout: DEFAULT_SUBMIT_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Submit and return the network-reported transaction id
    ///
    /// Consumes the transaction: the same bytes are never sent twice
    /// through this path.
    pub async fn submit(&self, signed: SignedTransaction) -> Result<Signature, SubmissionError> {
        let expected = signed.transaction_id();
        let timer = Timer::new();

        let result = match tokio::time::timeout(self.timeout, self.rpc.send_transaction(signed.tx_ref())).await {
            Ok(result) => result,
            // Nothing came back from the node, so there is nothing to echo
            Err(_) => Err(SubmissionError::AmbiguousFailure(AmbiguousFailure::new(format!(
                "no response within {}ms; transaction may still land",
                self.timeout.as_millis()
            )))),
        };

        if let Some(metrics) = &self.metrics {
            timer.observe_duration(&metrics.submit_latency);
        }

        match &result {
            Ok(signature) => {
                if *signature != expected {
                    warn!(
                        expected = %expected,
                        reported = %signature,
                        "Node reported a different transaction id than the payer signature"
                    );
                }
                info!(signature = %signature, "Transaction submitted");
            }
            Err(e) => {
                warn!(
                    expected = %expected,
                    ambiguous = e.is_ambiguous(),
                    error = %e,
                    "Submission failed"
                );
            }
        }

        result
    }
}
