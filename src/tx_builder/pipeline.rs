//! End-to-end transaction pipeline
//!
//! resolve content -> sequence -> build effects -> fetch freshness ->
//! assemble -> sign -> submit -> (recover)
//!
//! Every stage before submission is either pure or talks only to the
//! caller-supplied collaborators. Structural failures surface before any
//! network write, and the transaction id is known before the send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tracing::{debug, info, instrument, warn};

use crate::metrics::{PipelineMetrics, Timer};
use crate::observability::TraceContext;
use crate::rpc::{LedgerRpc, SignatureStatus};
use crate::tx_builder::assembler::TransactionAssembler;
use crate::tx_builder::context::{ExecutionContext, FreshnessSource};
use crate::tx_builder::derive::AddressDeriver;
use crate::tx_builder::effects::{Effect, EffectContext, PlannedEffect};
use crate::tx_builder::errors::{AmbiguousFailure, PipelineError, Stage, SubmissionError};
use crate::tx_builder::metadata::{ContentStore, MetadataUri};
use crate::tx_builder::output::SignedTransaction;
use crate::tx_builder::recover::FailureRecoverer;
use crate::tx_builder::sequencer::{effect_error, InstructionSequencer};
use crate::tx_builder::signer::{MultiSigner, SigningProvider};
use crate::tx_builder::submit::Submitter;

pub const DEFAULT_CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CONFIRM_MAX_POLLS: u32 = 60;

/// Everything needed for one atomic transaction
#[derive(Clone)]
pub struct TransactionRequest {
    pub payer: Pubkey,
    pub effects: Vec<PlannedEffect>,
    pub signers: Vec<Arc<dyn SigningProvider>>,
    pub freshness: FreshnessSource,
}

impl TransactionRequest {
    pub fn new(payer: Pubkey) -> Self {
        Self {
            payer,
            effects: Vec::new(),
            signers: Vec::new(),
            freshness: FreshnessSource::Recent,
        }
    }

    pub fn with_effect(mut self, effect: PlannedEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn SigningProvider>) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn with_freshness(mut self, freshness: FreshnessSource) -> Self {
        self.freshness = freshness;
        self
    }
}

impl std::fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRequest")
            .field("payer", &self.payer)
            .field("effects", &self.effects.iter().map(|e| e.label.as_str()).collect::<Vec<_>>())
            .field("signers", &self.signers.iter().map(|s| s.pubkey()).collect::<Vec<_>>())
            .field("freshness", &self.freshness)
            .finish()
    }
}

/// Result of a submission the network did not refuse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Node accepted the transaction
    Accepted(Signature),
    /// Transport failed ambiguously but the id was found in the payload
    Recovered(Signature),
    /// Outcome unknown; resolve `expected` with a status lookup before
    /// doing anything that could duplicate effects
    Unknown {
        expected: Signature,
        failure: AmbiguousFailure,
    },
}

impl SubmissionOutcome {
    /// Id to track: reported, recovered or precomputed
    pub fn transaction_id(&self) -> Signature {
        match self {
            SubmissionOutcome::Accepted(sig) | SubmissionOutcome::Recovered(sig) => *sig,
            SubmissionOutcome::Unknown { expected, .. } => *expected,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, SubmissionOutcome::Unknown { .. })
    }
}

/// How a chain of dependent transactions proceeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainPolicy {
    /// Wait for each step to reach confirmed commitment before building the next
    #[default]
    ConfirmBeforeNext,
    /// Submit each step as soon as the previous one was sent
    Optimistic,
}

impl std::str::FromStr for ChainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "confirm_before_next" | "confirm" => Ok(ChainPolicy::ConfirmBeforeNext),
            "optimistic" => Ok(ChainPolicy::Optimistic),
            other => Err(format!("unknown chain policy '{}'", other)),
        }
    }
}

/// The transaction pipeline over one RPC collaborator
pub struct TxPipeline<R: ?Sized> {
    rpc: Arc<R>,
    deriver: AddressDeriver,
    sequencer: InstructionSequencer,
    assembler: TransactionAssembler,
    signer: MultiSigner,
    submitter: Submitter<R>,
    content_store: Option<Arc<dyn ContentStore>>,
    metrics: Option<PipelineMetrics>,
    confirm_poll_interval: Duration,
    confirm_max_polls: u32,
}

impl<R: LedgerRpc + ?Sized> TxPipeline<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        let deriver = AddressDeriver::new();
        Self {
            submitter: Submitter::new(Arc::clone(&rpc)),
            rpc,
            sequencer: InstructionSequencer::new(deriver.clone()),
            deriver,
            assembler: TransactionAssembler::new(),
            signer: MultiSigner::new(),
            content_store: None,
            metrics: None,
            confirm_poll_interval: DEFAULT_CONFIRM_POLL_INTERVAL,
            confirm_max_polls: DEFAULT_CONFIRM_MAX_POLLS,
        }
    }

    pub fn with_assembler(mut self, assembler: TransactionAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Order by declared `after` edges only
    pub fn without_account_inference(mut self) -> Self {
        self.sequencer = self.sequencer.without_inference();
        self
    }

    pub fn with_content_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.content_store = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.submitter = self.submitter.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submitter = self.submitter.with_timeout(timeout);
        self
    }

    pub fn with_confirmation(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.confirm_poll_interval = poll_interval;
        self.confirm_max_polls = max_polls;
        self
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn rpc(&self) -> &Arc<R> {
        &self.rpc
    }

    /// Run every stage up to and including signing; nothing is sent
    pub async fn build(
        &self,
        request: &TransactionRequest,
        trace: Option<TraceContext>,
    ) -> Result<SignedTransaction, PipelineError> {
        let declared: HashMap<&str, usize> = request
            .effects
            .iter()
            .enumerate()
            .map(|(index, planned)| (planned.label.as_str(), index))
            .collect();

        let effects = self.resolve_content(request.effects.clone()).await?;

        let timer = Timer::new();
        let ordered = self.sequencer.sequence(effects)?;

        let ctx = EffectContext {
            payer: request.payer,
            deriver: &self.deriver,
        };
        let mut instructions = Vec::with_capacity(ordered.len());
        for planned in &ordered {
            let index = declared.get(planned.label.as_str()).copied().unwrap_or_default();
            let ixs = planned
                .effect
                .build(&ctx)
                .map_err(|e| effect_error(index, planned, e))?;
            instructions.extend(ixs);
        }

        let exec = ExecutionContext::prepare(self.rpc.as_ref(), &request.freshness, trace).await?;
        if let Some(trace) = &exec.trace_context {
            debug!(
                correlation_id = %trace.correlation_id(),
                operation = %trace.operation,
                durable = exec.is_durable(),
                "Freshness bound to attempt"
            );
        }
        let unsigned = self
            .assembler
            .assemble(&request.payer, &exec.freshness, &instructions)?;

        if let Some(metrics) = &self.metrics {
            timer.observe_duration(&metrics.assemble_latency);
            metrics.transaction_size.observe(unsigned.wire_size() as f64);
        }

        let signed = self.signer.sign(unsigned, &request.signers).await?;
        Ok(signed)
    }

    /// Build, sign and submit one transaction
    ///
    /// `Ok` covers every outcome where the network may have the
    /// transaction, including [`SubmissionOutcome::Unknown`]. Deterministic
    /// refusals and structural failures are `Err`.
    pub async fn execute(&self, request: TransactionRequest) -> Result<SubmissionOutcome, PipelineError> {
        self.execute_traced(request, TraceContext::new("execute")).await
    }

    /// [`execute`](Self::execute) under a caller-supplied trace context
    ///
    /// Every log line of the attempt carries the context's correlation id.
    #[instrument(
        skip_all,
        fields(
            trace_id = %trace.trace_id(),
            span_id = %trace.span_id(),
            correlation_id = %trace.correlation_id(),
            payer = %request.payer,
            effects = request.effects.len()
        )
    )]
    pub async fn execute_traced(
        &self,
        request: TransactionRequest,
        trace: TraceContext,
    ) -> Result<SubmissionOutcome, PipelineError> {
        if let Some(metrics) = &self.metrics {
            metrics.attempts_total.inc();
        }

        let result = self.attempt(&request, trace).await;

        match &result {
            Ok(outcome) => {
                info!(signature = %outcome.transaction_id(), known = outcome.is_known(), "Pipeline attempt finished");
            }
            Err(e) => {
                warn!(stage = %e.stage(), category = e.category(), error = %e, "Pipeline attempt failed");
            }
        }

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(SubmissionOutcome::Accepted(_)) => metrics.accepted_total.inc(),
                Ok(SubmissionOutcome::Recovered(_)) => {
                    metrics.ambiguous_total.inc();
                    metrics.recovered_total.inc();
                }
                Ok(SubmissionOutcome::Unknown { .. }) => {
                    metrics.ambiguous_total.inc();
                    metrics.unknown_total.inc();
                }
                Err(e) => metrics.record_failure(e.category()),
            }
        }

        result
    }

    async fn attempt(
        &self,
        request: &TransactionRequest,
        trace: TraceContext,
    ) -> Result<SubmissionOutcome, PipelineError> {
        let signed = self.build(request, Some(trace)).await?;
        let expected = signed.transaction_id();

        match self.submitter.submit(signed).await {
            Ok(signature) => Ok(SubmissionOutcome::Accepted(signature)),
            Err(SubmissionError::AmbiguousFailure(failure)) => {
                match FailureRecoverer::expecting(expected).recover(&failure) {
                    Some(signature) => {
                        info!(signature = %signature, "Recovered transaction id from ambiguous failure");
                        Ok(SubmissionOutcome::Recovered(signature))
                    }
                    None => {
                        warn!(
                            expected = %expected,
                            raw = %failure.raw,
                            "Submission outcome unknown; check status before resubmitting"
                        );
                        Ok(SubmissionOutcome::Unknown { expected, failure })
                    }
                }
            }
            Err(rejected) => Err(rejected.into()),
        }
    }

    /// Query the status of a submitted transaction
    pub async fn status(&self, signature: &Signature) -> Result<Option<SignatureStatus>, PipelineError> {
        self.rpc
            .signature_status(signature)
            .await
            .map_err(|e| PipelineError::rpc(Stage::Status, e))
    }

    /// Run dependent transactions in order
    ///
    /// Each step fetches its own freshness token when it is built. Under
    /// [`ChainPolicy::ConfirmBeforeNext`] a step that fails on-chain or
    /// never confirms halts the chain with [`PipelineError::ChainHalted`].
    pub async fn execute_chain(
        &self,
        requests: Vec<TransactionRequest>,
        policy: ChainPolicy,
    ) -> Result<Vec<SubmissionOutcome>, PipelineError> {
        let root = TraceContext::new("chain");
        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, request) in requests.into_iter().enumerate() {
            let outcome = self
                .execute_traced(request, root.child_span(&format!("step-{}", index)))
                .await?;

            if policy == ChainPolicy::ConfirmBeforeNext && index + 1 < total {
                self.await_confirmation(index, outcome.transaction_id()).await?;
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    async fn await_confirmation(&self, index: usize, signature: Signature) -> Result<(), PipelineError> {
        for poll in 0..self.confirm_max_polls {
            match self.status(&signature).await {
                Ok(Some(status)) if status.is_confirmed() => {
                    info!(step = index, signature = %signature, polls = poll + 1, "Chain step confirmed");
                    return Ok(());
                }
                Ok(Some(SignatureStatus::Failed(reason))) => {
                    return Err(PipelineError::ChainHalted {
                        index,
                        signature,
                        reason,
                    });
                }
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!(step = index, error = %e, "Status poll failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.confirm_poll_interval).await;
        }

        Err(PipelineError::ChainHalted {
            index,
            signature,
            reason: format!("not confirmed after {} status polls", self.confirm_max_polls),
        })
    }

    /// Lamports needed for an account of `space` bytes to be rent exempt
    pub async fn rent_exempt_lamports(&self, space: usize) -> Result<u64, PipelineError> {
        self.rpc
            .minimum_balance_for_rent_exemption(space)
            .await
            .map_err(|e| PipelineError::rpc(Stage::BuildEffect, e))
    }

    pub async fn balance(&self, account: &Pubkey) -> Result<u64, PipelineError> {
        self.rpc
            .balance(account)
            .await
            .map_err(|e| PipelineError::rpc(Stage::Status, e))
    }

    /// Upload pending metadata documents and embed the returned uris
    async fn resolve_content(&self, mut effects: Vec<PlannedEffect>) -> Result<Vec<PlannedEffect>, PipelineError> {
        for planned in effects.iter_mut() {
            let Effect::CreateMetadata { metadata, .. } = &mut planned.effect else {
                continue;
            };
            let MetadataUri::Pending(document) = &metadata.uri else {
                continue;
            };

            let store = self.content_store.as_ref().ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "effect '{}' has an unresolved metadata document and no content store is configured",
                    planned.label
                ))
            })?;

            let uri = store.upload(document).await?;
            info!(label = %planned.label, uri = %uri, "Metadata document resolved");
            metadata.uri = MetadataUri::Resolved(uri);
        }
        Ok(effects)
    }
}
