//! End-to-end pipeline tests against an in-memory ledger
//!
//! Covers:
//! - accepted, recovered and unknown submission outcomes
//! - deterministic rejection
//! - structural failures never reaching the network
//! - concurrent pipelines with independent freshness
//! - chained transactions under both chain policies
//! - pending metadata upload and durable nonce freshness
//! - non-fungible mints sealed by a master edition
//! - correlation ids on attempt logs

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_program,
    transaction::VersionedTransaction,
};

use txpipe::observability::TraceContext;
use txpipe::rpc::{LedgerRpc, LedgerRpcError, SignatureStatus};
use txpipe::tx_builder::metadata::ContentStoreError;
use txpipe::tx_builder::{
    AmbiguousFailure, AssemblyError, ChainPolicy, ContentStore, DependencyError, Effect, FreshnessSource,
    LocalSigner, MetadataDocument, MetadataUri, PipelineError, PlannedEffect, RejectionReason, SignatureError,
    SubmissionError, SubmissionOutcome, TokenMetadata, TransactionRequest, TxPipeline, MINT_ACCOUNT_SPACE,
    TOKEN_METADATA_PROGRAM_ID,
};

#[derive(Debug, Clone)]
enum SendBehavior {
    Accept,
    Reject(RejectionReason),
    /// Transport error whose text mentions the signature
    AmbiguousWithSignature,
    /// Transport error with nothing recoverable in it
    AmbiguousSilent,
    /// Transport error whose logs mention some other transaction
    AmbiguousForeign(Signature),
    /// Never answers
    Hang,
}

struct MockLedger {
    send_behavior: SendBehavior,
    status: Option<SignatureStatus>,
    nonce: Hash,
    blockhash_calls: AtomicUsize,
    nonce_calls: AtomicUsize,
    send_calls: AtomicUsize,
    status_calls: AtomicUsize,
    sent: Mutex<Vec<VersionedTransaction>>,
}

impl MockLedger {
    fn new(send_behavior: SendBehavior) -> Self {
        Self {
            send_behavior,
            status: Some(SignatureStatus::Confirmed),
            nonce: Hash::new_unique(),
            blockhash_calls: AtomicUsize::new(0),
            nonce_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn with_status(mut self, status: Option<SignatureStatus>) -> Self {
        self.status = status;
        self
    }

    fn sends(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerRpcError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Hash::new_unique())
    }

    async fn nonce_value(&self, _nonce_account: &Pubkey) -> Result<Hash, LedgerRpcError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce)
    }

    async fn minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64, LedgerRpcError> {
        Ok(890_880 + space as u64 * 6_960)
    }

    async fn balance(&self, _account: &Pubkey) -> Result<u64, LedgerRpcError> {
        Ok(1_000_000_000)
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SubmissionError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(tx.clone());
        let signature = tx.signatures[0];

        match &self.send_behavior {
            SendBehavior::Accept => Ok(signature),
            SendBehavior::Reject(reason) => Err(SubmissionError::rejected(reason.clone())),
            SendBehavior::AmbiguousWithSignature => Err(SubmissionError::AmbiguousFailure(AmbiguousFailure::new(
                format!("connection reset by peer after write; tx {}", signature),
            ))),
            SendBehavior::AmbiguousSilent => Err(SubmissionError::ambiguous("connection reset by peer")),
            SendBehavior::AmbiguousForeign(other) => Err(SubmissionError::AmbiguousFailure(
                AmbiguousFailure::new("relay dropped the connection")
                    .with_logs(vec![format!("previous bundle landed: {}", other)]),
            )),
            SendBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(signature)
            }
        }
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<Option<SignatureStatus>, LedgerRpcError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.clone())
    }
}

struct StaticContentStore {
    uri: String,
    uploads: AtomicUsize,
}

#[async_trait]
impl ContentStore for StaticContentStore {
    async fn upload(&self, _document: &MetadataDocument) -> Result<String, ContentStoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(self.uri.clone())
    }
}

/// In-memory log sink for a scoped fmt subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn transfer_request(payer: Keypair, lamports: u64) -> TransactionRequest {
    let payer_key = payer.pubkey();
    TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "pay",
            Effect::Transfer {
                from: payer_key,
                to: Pubkey::new_unique(),
                lamports,
            },
        ))
        .with_signer(Arc::new(LocalSigner::new(payer)))
}

fn mint_request(payer: &Arc<LocalSigner>, payer_key: Pubkey, mint: Keypair, uri: MetadataUri) -> TransactionRequest {
    let mint_key = mint.pubkey();
    TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "metadata",
            Effect::CreateMetadata {
                mint: mint_key,
                mint_authority: payer_key,
                update_authority: payer_key,
                metadata: TokenMetadata::new("Monkey", "MOK", uri),
            },
        ))
        .with_effect(PlannedEffect::new(
            "initialize-mint",
            Effect::InitializeMint {
                mint: mint_key,
                decimals: 0,
                mint_authority: payer_key,
                freeze_authority: None,
            },
        ))
        .with_effect(PlannedEffect::new(
            "create-mint",
            Effect::CreateAccount {
                new_account: mint_key,
                lamports: 1_461_600,
                space: MINT_ACCOUNT_SPACE,
                owner: spl_token::id(),
            },
        ))
        .with_signer(payer.clone())
        .with_signer(Arc::new(LocalSigner::new(mint)))
}

#[tokio::test]
async fn test_accepted_submission() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let outcome = pipeline.execute(transfer_request(Keypair::new(), 5_000)).await.unwrap();

    let sent = ledger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(outcome, SubmissionOutcome::Accepted(sent[0].signatures[0]));
    assert_eq!(ledger.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ambiguous_failure_recovers_id_without_status_lookup() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::AmbiguousWithSignature));
    let pipeline = TxPipeline::new(ledger.clone());

    let outcome = pipeline.execute(transfer_request(Keypair::new(), 5_000)).await.unwrap();

    let expected = ledger.sent()[0].signatures[0];
    assert_eq!(outcome, SubmissionOutcome::Recovered(expected));
    assert_eq!(ledger.sends(), 1);
    assert_eq!(ledger.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_silent_ambiguous_failure_is_unknown_with_expected_id() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::AmbiguousSilent));
    let pipeline = TxPipeline::new(ledger.clone());

    let outcome = pipeline.execute(transfer_request(Keypair::new(), 5_000)).await.unwrap();

    let expected = ledger.sent()[0].signatures[0];
    match outcome {
        SubmissionOutcome::Unknown { expected: id, failure } => {
            assert_eq!(id, expected);
            assert_eq!(failure.raw, "connection reset by peer");
        }
        other => panic!("expected unknown outcome, got {:?}", other),
    }
    // no resubmission behind the caller's back
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test]
async fn test_foreign_signature_in_failure_is_unknown() {
    let foreign = Keypair::new().sign_message(b"earlier bundle");
    let ledger = Arc::new(MockLedger::new(SendBehavior::AmbiguousForeign(foreign)));
    let pipeline = TxPipeline::new(ledger.clone());

    let outcome = pipeline.execute(transfer_request(Keypair::new(), 5_000)).await.unwrap();

    let expected = ledger.sent()[0].signatures[0];
    assert!(!outcome.is_known());
    assert_ne!(outcome.transaction_id(), foreign);
    assert_eq!(outcome.transaction_id(), expected);
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test]
async fn test_submit_timeout_is_unknown_with_expected_id() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Hang));
    let pipeline = TxPipeline::new(ledger.clone()).with_submit_timeout(Duration::from_millis(50));

    let outcome = pipeline.execute(transfer_request(Keypair::new(), 5_000)).await.unwrap();

    let expected = ledger.sent()[0].signatures[0];
    match outcome {
        SubmissionOutcome::Unknown { expected: id, failure } => {
            assert_eq!(id, expected);
            assert!(failure.echoed_signature.is_none());
        }
        other => panic!("expected unknown outcome, got {:?}", other),
    }
    assert_eq!(ledger.sends(), 1);
    assert_eq!(ledger.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejection_is_an_error() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Reject(RejectionReason::StaleFreshness)));
    let pipeline = TxPipeline::new(ledger.clone());

    let err = pipeline
        .execute(transfer_request(Keypair::new(), 5_000))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Submission(SubmissionError::RejectedByNetwork {
            reason: RejectionReason::StaleFreshness,
            ..
        })
    ));
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test]
async fn test_cycle_fails_before_any_network_call() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let transfer = |to| Effect::Transfer {
        from: payer_key,
        to,
        lamports: 1,
    };
    let request = TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new("a", transfer(Pubkey::new_unique())).after("b"))
        .with_effect(PlannedEffect::new("b", transfer(Pubkey::new_unique())).after("a"))
        .with_signer(Arc::new(LocalSigner::new(payer)));

    let err = pipeline.execute(request).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Dependency(DependencyError::CyclicDependency { .. })
    ));
    assert_eq!(ledger.blockhash_calls.load(Ordering::SeqCst), 0);
    assert_eq!(ledger.sends(), 0);
}

#[tokio::test]
async fn test_oversized_transaction_never_sent() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let mut request = TransactionRequest::new(payer_key).with_signer(Arc::new(LocalSigner::new(payer)));
    for i in 0..40 {
        request = request.with_effect(PlannedEffect::new(
            format!("pay-{}", i),
            Effect::Transfer {
                from: payer_key,
                to: Pubkey::new_unique(),
                lamports: 1,
            },
        ));
    }

    let err = pipeline.execute(request).await.unwrap_err();

    match err {
        PipelineError::Assembly(AssemblyError::TransactionTooLarge { size, limit }) => {
            assert_eq!(limit, 1232);
            assert!(size > limit);
        }
        other => panic!("expected size error, got {:?}", other),
    }
    assert_eq!(ledger.sends(), 0);
}

#[tokio::test]
async fn test_missing_signer_never_sent() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let mint = Keypair::new();
    let mint_key = mint.pubkey();

    // the mint keypair is never handed to the pipeline
    let request = TransactionRequest::new(payer_key)
        .with_effect(PlannedEffect::new(
            "create-mint",
            Effect::CreateAccount {
                new_account: mint_key,
                lamports: 1_461_600,
                space: MINT_ACCOUNT_SPACE,
                owner: spl_token::id(),
            },
        ))
        .with_signer(Arc::new(LocalSigner::new(payer)));

    let err = pipeline.execute(request).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Signature(SignatureError::MissingSignature { ref missing }) if missing == &vec![mint_key]
    ));
    assert_eq!(ledger.sends(), 0);
}

#[tokio::test]
async fn test_concurrent_pipelines_fetch_their_own_freshness() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = Arc::new(TxPipeline::new(ledger.clone()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.execute(transfer_request(Keypair::new(), 1_000 + i)).await })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_known());
    }

    assert_eq!(ledger.blockhash_calls.load(Ordering::SeqCst), 4);
    let hashes: HashSet<Hash> = ledger
        .sent()
        .iter()
        .map(|tx| *tx.message.recent_blockhash())
        .collect();
    assert_eq!(hashes.len(), 4);
}

#[tokio::test]
async fn test_chain_halts_when_step_fails_on_chain() {
    let ledger = Arc::new(
        MockLedger::new(SendBehavior::Accept)
            .with_status(Some(SignatureStatus::Failed("InstructionError(0, Custom(1))".to_string()))),
    );
    let pipeline = TxPipeline::new(ledger.clone()).with_confirmation(Duration::from_millis(1), 3);

    let requests = vec![
        transfer_request(Keypair::new(), 1),
        transfer_request(Keypair::new(), 2),
    ];
    let err = pipeline
        .execute_chain(requests, ChainPolicy::ConfirmBeforeNext)
        .await
        .unwrap_err();

    match err {
        PipelineError::ChainHalted { index, signature, .. } => {
            assert_eq!(index, 0);
            assert_eq!(signature, ledger.sent()[0].signatures[0]);
        }
        other => panic!("expected chain halt, got {:?}", other),
    }
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test]
async fn test_chain_halts_when_step_never_confirms() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept).with_status(None));
    let pipeline = TxPipeline::new(ledger.clone()).with_confirmation(Duration::from_millis(1), 3);

    let requests = vec![
        transfer_request(Keypair::new(), 1),
        transfer_request(Keypair::new(), 2),
    ];
    let err = pipeline
        .execute_chain(requests, ChainPolicy::ConfirmBeforeNext)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ChainHalted { index: 0, .. }));
    assert_eq!(ledger.status_calls.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.sends(), 1);
}

#[tokio::test]
async fn test_chain_confirms_each_step_before_the_next() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone()).with_confirmation(Duration::from_millis(1), 3);

    let requests = vec![
        transfer_request(Keypair::new(), 1),
        transfer_request(Keypair::new(), 2),
        transfer_request(Keypair::new(), 3),
    ];
    let outcomes = pipeline
        .execute_chain(requests, ChainPolicy::ConfirmBeforeNext)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(ledger.sends(), 3);
    // the last step is not awaited
    assert_eq!(ledger.status_calls.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.blockhash_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_optimistic_chain_skips_status_polls() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept).with_status(None));
    let pipeline = TxPipeline::new(ledger.clone());

    let requests = vec![
        transfer_request(Keypair::new(), 1),
        transfer_request(Keypair::new(), 2),
    ];
    let outcomes = pipeline.execute_chain(requests, ChainPolicy::Optimistic).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(ledger.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pending_metadata_is_uploaded_and_embedded() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let store = Arc::new(StaticContentStore {
        uri: "https://cdn.example.com/monkey.json".to_string(),
        uploads: AtomicUsize::new(0),
    });
    let pipeline = TxPipeline::new(ledger.clone()).with_content_store(store.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let payer = Arc::new(LocalSigner::new(payer));
    let document = MetadataDocument {
        name: "Monkey".to_string(),
        symbol: "MOK".to_string(),
        description: "a monkey".to_string(),
        image: None,
        attributes: vec![],
    };

    let outcome = pipeline
        .execute(mint_request(&payer, payer_key, Keypair::new(), MetadataUri::Pending(document)))
        .await
        .unwrap();
    assert!(outcome.is_known());
    assert_eq!(store.uploads.load(Ordering::SeqCst), 1);

    let tx = &ledger.sent()[0];
    let data: Vec<u8> = tx
        .message
        .instructions()
        .iter()
        .flat_map(|ix| ix.data.clone())
        .collect();
    assert!(data
        .windows(store.uri.len())
        .any(|w| w == store.uri.as_bytes()));

    // create-account, initialize-mint, metadata regardless of declaration order
    let keys = tx.message.static_account_keys();
    let programs: Vec<Pubkey> = tx
        .message
        .instructions()
        .iter()
        .map(|ix| keys[ix.program_id_index as usize])
        .collect();
    assert_eq!(programs[0], system_program::id());
    assert_eq!(programs[1], spl_token::id());
    assert_eq!(programs[2], txpipe::tx_builder::TOKEN_METADATA_PROGRAM_ID);
}

#[tokio::test]
async fn test_pending_metadata_without_store_is_configuration_error() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let payer = Arc::new(LocalSigner::new(payer));
    let document = MetadataDocument {
        name: "Monkey".to_string(),
        symbol: "MOK".to_string(),
        description: String::new(),
        image: None,
        attributes: vec![],
    };

    let err = pipeline
        .execute(mint_request(&payer, payer_key, Keypair::new(), MetadataUri::Pending(document)))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Configuration(_)));
    assert_eq!(ledger.sends(), 0);
}

#[tokio::test]
async fn test_durable_nonce_freshness() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let nonce_account = Pubkey::new_unique();

    let request = transfer_request(payer, 5_000).with_freshness(FreshnessSource::DurableNonce {
        nonce_account,
        authority: payer_key,
    });
    pipeline.execute(request).await.unwrap();

    assert_eq!(ledger.blockhash_calls.load(Ordering::SeqCst), 0);
    assert_eq!(ledger.nonce_calls.load(Ordering::SeqCst), 1);

    let tx = &ledger.sent()[0];
    assert_eq!(*tx.message.recent_blockhash(), ledger.nonce);

    // advance-nonce leads the instruction list
    let keys = tx.message.static_account_keys();
    let first = &tx.message.instructions()[0];
    assert_eq!(keys[first.program_id_index as usize], system_program::id());
    assert_eq!(keys[first.accounts[0] as usize], nonce_account);
}

#[tokio::test]
async fn test_build_signs_without_sending() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let signed = pipeline
        .build(&transfer_request(Keypair::new(), 5_000), None)
        .await
        .unwrap();

    assert!(signed.tx_ref().verify_with_results().iter().all(|ok| *ok));
    assert!(signed.wire_bytes().unwrap().len() <= 1232);
    assert_eq!(ledger.sends(), 0);
}

#[tokio::test]
async fn test_nft_is_sealed_by_master_edition() {
    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());

    let payer = Keypair::new();
    let payer_key = payer.pubkey();
    let payer = Arc::new(LocalSigner::new(payer));
    let mint = Keypair::new();
    let mint_key = mint.pubkey();

    let request = mint_request(
        &payer,
        payer_key,
        mint,
        MetadataUri::Resolved("https://example.com/nft.json".to_string()),
    )
    .with_effect(
        PlannedEffect::new(
            "master-edition",
            Effect::CreateMasterEdition {
                mint: mint_key,
                update_authority: payer_key,
                mint_authority: payer_key,
                holder: payer_key,
                max_supply: Some(0),
            },
        )
        .after("mint-one"),
    )
    .with_effect(PlannedEffect::new(
        "mint-one",
        Effect::MintTo {
            mint: mint_key,
            wallet: payer_key,
            mint_authority: payer_key,
            amount: 1,
        },
    ))
    .with_effect(PlannedEffect::new(
        "owner-account",
        Effect::CreateAssociatedAccount {
            wallet: payer_key,
            mint: mint_key,
            idempotent: true,
        },
    ));

    let signed = pipeline.build(&request, None).await.unwrap();

    let tx = signed.tx_ref();
    let keys = tx.message.static_account_keys();
    let last = tx.message.instructions().last().unwrap();
    assert_eq!(keys[last.program_id_index as usize], TOKEN_METADATA_PROGRAM_ID);
    assert_eq!(last.data, vec![17, 1, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert!(signed.wire_bytes().unwrap().len() <= 1232);
}

#[tokio::test]
async fn test_attempt_logs_carry_correlation_id() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let ledger = Arc::new(MockLedger::new(SendBehavior::Accept));
    let pipeline = TxPipeline::new(ledger.clone());
    let trace = TraceContext::new("checkout");
    let correlation = trace.correlation_id().clone();

    let outcome = pipeline
        .execute_traced(transfer_request(Keypair::new(), 5_000), trace)
        .await
        .unwrap();

    assert!(outcome.is_known());
    let text = logs.text();
    assert!(text.contains(&format!("correlation_id={}", correlation)));
    assert!(text.contains("Freshness bound to attempt"));
}
