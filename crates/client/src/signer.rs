//! # Transaction signers
//!
//! One signer is chosen per session from the wallet's capabilities and
//! used by every flow:
//!
//! ```text
//! RawSigner                            SponsoredKindSigner
//! ─────────                            ───────────────────
//! relay.build(sender, call)            kind bytes = MoveCall
//!   │ (fail ⇒ TxError::Build)            │
//! wallet.sign_transaction(bytes)       sponsor.sponsor_kind(sender, kind)
//!   │ (network ⇒ retry, reject ⇒         │ (fail ⇒ TxError::Build)
//!   │  Cancelled)                      wallet.sign_and_execute(tx)
//! relay.execute(bytes, signature)        │ (reject ⇒ Cancelled)
//!   ▼                                    ▼
//! SubmitOutcome::Executed              SubmitOutcome::Executed
//! ```
//!
//! A build failure always aborts before the wallet is asked to sign, so no
//! partially signed transaction is ever left behind.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::{info, warn};

use commity_common::error::{classify, TxErrorClass};
use commity_common::{Address, ExecutionResult, MoveCall, MoveCallError, TransactionKind};

use crate::poll::{retry_with_backoff, RetryConfig};
use crate::sponsor::{KindSponsor, SponsorRelay};
use crate::wallet::{Wallet, WalletError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Executed(ExecutionResult),
    /// The user declined the signature prompt. Not an error.
    Cancelled,
}

impl SubmitOutcome {
    pub fn digest(&self) -> Option<&str> {
        match self {
            SubmitOutcome::Executed(r) => Some(&r.digest),
            SubmitOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("invalid move call: {0}")]
    Invalid(#[from] MoveCallError),

    #[error("transaction build failed: {0}")]
    Build(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl TxError {
    pub fn class(&self) -> TxErrorClass {
        match self {
            TxError::Build(msg) => match classify(msg) {
                TxErrorClass::MoveAbort(info) => TxErrorClass::MoveAbort(info),
                _ => TxErrorClass::SponsorFailure(msg.clone()),
            },
            TxError::Invalid(e) => TxErrorClass::Other(e.to_string()),
            TxError::Signing(msg) | TxError::Execution(msg) => classify(msg),
        }
    }

    pub fn user_message(&self) -> String {
        self.class()
            .user_message()
            .unwrap_or_else(|| "İşlem iptal edildi".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    Raw,
    SponsoredKind,
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn kind(&self) -> SignerKind;

    fn address(&self) -> Address;

    async fn submit(&self, call: &MoveCall) -> Result<SubmitOutcome, TxError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// RAW SIGNER
// ════════════════════════════════════════════════════════════════════════════════

pub struct RawSigner {
    wallet: Arc<dyn Wallet>,
    relay: Arc<dyn SponsorRelay>,
    retry: RetryConfig,
}

impl RawSigner {
    pub fn new(wallet: Arc<dyn Wallet>, relay: Arc<dyn SponsorRelay>) -> Self {
        Self {
            wallet,
            relay,
            retry: RetryConfig::linear(3, 1_000),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl TransactionSigner for RawSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Raw
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn submit(&self, call: &MoveCall) -> Result<SubmitOutcome, TxError> {
        call.validate()?;
        let sender = self.wallet.address();
        let target = call.target();

        let tx = self
            .relay
            .build(&sender, call)
            .await
            .map_err(|e| TxError::Build(e.to_string()))?;
        let bytes = STANDARD
            .decode(&tx.bytes)
            .map_err(|e| TxError::Build(format!("sponsor returned undecodable bytes: {}", e)))?;

        let signed = retry_with_backoff(
            &self.retry,
            || self.wallet.sign_transaction(&bytes),
            WalletError::is_retryable,
        )
        .await;

        let signature = match signed {
            Ok((sig, _attempts)) => sig,
            Err(exhausted) if exhausted.last_error == WalletError::Rejected => {
                info!(%target, "signature rejected by user");
                return Ok(SubmitOutcome::Cancelled);
            }
            Err(exhausted) => {
                warn!(%target, attempts = exhausted.attempts, error = %exhausted.last_error, "signing failed");
                return Err(TxError::Signing(exhausted.last_error.to_string()));
            }
        };

        let result = self
            .relay
            .execute(&tx.bytes, &signature)
            .await
            .map_err(|e| TxError::Execution(e.to_string()))?;

        info!(%target, digest = %result.digest, "transaction executed");
        Ok(SubmitOutcome::Executed(result))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SPONSORED KIND SIGNER
// ════════════════════════════════════════════════════════════════════════════════

pub struct SponsoredKindSigner {
    wallet: Arc<dyn Wallet>,
    sponsor: Arc<dyn KindSponsor>,
}

impl SponsoredKindSigner {
    pub fn new(wallet: Arc<dyn Wallet>, sponsor: Arc<dyn KindSponsor>) -> Self {
        Self { wallet, sponsor }
    }
}

#[async_trait]
impl TransactionSigner for SponsoredKindSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::SponsoredKind
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn submit(&self, call: &MoveCall) -> Result<SubmitOutcome, TxError> {
        call.validate()?;
        let sender = self.wallet.address();
        let target = call.target();

        let kind_bytes = TransactionKind::MoveCall(call.clone())
            .to_bytes()
            .map_err(|e| TxError::Build(e.to_string()))?;
        let tx = self
            .sponsor
            .sponsor_kind(&sender, &kind_bytes)
            .await
            .map_err(|e| TxError::Build(e.to_string()))?;

        match self.wallet.sign_and_execute(&tx).await {
            Ok(result) => {
                info!(%target, digest = %result.digest, "sponsored transaction executed");
                Ok(SubmitOutcome::Executed(result))
            }
            Err(WalletError::Rejected) => {
                info!(%target, "signature rejected by user");
                Ok(SubmitOutcome::Cancelled)
            }
            Err(e) => {
                warn!(%target, error = %e, "sign and execute failed");
                Err(TxError::Execution(e.to_string()))
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SELECTION
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("wallet can sign-and-execute only, but no kind sponsor is configured")]
    NoKindSponsor,

    #[error("wallet supports neither raw signing nor sign-and-execute")]
    NoCapability,
}

/// Pick the signer for a session.
///
/// Raw signing wins when available; a sign-and-execute-only wallet needs a
/// kind sponsor.
pub fn select_signer(
    wallet: Arc<dyn Wallet>,
    relay: Arc<dyn SponsorRelay>,
    kind_sponsor: Option<Arc<dyn KindSponsor>>,
) -> Result<Arc<dyn TransactionSigner>, SelectError> {
    let caps = wallet.capabilities();
    if caps.raw_signing {
        return Ok(Arc::new(RawSigner::new(wallet, relay)));
    }
    if caps.sign_and_execute {
        let sponsor = kind_sponsor.ok_or(SelectError::NoKindSponsor)?;
        return Ok(Arc::new(SponsoredKindSigner::new(wallet, sponsor)));
    }
    Err(SelectError::NoCapability)
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::DelayStrategy;
    use crate::sponsor::SponsorError;
    use crate::wallet::{KeypairWallet, WalletCapabilities};
    use commity_common::transaction::{GasData, TransactionData};
    use commity_common::{ObjectId, SponsoredTransaction, UserSignature};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pkg() -> ObjectId {
        ObjectId::parse("0xda0").expect("pkg")
    }

    fn call() -> MoveCall {
        MoveCall::create_profile(&pkg(), "commity", "nadolink")
    }

    /// Relay that builds real transaction bytes and records executions.
    struct MockRelay {
        fail_build: Option<String>,
        fail_execute: Option<String>,
        executed: AtomicU32,
    }

    impl MockRelay {
        fn ok() -> Self {
            Self {
                fail_build: None,
                fail_execute: None,
                executed: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SponsorRelay for MockRelay {
        async fn build(&self, sender: &Address, call: &MoveCall) -> Result<SponsoredTransaction, SponsorError> {
            if let Some(msg) = &self.fail_build {
                return Err(SponsorError::Build(msg.clone()));
            }
            let data = TransactionData {
                sender: sender.clone(),
                kind: TransactionKind::MoveCall(call.clone()),
                gas: GasData {
                    owner: Address::parse("0x5").expect("sponsor"),
                    budget: 10,
                    price: 1,
                },
                expiration_epoch: None,
            };
            let bytes = data.to_bytes().expect("bytes");
            Ok(SponsoredTransaction {
                bytes: STANDARD.encode(&bytes),
                digest: commity_common::transaction::digest(&bytes),
                sponsor_signature: None,
            })
        }

        async fn execute(&self, tx_bytes: &str, signature: &UserSignature) -> Result<ExecutionResult, SponsorError> {
            if let Some(msg) = &self.fail_execute {
                return Err(SponsorError::Execute(msg.clone()));
            }
            let bytes = STANDARD.decode(tx_bytes).expect("b64");
            signature.verify(&bytes).expect("valid signature");
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult {
                digest: commity_common::transaction::digest(&bytes),
                created: vec![],
            })
        }
    }

    /// Wallet scripted with a queue of sign results.
    struct ScriptedWallet {
        inner: KeypairWallet,
        caps: WalletCapabilities,
        script: Mutex<VecDeque<WalletError>>,
        sign_calls: AtomicU32,
        execute_result: Option<WalletError>,
    }

    impl ScriptedWallet {
        fn new(errors: Vec<WalletError>) -> Self {
            Self {
                inner: KeypairWallet::generate().expect("wallet"),
                caps: WalletCapabilities {
                    raw_signing: true,
                    sign_and_execute: false,
                },
                script: Mutex::new(errors.into()),
                sign_calls: AtomicU32::new(0),
                execute_result: None,
            }
        }

        fn zklogin(execute_result: Option<WalletError>) -> Self {
            let mut w = Self::new(vec![]);
            w.caps = WalletCapabilities {
                raw_signing: false,
                sign_and_execute: true,
            };
            w.execute_result = execute_result;
            w
        }
    }

    #[async_trait]
    impl Wallet for ScriptedWallet {
        fn address(&self) -> Address {
            self.inner.address()
        }

        fn capabilities(&self) -> WalletCapabilities {
            self.caps
        }

        async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<UserSignature, WalletError> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.script.lock().pop_front() {
                return Err(e);
            }
            self.inner.sign_transaction(tx_bytes).await
        }

        async fn sign_and_execute(&self, tx: &SponsoredTransaction) -> Result<ExecutionResult, WalletError> {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            match &self.execute_result {
                Some(e) => Err(e.clone()),
                None => Ok(ExecutionResult {
                    digest: tx.digest.clone(),
                    created: vec![],
                }),
            }
        }
    }

    struct FixedKindSponsor {
        fail: bool,
    }

    #[async_trait]
    impl KindSponsor for FixedKindSponsor {
        async fn sponsor_kind(&self, _sender: &Address, kind: &[u8]) -> Result<SponsoredTransaction, SponsorError> {
            if self.fail {
                return Err(SponsorError::Build("sponsor quota exceeded".into()));
            }
            TransactionKind::from_bytes(kind).expect("kind decodes");
            Ok(SponsoredTransaction {
                bytes: STANDARD.encode(kind),
                digest: "0xkind".into(),
                sponsor_signature: Some("sig".into()),
            })
        }
    }

    fn no_delay_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            delay: DelayStrategy::Fixed { delay_ms: 0 },
        }
    }

    #[tokio::test]
    async fn raw_path_signs_and_executes() {
        let wallet = Arc::new(ScriptedWallet::new(vec![]));
        let relay = Arc::new(MockRelay::ok());
        let signer = RawSigner::new(wallet.clone(), relay.clone());

        let outcome = signer.submit(&call()).await.expect("submit");
        assert!(outcome.digest().is_some());
        assert_eq!(relay.executed.load(Ordering::SeqCst), 1);
        assert_eq!(signer.kind(), SignerKind::Raw);
    }

    #[tokio::test]
    async fn build_failure_never_prompts_wallet() {
        let wallet = Arc::new(ScriptedWallet::new(vec![]));
        let relay = Arc::new(MockRelay {
            fail_build: Some("insufficient sponsor gas".into()),
            ..MockRelay::ok()
        });
        let signer = RawSigner::new(wallet.clone(), relay.clone());

        let err = signer.submit(&call()).await.expect_err("build fails");
        assert!(matches!(err, TxError::Build(_)));
        assert_eq!(wallet.sign_calls.load(Ordering::SeqCst), 0);
        assert_eq!(relay.executed.load(Ordering::SeqCst), 0);
        assert!(matches!(err.class(), TxErrorClass::SponsorFailure(_)));
    }

    #[tokio::test]
    async fn rejection_is_silent_cancel() {
        let wallet = Arc::new(ScriptedWallet::new(vec![WalletError::Rejected]));
        let relay = Arc::new(MockRelay::ok());
        let signer = RawSigner::new(wallet.clone(), relay.clone()).with_retry(no_delay_retry());

        assert_eq!(signer.submit(&call()).await, Ok(SubmitOutcome::Cancelled));
        assert_eq!(wallet.sign_calls.load(Ordering::SeqCst), 1);
        assert_eq!(relay.executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn network_errors_are_retried() {
        let wallet = Arc::new(ScriptedWallet::new(vec![
            WalletError::Network("timeout".into()),
            WalletError::Network("connection reset".into()),
        ]));
        let relay = Arc::new(MockRelay::ok());
        let signer = RawSigner::new(wallet.clone(), relay.clone()).with_retry(no_delay_retry());

        assert!(matches!(signer.submit(&call()).await, Ok(SubmitOutcome::Executed(_))));
        assert_eq!(wallet.sign_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let wallet = Arc::new(ScriptedWallet::new(vec![WalletError::Network("timeout".into()); 5]));
        let relay = Arc::new(MockRelay::ok());
        let signer = RawSigner::new(wallet.clone(), relay).with_retry(no_delay_retry());

        assert!(matches!(signer.submit(&call()).await, Err(TxError::Signing(_))));
        assert_eq!(wallet.sign_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn move_abort_on_execute_maps_to_message() {
        let wallet = Arc::new(ScriptedWallet::new(vec![]));
        let relay = Arc::new(MockRelay {
            fail_execute: Some("MoveAbort(MoveLocation { function_name: Some(\"cast_vote\") }, 2) in command 0".into()),
            ..MockRelay::ok()
        });
        let signer = RawSigner::new(wallet, relay);

        let err = signer.submit(&call()).await.expect_err("abort");
        assert!(matches!(err.class(), TxErrorClass::MoveAbort(_)));
        assert_eq!(
            err.user_message(),
            commity_common::AbortReason::AlreadyVoted.user_message()
        );
    }

    #[tokio::test]
    async fn invalid_call_rejected_before_build() {
        let wallet = Arc::new(ScriptedWallet::new(vec![]));
        let relay = Arc::new(MockRelay::ok());
        let signer = RawSigner::new(wallet.clone(), relay);
        let mut bad = call();
        bad.arguments.clear();

        assert!(matches!(signer.submit(&bad).await, Err(TxError::Invalid(_))));
        assert_eq!(wallet.sign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn kind_path_executes_via_wallet() {
        let wallet = Arc::new(ScriptedWallet::zklogin(None));
        let signer = SponsoredKindSigner::new(wallet.clone(), Arc::new(FixedKindSponsor { fail: false }));

        let outcome = signer.submit(&call()).await.expect("submit");
        assert_eq!(outcome.digest(), Some("0xkind"));
    }

    #[tokio::test]
    async fn kind_path_sponsor_failure_aborts_before_signing() {
        let wallet = Arc::new(ScriptedWallet::zklogin(None));
        let signer = SponsoredKindSigner::new(wallet.clone(), Arc::new(FixedKindSponsor { fail: true }));

        assert!(matches!(signer.submit(&call()).await, Err(TxError::Build(_))));
        assert_eq!(wallet.sign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn kind_path_rejection_cancels() {
        let wallet = Arc::new(ScriptedWallet::zklogin(Some(WalletError::Rejected)));
        let signer = SponsoredKindSigner::new(wallet, Arc::new(FixedKindSponsor { fail: false }));
        assert_eq!(signer.submit(&call()).await, Ok(SubmitOutcome::Cancelled));
    }

    #[test]
    fn selection_follows_capabilities() {
        let relay: Arc<dyn SponsorRelay> = Arc::new(MockRelay::ok());
        let kind: Arc<dyn KindSponsor> = Arc::new(FixedKindSponsor { fail: false });

        let raw = select_signer(Arc::new(ScriptedWallet::new(vec![])), relay.clone(), Some(kind.clone()))
            .expect("raw");
        assert_eq!(raw.kind(), SignerKind::Raw);

        let zk = select_signer(Arc::new(ScriptedWallet::zklogin(None)), relay.clone(), Some(kind))
            .expect("kind");
        assert_eq!(zk.kind(), SignerKind::SponsoredKind);

        assert_eq!(
            select_signer(Arc::new(ScriptedWallet::zklogin(None)), relay, None).err(),
            Some(SelectError::NoKindSponsor)
        );
    }
}
