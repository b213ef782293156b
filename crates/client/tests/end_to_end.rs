//! # End-to-end flow tests
//!
//! The backend router runs on an ephemeral port over the in-process chain,
//! and the client drives it over real HTTP and WebSocket connections:
//! wallet → sponsor → chain → indexer → projections → polling / push.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use commity_backend::{router, AppState, Indexer, LocalChain, ProjectionStore, PushHub, Sponsor};
use commity_client::flows::community::create_community;
use commity_client::flows::finalize::finalize_proposal;
use commity_client::flows::nft::redeem_nft;
use commity_client::flows::profile::create_profile;
use commity_client::flows::proposal::{create_proposal, request_join, NewProposal};
use commity_client::flows::vote::cast_vote;
use commity_client::membership::{ChainReadError, DynamicFieldPage};
use commity_client::{
    select_signer, BackendClient, ChainReader, ContractRef, DelayStrategy, FlowError, FlowOutcome, FlowTimings,
    HandlerRegistry, KeypairWallet, MembershipVerifier, MessagingError, MessagingService, NotificationFeed,
    PollConfig, PushClient, PushState, ReconnectPolicy, Session, SignerKind, SubmitOutcome, Subscription,
    TransactionSigner, TxError, WsTransport,
};
use commity_common::{
    now_ms, AbortReason, Address, MoveCall, MoveFunction, NotificationKind, ObjectId, ProposalStatus, VoteType,
};

// ════════════════════════════════════════════════════════════════════════════
// HARNESS
// ════════════════════════════════════════════════════════════════════════════

const MODULE: &str = "commity";

struct Backend {
    base: String,
    ws: String,
    chain: Arc<LocalChain>,
    hub: PushHub,
    package: ObjectId,
}

async fn start_backend(index_delay: Option<Duration>) -> Backend {
    let package = ObjectId::parse("0xda0").expect("pkg");
    let store = Arc::new(ProjectionStore::new());
    let hub = PushHub::new(64);
    let indexer = Arc::new(Indexer::new(store.clone(), hub.clone(), package.clone(), MODULE));
    let mut chain = LocalChain::new(indexer);
    if let Some(delay) = index_delay {
        chain = chain.with_index_delay(delay);
    }
    let chain = Arc::new(chain);
    let sponsor = Arc::new(Sponsor::new(
        SigningKey::from_bytes(&[200u8; 32]),
        package.clone(),
        MODULE,
        50_000_000,
        1_000,
        chain.clone(),
    ));
    let app = router(AppState::new(store, hub.clone(), sponsor));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Backend {
        base: format!("http://{}", addr),
        ws: format!("ws://{}/ws", addr),
        chain,
        hub,
        package,
    }
}

/// Dynamic-field listing served from the in-process chain, two names per page.
struct LocalChainReader {
    chain: Arc<LocalChain>,
}

#[async_trait]
impl ChainReader for LocalChainReader {
    async fn dynamic_field_names(
        &self,
        object: &ObjectId,
        cursor: Option<String>,
    ) -> Result<DynamicFieldPage, ChainReadError> {
        let members = self.chain.members(object).ok_or_else(|| ChainReadError::Rpc {
            code: -32602,
            message: format!("object {} not found", object),
        })?;
        let start: usize = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + 2).min(members.len());
        let has_next_page = end < members.len();
        Ok(DynamicFieldPage {
            names: members[start..end].iter().map(ToString::to_string).collect(),
            next_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }
}

#[derive(Clone, Copy)]
enum Intercept {
    Fail(&'static str),
    /// The wallet prompt never returns.
    Hang,
}

/// Counts submissions so tests can assert nothing reached the sponsor, and
/// can stand in for a failing or unresponsive wallet on one entry point.
struct CountingSigner {
    inner: Arc<dyn TransactionSigner>,
    submitted: AtomicU32,
    intercept: Mutex<Option<(MoveFunction, Intercept)>>,
}

#[async_trait]
impl TransactionSigner for CountingSigner {
    fn kind(&self) -> SignerKind {
        self.inner.kind()
    }

    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn submit(&self, call: &MoveCall) -> Result<SubmitOutcome, TxError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let intercept = *self.intercept.lock();
        match intercept {
            Some((function, Intercept::Fail(msg))) if function == call.function => Err(TxError::Build(msg.into())),
            Some((function, Intercept::Hang)) if function == call.function => std::future::pending().await,
            _ => self.inner.submit(call).await,
        }
    }
}

/// Chat service that hands out `chan-<community>` and `msg-<n>` ids.
#[derive(Default)]
struct RecordingMessaging {
    posts: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl MessagingService for RecordingMessaging {
    async fn create_channel(
        &self,
        community: &ObjectId,
        _name: &str,
        _creator: &Address,
    ) -> Result<String, MessagingError> {
        Ok(format!("chan-{}", community))
    }

    async fn post_message(&self, channel_id: &str, _sender: &Address, text: &str) -> Result<String, MessagingError> {
        let mut posts = self.posts.lock();
        posts.push((channel_id.to_string(), text.to_string()));
        Ok(format!("msg-{}", posts.len()))
    }
}

struct User {
    session: Session,
    signer: Arc<CountingSigner>,
}

impl User {
    fn address(&self) -> &Address {
        &self.session.address
    }

    fn submissions(&self) -> u32 {
        self.signer.submitted.load(Ordering::SeqCst)
    }

    fn intercept(&self, function: MoveFunction, action: Intercept) {
        *self.signer.intercept.lock() = Some((function, action));
    }
}

fn user(backend: &Backend, seed: u8, timings: FlowTimings) -> User {
    let api = BackendClient::new(backend.base.clone(), Duration::from_secs(5)).expect("client");
    let wallet = Arc::new(KeypairWallet::new(SigningKey::from_bytes(&[seed; 32])));
    let inner = select_signer(wallet, Arc::new(api.clone()), None).expect("signer");
    assert_eq!(inner.kind(), SignerKind::Raw);
    let signer = Arc::new(CountingSigner {
        inner,
        submitted: AtomicU32::new(0),
        intercept: Mutex::new(None),
    });
    let membership = MembershipVerifier::new(
        Arc::new(LocalChainReader {
            chain: backend.chain.clone(),
        }),
        Arc::new(api.clone()),
    );
    let contract = ContractRef {
        package: backend.package.clone(),
        module: MODULE.to_string(),
    };
    let session = Session::new(signer.clone(), api, membership, contract).with_timings(timings);
    User { session, signer }
}

fn fast() -> FlowTimings {
    FlowTimings::immediate(5)
}

fn confirmed<T: std::fmt::Debug>(outcome: FlowOutcome<T>) -> T {
    match outcome {
        FlowOutcome::Confirmed(v) => v,
        other => panic!("expected confirmed outcome, got {:?}", other),
    }
}

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PROFILE
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn profile_creation_is_confirmed_and_idempotent() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());

    let profile = confirmed(create_profile(&alice.session, "nadolink").await.expect("flow"));
    assert_eq!(profile.nickname, "nadolink");
    assert_eq!(&profile.owner, alice.address());
    assert_eq!(alice.submissions(), 1);

    // second call finds the existing profile and submits nothing
    let again = confirmed(create_profile(&alice.session, "other").await.expect("flow"));
    assert_eq!(again.id, profile.id);
    assert_eq!(alice.submissions(), 1);
}

#[tokio::test]
async fn lagging_indexer_yields_optimistic_profile() {
    let backend = start_backend(Some(Duration::from_millis(1_500))).await;
    let alice = user(&backend, 1, FlowTimings::immediate(2));

    let outcome = create_profile(&alice.session, "nadolink").await.expect("flow");
    let local = match outcome {
        FlowOutcome::Optimistic(p) => p,
        other => panic!("expected optimistic outcome, got {:?}", other),
    };
    assert_eq!(local.nickname, "nadolink");
    assert_eq!(local.xp, 0);

    // the projection catches up on its own
    let api = alice.session.api.clone();
    let mut seen = None;
    for _ in 0..100 {
        if let Ok(Some(p)) = api.get_profile(alice.address()).await {
            seen = Some(p);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(seen.map(|p| p.id), Some(local.id));
}

#[tokio::test]
async fn polling_outlasts_short_lag() {
    let backend = start_backend(Some(Duration::from_millis(150))).await;
    let mut timings = FlowTimings::immediate(5);
    timings.profile = PollConfig::new(20, DelayStrategy::Fixed { delay_ms: 50 });
    let alice = user(&backend, 1, timings);

    let profile = confirmed(create_profile(&alice.session, "nadolink").await.expect("flow"));
    assert_eq!(profile.nickname, "nadolink");
}

// ════════════════════════════════════════════════════════════════════════════
// COMMUNITY / PROPOSAL / VOTE
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn community_without_profile_is_refused() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    let err = create_community(&alice.session, "Ankara").await.expect_err("no profile");
    assert_eq!(err, FlowError::ProfileRequired);
    assert_eq!(alice.submissions(), 0);
}

#[tokio::test]
async fn community_proposal_and_votes() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    let bob = user(&backend, 2, fast());
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    confirmed(create_profile(&bob.session, "bobby").await.expect("flow"));

    let setup = confirmed(create_community(&alice.session, "Ankara").await.expect("flow"));
    assert!(setup.joined);
    assert_eq!(setup.channel_id, None);
    assert_eq!(setup.community.name, "Ankara");
    assert_eq!(backend.chain.members(&setup.community.id), Some(vec![alice.address().clone()]));

    let proposal = confirmed(
        create_proposal(
            &alice.session,
            &NewProposal {
                community_id: setup.community.id.clone(),
                title: "Bütçe".into(),
                description: "2025 bütçesi".into(),
                deadline: now_ms() + 3_600_000,
                quorum_threshold: 50,
                announce: true,
            },
        )
        .await
        .expect("flow"),
    );
    assert_eq!(proposal.status, ProposalStatus::Active);
    assert!(!proposal.is_join_request);
    // no messaging service configured, so no message id
    assert!(proposal.message_id.is_empty());

    // bob is not a member: refused locally, nothing submitted
    let before = bob.submissions();
    let err = cast_vote(&bob.session, &proposal, VoteType::Yes).await.expect_err("not member");
    assert_eq!(err, FlowError::Precondition(AbortReason::NotMember));
    assert_eq!(err.user_message(), "Bu topluluğun üyesi değilsiniz");
    assert_eq!(bob.submissions(), before);

    let vote = confirmed(cast_vote(&alice.session, &proposal, VoteType::Yes).await.expect("flow"));
    assert_eq!(&vote.voter, alice.address());
    assert_eq!(vote.vote_type, VoteType::Yes);

    let err = cast_vote(&alice.session, &proposal, VoteType::No).await.expect_err("twice");
    assert_eq!(err, FlowError::Precondition(AbortReason::AlreadyVoted));

    let listed = alice.session.api.community_proposals(&setup.community.id).await.expect("list");
    assert_eq!(listed[0].yes_votes, 1);
    assert_eq!(listed[0].total_voters, 1);
}

#[tokio::test]
async fn community_channel_carries_proposal_announcement() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    let messaging = Arc::new(RecordingMessaging::default());
    let session = alice.session.clone().with_messaging(messaging.clone());
    confirmed(create_profile(&session, "alice").await.expect("flow"));

    let setup = confirmed(create_community(&session, "Ankara").await.expect("flow"));
    let channel = format!("chan-{}", setup.community.id);
    assert_eq!(setup.channel_id.as_deref(), Some(channel.as_str()));
    assert_eq!(setup.community.channel_id, setup.channel_id);

    let stored = session
        .api
        .get_community(&setup.community.id)
        .await
        .expect("read")
        .expect("community");
    assert_eq!(stored.channel_id.as_deref(), Some(channel.as_str()));

    let proposal = confirmed(
        create_proposal(
            &session,
            &NewProposal {
                community_id: setup.community.id.clone(),
                title: "Bütçe".into(),
                description: String::new(),
                deadline: now_ms() + 3_600_000,
                quorum_threshold: 50,
                announce: true,
            },
        )
        .await
        .expect("flow"),
    );
    assert_eq!(proposal.message_id, "msg-1");
    assert_eq!(*messaging.posts.lock(), vec![(channel, "Bütçe".to_string())]);
}

#[tokio::test]
async fn failed_creator_join_is_reported() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    alice.intercept(MoveFunction::JoinCommity, Intercept::Fail("sponsor unavailable"));

    let outcome = create_community(&alice.session, "Ankara").await.expect("flow");
    assert!(!outcome.is_confirmed(), "{:?}", outcome);
    let setup = outcome.into_value().expect("setup");
    assert!(!setup.joined);
    let expected = FlowError::Tx(TxError::Build("sponsor unavailable".into())).user_message();
    assert_eq!(setup.join_error, Some(expected));
    assert_eq!(backend.chain.members(&setup.community.id), Some(vec![]));
}

#[tokio::test]
async fn unanswered_vote_prompt_times_out() {
    let backend = start_backend(None).await;
    let mut timings = fast();
    timings.vote_timeout = Duration::from_millis(300);
    let alice = user(&backend, 1, timings);
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    let setup = confirmed(create_community(&alice.session, "Ankara").await.expect("flow"));
    let proposal = confirmed(
        create_proposal(
            &alice.session,
            &NewProposal {
                community_id: setup.community.id.clone(),
                title: "Bütçe".into(),
                description: String::new(),
                deadline: now_ms() + 3_600_000,
                quorum_threshold: 50,
                announce: false,
            },
        )
        .await
        .expect("flow"),
    );

    alice.intercept(MoveFunction::CastVote, Intercept::Hang);
    let before = alice.submissions();
    let err = cast_vote(&alice.session, &proposal, VoteType::Yes).await.expect_err("timeout");
    assert_eq!(err, FlowError::Timeout(Duration::from_millis(300)));
    assert_eq!(alice.submissions(), before + 1);
    let votes = alice.session.api.proposal_votes(&proposal.id).await.expect("votes");
    assert!(votes.is_empty());
}

#[tokio::test]
async fn finalize_after_deadline() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    let bob = user(&backend, 2, fast());
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    confirmed(create_profile(&bob.session, "bobby").await.expect("flow"));
    let setup = confirmed(create_community(&alice.session, "Ankara").await.expect("flow"));

    let proposal = confirmed(
        create_proposal(
            &alice.session,
            &NewProposal {
                community_id: setup.community.id.clone(),
                title: "Kısa oylama".into(),
                description: String::new(),
                deadline: now_ms() + 1_500,
                quorum_threshold: 50,
                announce: false,
            },
        )
        .await
        .expect("flow"),
    );

    let err = finalize_proposal(&alice.session, &proposal).await.expect_err("too early");
    assert_eq!(err, FlowError::Precondition(AbortReason::DeadlineNotReached));

    confirmed(cast_vote(&alice.session, &proposal, VoteType::Yes).await.expect("flow"));
    tokio::time::sleep(Duration::from_millis(1_600)).await;

    let err = finalize_proposal(&bob.session, &proposal).await.expect_err("not creator");
    assert_eq!(err, FlowError::Precondition(AbortReason::NotProposalCreator));

    let done = confirmed(finalize_proposal(&alice.session, &proposal).await.expect("flow"));
    assert_eq!(done.id, proposal.id);
    assert_eq!(done.status, ProposalStatus::Passed);

    let err = finalize_proposal(&alice.session, &done).await.expect_err("final");
    assert_eq!(err, FlowError::Precondition(AbortReason::ProposalNotActive));
}

#[tokio::test]
async fn join_request_by_member_is_refused() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    let bob = user(&backend, 2, fast());
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    confirmed(create_profile(&bob.session, "bobby").await.expect("flow"));
    let setup = confirmed(create_community(&alice.session, "Ankara").await.expect("flow"));

    let err = request_join(&alice.session, &setup.community.id, "tekrar")
        .await
        .expect_err("already member");
    assert_eq!(err, FlowError::Precondition(AbortReason::AlreadyMember));

    let request = confirmed(
        request_join(&bob.session, &setup.community.id, "Merhaba")
            .await
            .expect("flow"),
    );
    assert!(request.is_join_request);
    assert_eq!(&request.creator, bob.address());
    assert_eq!(request.title, "Katılım isteği: bobby");
}

// ════════════════════════════════════════════════════════════════════════════
// NFT
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn nft_redeems_once() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    let setup = confirmed(create_community(&alice.session, "Ankara").await.expect("flow"));

    let nft = backend.chain.mint_nft(alice.address(), &setup.community.id, 40);
    let xp = confirmed(redeem_nft(&alice.session, &nft).await.expect("flow"));
    assert_eq!(xp, 40);

    let err = redeem_nft(&alice.session, &nft).await.expect_err("redeemed");
    assert_eq!(err, FlowError::Precondition(AbortReason::NftAlreadyRedeemed));

    let unknown = ObjectId::parse("0xdead").expect("id");
    let err = redeem_nft(&alice.session, &unknown).await.expect_err("unknown");
    assert_eq!(err, FlowError::NftNotFound);
}

// ════════════════════════════════════════════════════════════════════════════
// PUSH
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn push_delivers_join_request_notification() {
    let backend = start_backend(None).await;
    let alice = user(&backend, 1, fast());
    let bob = user(&backend, 2, fast());
    confirmed(create_profile(&alice.session, "alice").await.expect("flow"));
    confirmed(create_profile(&bob.session, "bobby").await.expect("flow"));
    let setup = confirmed(create_community(&alice.session, "Ankara").await.expect("flow"));

    let registry = Arc::new(HandlerRegistry::new());
    let feed = Arc::new(NotificationFeed::new(alice.address().clone()));
    feed.attach(&registry);
    let handle = PushClient::new(
        Arc::new(WsTransport::new(backend.ws.clone())),
        Subscription::all(alice.address().clone()),
        registry,
        ReconnectPolicy::default(),
    )
    .spawn();

    let mut state = handle.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == PushState::Connected))
        .await
        .expect("connect in time")
        .expect("state channel");
    let hub = backend.hub.clone();
    wait_for("server-side subscription", || hub.subscriber_count() == 1).await;

    confirmed(
        request_join(&bob.session, &setup.community.id, "Merhaba")
            .await
            .expect("flow"),
    );

    wait_for("pushed notification", || feed.len() == 1).await;
    let pushed = feed.snapshot();
    assert_eq!(pushed[0].kind, NotificationKind::JoinRequest);
    assert_eq!(pushed[0].title, "Yeni katılım isteği");
    assert_eq!(feed.unread(), 1);

    // the polled copy of the same notification is not counted twice
    let polled = alice.session.api.notifications(alice.address()).await.expect("poll");
    assert_eq!(feed.ingest_polled(polled), 0);
    assert_eq!(feed.len(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn push_falls_back_to_polling_when_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let registry = Arc::new(HandlerRegistry::new());
    let handle = PushClient::new(
        Arc::new(WsTransport::new(format!("ws://{}/ws", addr))),
        Subscription::all(Address::parse("0xa").expect("addr")),
        registry,
        ReconnectPolicy {
            max_attempts: 2,
            base_delay_ms: 10,
        },
    )
    .spawn();

    let mut state = handle.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == PushState::PollingFallback))
        .await
        .expect("fallback in time")
        .expect("state channel");
    handle.shutdown().await;
}
