//! # Commity Client Crate
//!
//! Client-side orchestration for the Commity DAO: everything between a
//! wallet and the backend.
//!
//! ## Modules
//! - `api`: REST client for the backend projections and sponsor endpoints
//! - `wallet`: wallet trait and a local Ed25519 wallet
//! - `sponsor`: backend relay and third-party kind sponsor
//! - `signer`: raw and sponsored-kind signers, selected once per session
//! - `poll`: `poll_until` and retry with backoff
//! - `membership`: chain-first membership verification, fail-closed
//! - `push`: WebSocket push client with bounded reconnect
//! - `feed`: de-duplicated notification feed, push + polling fallback
//! - `messaging`: community chat channels
//! - `session`: explicit session context and persisted session file
//! - `flows`: profile, community, proposal, vote, finalize, NFT flows
//!
//! ## Write path
//! ```text
//! flow ──► signer.submit(MoveCall) ──► sponsor ──► chain
//!   │                                               │
//!   └──── poll_until(api.read, predicate) ◄─ indexer ┘
//! ```

pub mod api;
pub mod feed;
pub mod flows;
pub mod membership;
pub mod messaging;
pub mod poll;
pub mod push;
pub mod session;
pub mod signer;
pub mod sponsor;
pub mod wallet;

pub use api::{ApiError, BackendClient};
pub use feed::{run_hybrid, spawn_poller, FeedPoller, NotificationFeed, NotificationSource};
pub use flows::{FlowError, FlowOutcome};
pub use membership::{ChainReader, JsonRpcChainReader, MemberStatsSource, MembershipCheck, MembershipSource, MembershipVerifier};
pub use messaging::{ensure_channel, HttpMessagingClient, MessagingError, MessagingService};
pub use poll::{poll_until, retry_with_backoff, DelayStrategy, PollConfig, PollError, RetryConfig};
pub use push::{HandlerRegistry, PushClient, PushHandle, PushState, ReconnectPolicy, Subscription, WsTransport};
pub use session::{ContractRef, FlowTimings, PersistedSession, Session, SessionStore};
pub use signer::{select_signer, RawSigner, SignerKind, SponsoredKindSigner, SubmitOutcome, TransactionSigner, TxError};
pub use sponsor::{KindSponsor, SponsorApiClient, SponsorError, SponsorRelay};
pub use wallet::{KeypairWallet, Wallet, WalletCapabilities, WalletError};
