//! # Commity Backend Crate
//!
//! Relay between clients and the chain.
//!
//! ## Modules
//! - `store`: in-memory read projections
//! - `indexer`: chain events → projections, push frames, notifications
//! - `hub`: broadcast fan-out with per-subscriber filtering
//! - `ws`: WebSocket subscribe protocol
//! - `sponsor`: gas sponsorship and transaction submission
//! - `local_chain`: in-process contract rules for development and tests
//! - `routes`: REST endpoints
//!
//! ## Data flow
//! ```text
//! client ── POST build ──► sponsor ── bytes ──► client wallet
//! client ── POST execute ─► sponsor ── countersign ──► chain
//! chain events ──► indexer ──► store ──► GET endpoints
//!                      └─────► hub ──► /ws subscribers
//! ```

pub mod hub;
pub mod indexer;
pub mod local_chain;
pub mod routes;
pub mod sponsor;
pub mod store;
pub mod ws;

pub use hub::{HubSubscriber, PushHub, SubscriberFilter};
pub use indexer::{ChainEvent, EventId, EventPage, EventSource, IndexError, Indexer, IndexerHandle, JsonRpcEventSource, RawEvent};
pub use local_chain::LocalChain;
pub use routes::{router, AppState};
pub use sponsor::{ChainExecutor, ExecutorError, JsonRpcExecutor, Sponsor, SponsorError};
pub use store::ProjectionStore;
