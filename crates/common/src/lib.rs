//! # Commity Common Crate
//!
//! Shared vocabulary for the backend relay, the client library and the CLI.
//!
//! ## Modules
//! - `api`: REST request/response bodies
//! - `types`: read-side mirrors of contract entities (profile, community, proposal, vote, NFT, notification)
//! - `move_call`: typed builders for the contract entry points
//! - `transaction`: sponsored transaction envelope, digests and user signatures
//! - `crypto`: Ed25519 keys and address derivation
//! - `error`: classification of wallet / sponsor / chain failures
//! - `events`: push channel wire frames
//! - `notification`: de-duplicating notification merge
//! - `config`: TOML + environment configuration
//!
//! ## Authority
//! ```text
//! ┌──────────────────────┐
//! │  on-chain contract   │  <- authoritative state
//! └──────────┬───────────┘
//!            │ events / object reads
//!     ┌──────▼──────┐
//!     │   backend   │  <- projections, sponsor gas, push fan-out
//!     └──────┬──────┘
//!            │ REST + WebSocket
//!     ┌──────▼──────┐
//!     │   client    │  <- flows, polling, membership checks
//!     └─────────────┘
//! ```

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod move_call;
pub mod notification;
pub mod transaction;
pub mod types;

pub use config::{BackendConfig, ClientConfig, ConfigError, NetworkConfig};
pub use error::{classify, AbortInfo, AbortReason, TxErrorClass};
pub use events::{ClientFrame, ControlType, FrameType, PushEventType, ServerFrame};
pub use move_call::{CallArg, MoveCall, MoveCallError, MoveFunction, ProposalArgs, PureValue};
pub use notification::merge_notifications;
pub use transaction::{
    ExecutionResult, GasData, SponsoredTransaction, TransactionData, TransactionError, TransactionKind,
    UserSignature,
};
pub use types::{
    Address, Community, EventNft, Notification, NotificationKind, ObjectId, Profile, ProfileStats, Proposal,
    ProposalStatus, TypeError, Vote, VoteType,
};

/// Milliseconds since the Unix epoch; 0 if the clock is before the epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
