//! # User flows
//!
//! Each flow is a strictly sequential script over a [`Session`]:
//! local pre-checks, one or more sponsored submissions, then polling the
//! read side until the backend projection reflects the write.
//!
//! ## Outcomes
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | [`FlowOutcome::Confirmed`] | executed and seen on the read side |
//! | [`FlowOutcome::Optimistic`] | executed, read side still behind; value is the locally known one |
//! | [`FlowOutcome::Cancelled`] | user declined a signature; nothing to report |
//!
//! Failures are [`FlowError`]s; [`FlowError::user_message`] gives the text
//! to show.
//!
//! [`Session`]: crate::session::Session

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use commity_common::{AbortReason, ExecutionResult, MoveCall, ObjectId, Profile};

use crate::api::ApiError;
use crate::session::Session;
use crate::signer::{SubmitOutcome, TxError};

pub mod community;
pub mod finalize;
pub mod nft;
pub mod profile;
pub mod proposal;
pub mod vote;

pub use community::{create_community, CommunitySetup};
pub use finalize::finalize_proposal;
pub use nft::redeem_nft;
pub use profile::create_profile;
pub use proposal::{create_proposal, request_join, NewProposal};
pub use vote::cast_vote;

#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome<T> {
    Confirmed(T),
    Optimistic(T),
    Cancelled,
}

impl<T> FlowOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            FlowOutcome::Confirmed(v) | FlowOutcome::Optimistic(v) => Some(v),
            FlowOutcome::Cancelled => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            FlowOutcome::Confirmed(v) | FlowOutcome::Optimistic(v) => Some(v),
            FlowOutcome::Cancelled => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, FlowOutcome::Confirmed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowOutcome::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no profile for this address")]
    ProfileRequired,

    #[error("nft not owned by this address")]
    NftNotFound,

    /// A local check that mirrors an on-chain abort failed.
    #[error("precondition failed: {0}")]
    Precondition(AbortReason),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Executed, but the created object could not be identified.
    #[error("transaction executed but not yet visible: {0}")]
    Unconfirmed(String),
}

impl FlowError {
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Validation(msg) => msg.clone(),
            FlowError::ProfileRequired => "Önce bir profil oluşturmalısınız".to_string(),
            FlowError::NftNotFound => "Bu NFT size ait değil".to_string(),
            FlowError::Precondition(reason) => reason.user_message(),
            FlowError::Tx(e) => e.user_message(),
            FlowError::Api(e) => commity_common::classify(&e.message())
                .user_message()
                .unwrap_or_else(|| "Sunucuya ulaşılamadı".to_string()),
            FlowError::Timeout(_) => "İşlem zaman aşımına uğradı, lütfen tekrar deneyin".to_string(),
            FlowError::Unconfirmed(_) => "İşlem gönderildi ancak henüz doğrulanamadı".to_string(),
        }
    }
}

// ── shared steps ─────────────────────────────────────────────────────────────

/// The caller's profile, or [`FlowError::ProfileRequired`].
pub async fn require_profile(session: &Session) -> Result<Profile, FlowError> {
    session
        .api
        .get_profile(&session.address)
        .await?
        .ok_or(FlowError::ProfileRequired)
}

/// Submit through the session signer. `None` means the user cancelled.
pub(crate) async fn submit(session: &Session, call: &MoveCall) -> Result<Option<ExecutionResult>, FlowError> {
    match session.signer.submit(call).await? {
        SubmitOutcome::Executed(result) => Ok(Some(result)),
        SubmitOutcome::Cancelled => Ok(None),
    }
}

pub(crate) fn first_created(result: &ExecutionResult) -> Option<ObjectId> {
    result.created.first().cloned()
}

pub(crate) async fn pause(step_delay: Duration) {
    if !step_delay.is_zero() {
        tokio::time::sleep(step_delay).await;
    }
}

pub(crate) fn log_optimistic(what: &str, err: &crate::poll::PollError) {
    warn!(flow = what, error = %err, "read side behind, continuing optimistically");
}
