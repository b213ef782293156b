//! Proposal creation and join requests.

use tracing::{debug, info, warn};

use commity_common::{now_ms, AbortReason, MoveCall, ObjectId, Proposal, ProposalArgs, ProposalStatus};

use super::{first_created, log_optimistic, require_profile, submit, FlowError, FlowOutcome};
use crate::poll::poll_until;
use crate::session::Session;

const MAX_TITLE_LEN: usize = 128;
const MAX_DESCRIPTION_LEN: usize = 2_000;

/// Voting window for join requests.
pub const JOIN_REQUEST_WINDOW_MS: u64 = 3 * 24 * 60 * 60 * 1_000;
/// Quorum for join requests.
pub const JOIN_REQUEST_QUORUM: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    pub community_id: ObjectId,
    pub title: String,
    pub description: String,
    /// Milliseconds since the Unix epoch; must be in the future.
    pub deadline: u64,
    pub quorum_threshold: u8,
    /// Post the title to the community chat and link the message.
    pub announce: bool,
}

impl NewProposal {
    pub fn validate(&self, now_ms: u64) -> Result<(), FlowError> {
        let title = self.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(FlowError::Validation(format!(
                "Başlık 1 ile {} karakter arasında olmalıdır",
                MAX_TITLE_LEN
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(FlowError::Validation(format!(
                "Açıklama en fazla {} karakter olabilir",
                MAX_DESCRIPTION_LEN
            )));
        }
        if self.deadline <= now_ms {
            return Err(FlowError::Validation("Bitiş tarihi gelecekte olmalıdır".into()));
        }
        if !(1..=100).contains(&self.quorum_threshold) {
            return Err(FlowError::Validation("Katılım eşiği 1 ile 100 arasında olmalıdır".into()));
        }
        Ok(())
    }
}

pub async fn create_proposal(session: &Session, new: &NewProposal) -> Result<FlowOutcome<Proposal>, FlowError> {
    new.validate(now_ms())?;
    require_profile(session).await?;
    submit_proposal(session, new, false).await
}

/// Ask to join a community: a proposal with `isJoinRequest = true` that
/// existing members vote on.
pub async fn request_join(
    session: &Session,
    community_id: &ObjectId,
    message: &str,
) -> Result<FlowOutcome<Proposal>, FlowError> {
    let profile = require_profile(session).await?;

    let check = session.membership.check(&session.address, community_id).await;
    if check.is_member {
        return Err(FlowError::Precondition(AbortReason::AlreadyMember));
    }

    let new = NewProposal {
        community_id: community_id.clone(),
        title: format!("Katılım isteği: {}", profile.nickname),
        description: message.to_string(),
        deadline: now_ms().saturating_add(JOIN_REQUEST_WINDOW_MS),
        quorum_threshold: JOIN_REQUEST_QUORUM,
        announce: false,
    };
    new.validate(now_ms())?;
    submit_proposal(session, &new, true).await
}

async fn submit_proposal(
    session: &Session,
    new: &NewProposal,
    is_join_request: bool,
) -> Result<FlowOutcome<Proposal>, FlowError> {
    let address = &session.address;
    let message_id = if new.announce {
        announce(session, new).await.unwrap_or_default()
    } else {
        String::new()
    };

    let args = ProposalArgs {
        community_id: new.community_id.clone(),
        message_id,
        title: new.title.trim().to_string(),
        description: new.description.clone(),
        deadline: new.deadline,
        quorum_threshold: new.quorum_threshold,
        is_join_request,
    };
    let call = MoveCall::create_proposal(&session.contract.package, &session.contract.module, &args);
    let Some(result) = submit(session, &call).await? else {
        return Ok(FlowOutcome::Cancelled);
    };
    let created_id = first_created(&result);

    let is_ours = |p: &Proposal| match &created_id {
        Some(id) => &p.id == id,
        None => &p.creator == address && p.title == args.title && p.deadline == args.deadline,
    };

    let polled = poll_until(
        &session.timings.proposal,
        || session.api.community_proposals(&args.community_id),
        |list| list.iter().any(is_ours),
    )
    .await;

    match polled {
        Ok(list) => {
            let found = list.into_iter().find(|p| is_ours(p));
            let proposal = found.ok_or_else(|| FlowError::Unconfirmed(args.title.clone()))?;
            info!(proposal = %proposal.id, is_join_request, "proposal created");
            Ok(FlowOutcome::Confirmed(proposal))
        }
        Err(e) => {
            log_optimistic("create_proposal", &e);
            let id = created_id
                .clone()
                .ok_or_else(|| FlowError::Unconfirmed(args.title.clone()))?;
            Ok(FlowOutcome::Optimistic(Proposal {
                id,
                community_id: args.community_id.clone(),
                message_id: args.message_id.clone(),
                creator: address.clone(),
                title: args.title.clone(),
                description: args.description.clone(),
                deadline: args.deadline,
                yes_votes: 0,
                no_votes: 0,
                abstain_votes: 0,
                total_voters: 0,
                status: ProposalStatus::Active,
                quorum_threshold: args.quorum_threshold,
                is_join_request,
            }))
        }
    }
}

/// Post the proposal title to the community channel. Failures are logged
/// and the proposal goes out without a message id.
async fn announce(session: &Session, new: &NewProposal) -> Option<String> {
    let messaging = session.messaging.as_ref()?;
    let community = match session.api.get_community(&new.community_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return None,
        Err(e) => {
            warn!(community = %new.community_id, error = %e, "community lookup for announcement failed");
            return None;
        }
    };
    let Some(channel) = community.channel_id else {
        debug!(community = %new.community_id, "community has no chat channel");
        return None;
    };
    match messaging.post_message(&channel, &session.address, new.title.trim()).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(%channel, error = %e, "proposal announcement failed");
            None
        }
    }
}
