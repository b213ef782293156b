//! Proposal finalization. Only the creator, only after the deadline.

use tracing::info;

use commity_common::{now_ms, AbortReason, MoveCall, Proposal, ProposalStatus};

use super::{log_optimistic, require_profile, submit, FlowError, FlowOutcome};
use crate::poll::poll_until;
use crate::session::Session;

pub async fn finalize_proposal(session: &Session, proposal: &Proposal) -> Result<FlowOutcome<Proposal>, FlowError> {
    if proposal.creator != session.address {
        return Err(FlowError::Precondition(AbortReason::NotProposalCreator));
    }
    if proposal.status != ProposalStatus::Active {
        return Err(FlowError::Precondition(AbortReason::ProposalNotActive));
    }
    if !proposal.is_past_deadline(now_ms()) {
        return Err(FlowError::Precondition(AbortReason::DeadlineNotReached));
    }
    let profile = require_profile(session).await?;

    let call = MoveCall::finalize_proposal(
        &session.contract.package,
        &session.contract.module,
        &profile.id,
        &proposal.id,
        &proposal.community_id,
    );
    if submit(session, &call).await?.is_none() {
        return Ok(FlowOutcome::Cancelled);
    }

    let polled = poll_until(
        &session.timings.proposal,
        || session.api.community_proposals(&proposal.community_id),
        |list| list.iter().any(|p| p.id == proposal.id && p.status.is_final()),
    )
    .await;

    let finalized = polled
        .map(|list| list.into_iter().find(|p| p.id == proposal.id))
        .unwrap_or_else(|e| {
            log_optimistic("finalize_proposal", &e);
            None
        });

    Ok(match finalized {
        Some(p) => {
            info!(proposal = %p.id, status = %p.status, "proposal finalized");
            FlowOutcome::Confirmed(p)
        }
        None => FlowOutcome::Optimistic(proposal.clone()),
    })
}
