//! Vote casting.
//!
//! Membership is verified against the chain before anything is built. The
//! submission (wallet prompt included) is capped at the session's vote
//! timeout.

use std::time::Duration;

use tracing::{info, warn};

use commity_common::{now_ms, AbortReason, MoveCall, Proposal, ProposalStatus, Vote, VoteType};

use super::{log_optimistic, require_profile, FlowError, FlowOutcome};
use crate::membership::MembershipSource;
use crate::poll::poll_until;
use crate::session::Session;
use crate::signer::{SubmitOutcome, TransactionSigner};

pub async fn cast_vote(session: &Session, proposal: &Proposal, vote_type: VoteType) -> Result<FlowOutcome<Vote>, FlowError> {
    let address = &session.address;

    if proposal.status != ProposalStatus::Active || proposal.is_past_deadline(now_ms()) {
        return Err(FlowError::Precondition(AbortReason::ProposalNotActive));
    }

    let check = session.membership.check(address, &proposal.community_id).await;
    if !check.is_member {
        if check.source == MembershipSource::FailClosed {
            warn!(%address, community = %proposal.community_id, "membership unknown, refusing vote");
        }
        return Err(FlowError::Precondition(AbortReason::NotMember));
    }

    let profile = require_profile(session).await?;

    match session.api.proposal_votes(&proposal.id).await {
        Ok(votes) if votes.iter().any(|v| &v.voter == address) => {
            return Err(FlowError::Precondition(AbortReason::AlreadyVoted));
        }
        Ok(_) => {}
        Err(e) => warn!(proposal = %proposal.id, error = %e, "vote list unavailable, relying on chain check"),
    }

    let call = MoveCall::cast_vote(
        &session.contract.package,
        &session.contract.module,
        &profile.id,
        &proposal.id,
        &proposal.community_id,
        vote_type,
    );
    let submitted = submit_within(session.signer.as_ref(), &call, session.timings.vote_timeout).await?;
    if submitted == SubmitOutcome::Cancelled {
        return Ok(FlowOutcome::Cancelled);
    }
    info!(proposal = %proposal.id, vote = vote_type.code(), "vote submitted");

    let polled = poll_until(
        &session.timings.vote,
        || session.api.proposal_votes(&proposal.id),
        |votes| votes.iter().any(|v| &v.voter == address),
    )
    .await;

    let confirmed = polled
        .map(|votes| votes.into_iter().find(|v| &v.voter == address))
        .unwrap_or_else(|e| {
            log_optimistic("cast_vote", &e);
            None
        });

    Ok(match confirmed {
        Some(vote) => FlowOutcome::Confirmed(vote),
        None => FlowOutcome::Optimistic(Vote {
            voter: address.clone(),
            vote_type,
            weight: 1,
            timestamp: now_ms(),
        }),
    })
}

/// Submit through `signer`, giving up after `limit`.
async fn submit_within(
    signer: &dyn TransactionSigner,
    call: &MoveCall,
    limit: Duration,
) -> Result<SubmitOutcome, FlowError> {
    match tokio::time::timeout(limit, signer.submit(call)).await {
        Ok(outcome) => Ok(outcome?),
        Err(_) => {
            warn!(function = %call.function, ?limit, "vote submission timed out");
            Err(FlowError::Timeout(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use commity_common::{Address, ObjectId};

    use crate::session::FlowTimings;
    use crate::signer::{SignerKind, TxError};

    /// A wallet prompt nobody answers.
    struct UnansweredPrompt {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TransactionSigner for UnansweredPrompt {
        fn kind(&self) -> SignerKind {
            SignerKind::Raw
        }

        fn address(&self) -> Address {
            Address::parse("0xa").expect("addr")
        }

        async fn submit(&self, _call: &MoveCall) -> Result<SubmitOutcome, TxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn vote_call() -> MoveCall {
        let id = |s: &str| ObjectId::parse(s).expect("id");
        MoveCall::cast_vote(&id("0xda0"), "commity", &id("0x1"), &id("0x3"), &id("0x2"), VoteType::Yes)
    }

    #[test]
    fn vote_timeout_defaults_to_thirty_seconds() {
        assert_eq!(FlowTimings::default().vote_timeout, Duration::from_secs(30));
        assert_eq!(FlowTimings::immediate(1).vote_timeout, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_prompt_times_out_at_cap() {
        let signer = UnansweredPrompt {
            calls: AtomicU32::new(0),
        };
        let limit = FlowTimings::default().vote_timeout;
        let started = tokio::time::Instant::now();

        let err = submit_within(&signer, &vote_call(), limit).await.expect_err("timeout");

        assert_eq!(err, FlowError::Timeout(Duration::from_secs(30)));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31), "{:?}", waited);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }
}
