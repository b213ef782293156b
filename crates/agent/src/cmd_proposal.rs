//! # Proposal Commands
//!
//! - `proposal list <community>`
//! - `proposal create`: titled proposal with deadline and quorum
//! - `proposal vote <community> <proposal> <yes|no|abstain>`
//! - `proposal finalize <community> <proposal>`
//!
//! Voting and finalizing start from the proposal as the backend currently
//! projects it, so both commands take the community id to find it.

use anyhow::{anyhow, Result};

use commity_client::flows::finalize::finalize_proposal;
use commity_client::flows::proposal::{create_proposal, NewProposal};
use commity_client::flows::vote::cast_vote;
use commity_client::{BackendClient, FlowOutcome};
use commity_common::{now_ms, ObjectId, Proposal, VoteType};

use crate::context::Context;
use crate::output;

const HOUR_MS: u64 = 60 * 60 * 1_000;

pub struct CreateArgs {
    pub community: ObjectId,
    pub title: String,
    pub description: String,
    pub hours: u64,
    pub quorum: u8,
    pub announce: bool,
}

/// Parse a vote choice: the English words and contract codes, plus the
/// Turkish words the app shows.
pub fn parse_vote(s: &str) -> Result<VoteType, String> {
    match s.to_ascii_lowercase().as_str() {
        "evet" => Ok(VoteType::Yes),
        "hayir" | "hayır" => Ok(VoteType::No),
        "cekimser" | "çekimser" => Ok(VoteType::Abstain),
        other => other
            .parse()
            .map_err(|_| format!("unknown vote '{}': expected yes, no or abstain", s)),
    }
}

async fn find_proposal(api: &BackendClient, community: &ObjectId, id: &ObjectId) -> Result<Proposal> {
    api.community_proposals(community)
        .await?
        .into_iter()
        .find(|p| &p.id == id)
        .ok_or_else(|| anyhow!("proposal {} not found in community {}", id, community))
}

pub async fn handle_proposal_list(ctx: &Context, community: &ObjectId) -> Result<()> {
    let list = ctx.api()?.community_proposals(community).await?;
    println!("{}", output::proposals(&list, now_ms()));
    Ok(())
}

pub async fn handle_proposal_create(ctx: &Context, key: Option<&str>, args: CreateArgs) -> Result<()> {
    let session = ctx.session(key)?;
    let new = NewProposal {
        community_id: args.community,
        title: args.title,
        description: args.description,
        deadline: now_ms().saturating_add(args.hours.saturating_mul(HOUR_MS)),
        quorum_threshold: args.quorum,
        announce: args.announce,
    };
    let outcome = create_proposal(&session, &new).await.map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "proposal"));
    if let FlowOutcome::Confirmed(p) | FlowOutcome::Optimistic(p) = &outcome {
        println!("{}", output::proposals(std::slice::from_ref(p), now_ms()));
    }
    Ok(())
}

pub async fn handle_proposal_vote(
    ctx: &Context,
    key: Option<&str>,
    community: &ObjectId,
    proposal: &ObjectId,
    vote: VoteType,
) -> Result<()> {
    let session = ctx.session(key)?;
    let target = find_proposal(&session.api, community, proposal).await?;
    let outcome = cast_vote(&session, &target, vote).await.map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "vote"));
    if let FlowOutcome::Confirmed(v) | FlowOutcome::Optimistic(v) = &outcome {
        println!("{}", output::vote(v));
    }
    Ok(())
}

pub async fn handle_proposal_finalize(
    ctx: &Context,
    key: Option<&str>,
    community: &ObjectId,
    proposal: &ObjectId,
) -> Result<()> {
    let session = ctx.session(key)?;
    let target = find_proposal(&session.api, community, proposal).await?;
    let outcome = finalize_proposal(&session, &target)
        .await
        .map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "finalize"));
    if let FlowOutcome::Confirmed(p) = &outcome {
        println!("status: {}", p.status);
    }
    Ok(())
}
