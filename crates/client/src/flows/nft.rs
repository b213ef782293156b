//! Event NFT redemption for XP.

use tracing::info;

use commity_common::{AbortReason, MoveCall, ObjectId};

use super::{log_optimistic, require_profile, submit, FlowError, FlowOutcome};
use crate::poll::poll_until;
use crate::session::Session;

/// Redeem an NFT. The outcome value is the profile's XP afterwards.
pub async fn redeem_nft(session: &Session, nft_id: &ObjectId) -> Result<FlowOutcome<u64>, FlowError> {
    let address = &session.address;
    let profile = require_profile(session).await?;

    let nft = session
        .api
        .nfts(address)
        .await?
        .into_iter()
        .find(|n| &n.id == nft_id)
        .ok_or(FlowError::NftNotFound)?;
    if nft.redeemed {
        return Err(FlowError::Precondition(AbortReason::NftAlreadyRedeemed));
    }

    let call = MoveCall::redeem_nft_for_xp(
        &session.contract.package,
        &session.contract.module,
        &profile.id,
        &nft.id,
        &nft.community_id,
    );
    if submit(session, &call).await?.is_none() {
        return Ok(FlowOutcome::Cancelled);
    }

    let expected = profile.xp.saturating_add(nft.xp);
    let polled = poll_until(
        &session.timings.profile,
        || session.api.get_profile(address),
        |p| p.as_ref().is_some_and(|p| p.xp >= expected),
    )
    .await;

    Ok(match polled {
        Ok(Some(p)) => {
            info!(nft = %nft.id, xp = p.xp, "nft redeemed");
            FlowOutcome::Confirmed(p.xp)
        }
        Ok(None) => FlowOutcome::Optimistic(expected),
        Err(e) => {
            log_optimistic("redeem_nft", &e);
            FlowOutcome::Optimistic(expected)
        }
    })
}
