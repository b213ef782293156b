//! Profile creation.

use tracing::{info, warn};

use commity_common::types::validate_nickname;
use commity_common::{MoveCall, ObjectId, Profile};

use super::{first_created, log_optimistic, submit, FlowError, FlowOutcome};
use crate::poll::poll_until;
use crate::session::Session;

/// Create the caller's profile.
///
/// An existing profile short-circuits to `Confirmed(existing)`. After
/// submission the profile endpoint is polled until it shows the new
/// nickname; if it never does, the flow returns the locally known profile.
pub async fn create_profile(session: &Session, nickname: &str) -> Result<FlowOutcome<Profile>, FlowError> {
    let nickname = validate_nickname(nickname).map_err(|e| FlowError::Validation(e.to_string()))?;
    let address = &session.address;

    match session.api.get_profile(address).await {
        Ok(Some(existing)) => {
            info!(%address, nickname = %existing.nickname, "profile already exists");
            return Ok(FlowOutcome::Confirmed(existing));
        }
        Ok(None) => {}
        Err(e) => warn!(%address, error = %e, "profile lookup failed, creating anyway"),
    }

    let call = MoveCall::create_profile(&session.contract.package, &session.contract.module, &nickname);
    let Some(result) = submit(session, &call).await? else {
        return Ok(FlowOutcome::Cancelled);
    };

    let polled = poll_until(
        &session.timings.profile,
        || session.api.get_profile(address),
        |p| p.as_ref().is_some_and(|p| p.nickname == nickname),
    )
    .await;

    let confirmed = polled.unwrap_or_else(|e| {
        log_optimistic("create_profile", &e);
        None
    });

    Ok(match confirmed {
        Some(profile) => FlowOutcome::Confirmed(profile),
        None => FlowOutcome::Optimistic(Profile {
            id: first_created(&result).unwrap_or_else(|| ObjectId::from_bytes([0u8; 32])),
            owner: address.clone(),
            nickname,
            xp: 0,
        }),
    })
}
