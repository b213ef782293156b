//! Community creation: create → join → chat channel, strictly in order.

use tracing::{info, warn};

use commity_common::error::TxErrorClass;
use commity_common::{AbortReason, Community, MoveCall, ObjectId};

use super::{first_created, log_optimistic, pause, require_profile, submit, FlowError, FlowOutcome};
use crate::messaging::ensure_channel;
use crate::poll::poll_until;
use crate::session::Session;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunitySetup {
    pub community: Community,
    /// Whether the creator's `join_commity` went through.
    pub joined: bool,
    /// User-facing reason the creator's join failed. Set only for failures,
    /// not for a declined signature.
    pub join_error: Option<String>,
    /// Chat channel, when the messaging service is configured and reachable.
    pub channel_id: Option<String>,
}

pub async fn create_community(session: &Session, name: &str) -> Result<FlowOutcome<CommunitySetup>, FlowError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(FlowError::Validation(format!(
            "Topluluk adı 1 ile {} karakter arasında olmalıdır",
            MAX_NAME_LEN
        )));
    }
    let profile = require_profile(session).await?;
    let address = &session.address;
    let contract = &session.contract;

    // 1. create
    let call = MoveCall::create_commity(&contract.package, &contract.module, name);
    let Some(result) = submit(session, &call).await? else {
        return Ok(FlowOutcome::Cancelled);
    };
    let created_id = first_created(&result);

    let polled = poll_until(
        &session.timings.community,
        || session.api.list_communities(),
        |list| find_created(list, created_id.as_ref(), name, address).is_some(),
    )
    .await;

    let (mut community, mut confirmed) = match polled {
        Ok(list) => match find_created(&list, created_id.as_ref(), name, address) {
            Some(c) => (c.clone(), true),
            None => return Err(FlowError::Unconfirmed(name.to_string())),
        },
        Err(e) => {
            log_optimistic("create_community", &e);
            let id = created_id.ok_or_else(|| FlowError::Unconfirmed(name.to_string()))?;
            let local = Community {
                id,
                name: name.to_string(),
                creator: Some(address.clone()),
                channel_id: None,
                member_count: 0,
            };
            (local, false)
        }
    };
    info!(community = %community.id, %name, confirmed, "community created");

    // 2. join
    pause(session.timings.step_delay).await;
    let join = MoveCall::join_commity(&contract.package, &contract.module, &profile.id, &community.id);
    let (joined, join_error) = match submit(session, &join).await {
        Ok(Some(_)) => (true, None),
        Ok(None) => {
            info!(community = %community.id, "creator declined join signature");
            (false, None)
        }
        Err(FlowError::Tx(e)) if is_already_member(&e.class()) => (true, None),
        Err(e) => {
            warn!(community = %community.id, error = %e, "creator join failed");
            (false, Some(e.user_message()))
        }
    };
    // Creator is not a member, so the setup is not settled.
    if join_error.is_some() {
        confirmed = false;
    }

    // 3. chat channel
    pause(session.timings.step_delay).await;
    let channel_id = match &session.messaging {
        Some(messaging) => ensure_channel(messaging.as_ref(), &community.id, name, address).await.ok(),
        None => None,
    };
    if let Some(channel) = &channel_id {
        match session.api.set_community_channel(&community.id, address, channel).await {
            Ok(linked) => community = linked,
            Err(e) => {
                warn!(community = %community.id, %channel, error = %e, "channel link not stored");
                community.channel_id = Some(channel.clone());
            }
        }
    }

    let setup = CommunitySetup {
        community,
        joined,
        join_error,
        channel_id,
    };
    Ok(if confirmed {
        FlowOutcome::Confirmed(setup)
    } else {
        FlowOutcome::Optimistic(setup)
    })
}

fn is_already_member(class: &TxErrorClass) -> bool {
    matches!(class, TxErrorClass::MoveAbort(info) if info.reason == AbortReason::AlreadyMember)
}

fn find_created<'a>(
    list: &'a [Community],
    id: Option<&ObjectId>,
    name: &str,
    creator: &commity_common::Address,
) -> Option<&'a Community> {
    list.iter().find(|c| match id {
        Some(id) => &c.id == id,
        None => c.name == name && c.creator.as_ref() == Some(creator),
    })
}
