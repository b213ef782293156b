//! # Profile Commands
//!
//! - `profile show`: profile, XP and activity counters for an address
//! - `profile create <nickname>`: sponsored `create_profile`
//! - `nft redeem <id>`: redeem an event NFT for XP

use anyhow::Result;

use commity_client::flows::nft::redeem_nft;
use commity_client::flows::profile::create_profile;
use commity_client::FlowOutcome;
use commity_common::{Address, ObjectId};

use crate::context::Context;
use crate::output;

pub async fn handle_profile_show(ctx: &Context, address: Address) -> Result<()> {
    let api = ctx.api()?;
    let Some(profile) = api.get_profile(&address).await? else {
        println!("{} has no profile yet", address);
        return Ok(());
    };
    println!("{}", output::profile(&profile));
    let stats = api.profile_stats(&address, None).await?;
    println!(
        "votes cast: {}  proposals: {}  xp: {}",
        stats.votes_cast, stats.proposals_created, stats.xp
    );
    let nfts = api.nfts(&address).await?;
    for nft in nfts {
        let state = if nft.redeemed { "redeemed" } else { "available" };
        println!("nft {}  +{} xp  {}", nft.id, nft.xp, state);
    }
    Ok(())
}

pub async fn handle_profile_create(ctx: &Context, key: Option<&str>, nickname: &str) -> Result<()> {
    let session = ctx.session(key)?;
    let outcome = create_profile(&session, nickname).await.map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "profile"));
    if let FlowOutcome::Confirmed(p) | FlowOutcome::Optimistic(p) = &outcome {
        println!("{}", output::profile(p));
    }
    Ok(())
}

pub async fn handle_nft_redeem(ctx: &Context, key: Option<&str>, nft: &ObjectId) -> Result<()> {
    let session = ctx.session(key)?;
    let outcome = redeem_nft(&session, nft).await.map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "nft redeem"));
    if let FlowOutcome::Confirmed(xp) | FlowOutcome::Optimistic(xp) = outcome {
        println!("xp: {}", xp);
    }
    Ok(())
}
