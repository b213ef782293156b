//! # Community Commands
//!
//! - `community list [--mine]`
//! - `community members <id>`
//! - `community create <name>`: create, join, open the chat channel
//! - `community join <id>`: file a join request for members to vote on

use anyhow::Result;

use commity_client::flows::community::create_community;
use commity_client::flows::proposal::request_join;
use commity_client::FlowOutcome;
use commity_common::{Address, ObjectId};

use crate::context::Context;
use crate::output;

pub async fn handle_community_list(ctx: &Context, member: Option<Address>) -> Result<()> {
    let api = ctx.api()?;
    let list = match member {
        Some(address) => api.member_communities(&address).await?,
        None => api.list_communities().await?,
    };
    println!("{}", output::communities(&list));
    Ok(())
}

pub async fn handle_community_members(ctx: &Context, community: &ObjectId) -> Result<()> {
    let members = ctx.api()?.community_members(community).await?;
    if members.is_empty() {
        println!("no members");
    }
    for member in &members {
        println!("{}", member);
    }
    Ok(())
}

pub async fn handle_community_create(ctx: &Context, key: Option<&str>, name: &str) -> Result<()> {
    let session = ctx.session(key)?;
    let outcome = create_community(&session, name).await.map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "community"));
    if let FlowOutcome::Confirmed(setup) | FlowOutcome::Optimistic(setup) = &outcome {
        println!("id: {}", setup.community.id);
        println!("joined: {}", if setup.joined { "yes" } else { "no" });
        if let Some(reason) = &setup.join_error {
            println!("join failed: {}", reason);
        }
        match &setup.channel_id {
            Some(ch) => println!("chat channel: {}", ch),
            None => println!("chat channel: (none)"),
        }
    }
    Ok(())
}

pub async fn handle_community_join(ctx: &Context, key: Option<&str>, community: &ObjectId, message: &str) -> Result<()> {
    let session = ctx.session(key)?;
    let outcome = request_join(&session, community, message)
        .await
        .map_err(output::flow_error)?;
    println!("{}", output::outcome_line(&outcome, "join request"));
    if let FlowOutcome::Confirmed(p) | FlowOutcome::Optimistic(p) = &outcome {
        println!("proposal: {}", p.id);
    }
    Ok(())
}
