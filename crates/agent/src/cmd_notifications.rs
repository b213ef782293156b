//! # Notification Commands
//!
//! - `notifications list [--read <id>]`: fetch the inbox, optionally
//!   marking one entry read first
//! - `notifications watch`: open the push channel and print notifications
//!   as they arrive until Ctrl-C; when push gives up, the inbox is polled
//!   at the configured interval instead
//!
//! ## Watch loop
//!
//! ```text
//! PushClient ──► HandlerRegistry ──► NotificationFeed ◄── run_hybrid (REST)
//!                                          │
//!                               printer tick (new ids only)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use commity_client::{
    run_hybrid, HandlerRegistry, NotificationFeed, PushClient, PushState, ReconnectPolicy, Subscription, WsTransport,
};
use commity_common::Address;

use crate::context::Context;
use crate::output;

const PRINT_TICK: Duration = Duration::from_millis(250);

pub async fn handle_notifications_list(ctx: &Context, address: Address, mark_read: Option<String>) -> Result<()> {
    let api = ctx.api()?;
    if let Some(id) = mark_read {
        let found = api.mark_notification_read(&address, &id).await?;
        if !found {
            println!("no notification {}", id);
        }
    }
    let list = api.notifications(&address).await?;
    println!("{}", output::notifications(&list));
    Ok(())
}

pub async fn handle_notifications_watch(ctx: &Context, address: Address) -> Result<()> {
    let api = ctx.api()?;
    let registry = Arc::new(HandlerRegistry::new());
    let feed = Arc::new(NotificationFeed::new(address.clone()));
    feed.attach(&registry);

    // seed with the current inbox so only new entries are printed
    let mut printed: HashSet<String> = HashSet::new();
    match api.notifications(&address).await {
        Ok(existing) => {
            for n in &existing {
                printed.insert(n.id.clone());
            }
            feed.ingest_polled(existing);
        }
        Err(e) => println!("inbox unavailable: {}", e),
    }

    let push = PushClient::new(
        Arc::new(WsTransport::new(ctx.config.ws_url.clone())),
        Subscription::all(address.clone()),
        registry,
        ReconnectPolicy::default(),
    )
    .spawn();
    let poller = run_hybrid(feed.clone(), Arc::new(api), push.subscribe_state(), ctx.poll_interval());
    info!(%address, "watching notifications");
    println!("watching notifications for {} (Ctrl-C to stop)", address);

    let mut state = push.subscribe_state();
    let mut push_live = true;
    let mut ticker = tokio::time::interval(PRINT_TICK);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed(), if push_live => {
                if changed.is_err() {
                    push_live = false;
                    continue;
                }
                let now = *state.borrow_and_update();
                match now {
                    PushState::Connected => println!("push: connected"),
                    PushState::Reconnecting { attempt } => println!("push: reconnecting (attempt {})", attempt),
                    PushState::PollingFallback => println!("push: unavailable, polling every {:?}", ctx.poll_interval()),
                    PushState::Connecting | PushState::Closed => {}
                }
            }
            _ = ticker.tick() => {
                for n in feed.snapshot() {
                    if printed.insert(n.id.clone()) {
                        println!("{}", output::notification(&n));
                    }
                }
            }
        }
    }

    push.shutdown().await;
    poller.shutdown().await;
    Ok(())
}
