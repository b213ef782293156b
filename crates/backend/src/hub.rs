//! Push fan-out.
//!
//! Indexed events are published once into a `tokio::sync::broadcast`
//! channel; each WebSocket connection holds a receiver and applies its own
//! filter. Notification frames are delivered only to the addressed
//! subscriber.

use std::collections::HashSet;

use tokio::sync::broadcast;
use tracing::warn;

use commity_common::{Address, PushEventType, ServerFrame};

const DEFAULT_CAPACITY: usize = 1_024;

#[derive(Clone)]
pub struct PushHub {
    tx: broadcast::Sender<ServerFrame>,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PushHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a frame to every live subscriber. Returns how many receivers
    /// saw it before filtering.
    pub fn publish(&self, frame: ServerFrame) -> usize {
        self.tx.send(frame).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn subscribe(&self, filter: SubscriberFilter) -> HubSubscriber {
        HubSubscriber {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

/// What one connection asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberFilter {
    pub events: HashSet<PushEventType>,
    pub address: Address,
}

impl SubscriberFilter {
    pub fn new(events: impl IntoIterator<Item = PushEventType>, address: Address) -> Self {
        Self {
            events: events.into_iter().collect(),
            address,
        }
    }

    pub fn accepts(&self, frame: &ServerFrame) -> bool {
        let Some(kind) = frame.event_type() else {
            return false;
        };
        if !self.events.contains(&kind) {
            return false;
        }
        if kind == PushEventType::Notification {
            return frame.data.get("address").and_then(|v| v.as_str()) == Some(self.address.as_str());
        }
        true
    }
}

pub struct HubSubscriber {
    rx: broadcast::Receiver<ServerFrame>,
    filter: SubscriberFilter,
}

impl HubSubscriber {
    pub fn filter(&self) -> &SubscriberFilter {
        &self.filter
    }

    /// Next frame that passes the filter. `None` once the hub is dropped.
    ///
    /// A lagging subscriber skips what it missed; clients reconcile through
    /// REST polling.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if self.filter.accepts(&frame) => return Some(frame),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(address = %self.filter.address, skipped, "push subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
