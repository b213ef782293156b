//! Notification feed fed by push frames and REST polling.
//!
//! Push is best-effort. While it is healthy the feed only listens; once the
//! push task reports [`PushState::PollingFallback`] the hybrid runner starts
//! a fixed-interval poller. Both paths go through
//! [`merge_notifications`], so overlap never produces duplicates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use commity_common::notification::unread_count;
use commity_common::{merge_notifications, Address, Notification, PushEventType, ServerFrame};

use crate::api::{ApiError, BackendClient};
use crate::push::{HandlerId, HandlerRegistry, PushState};

#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn fetch_notifications(&self, address: &Address) -> Result<Vec<Notification>, ApiError>;
}

#[async_trait]
impl NotificationSource for BackendClient {
    async fn fetch_notifications(&self, address: &Address) -> Result<Vec<Notification>, ApiError> {
        self.notifications(address).await
    }
}

pub struct NotificationFeed {
    address: Address,
    items: RwLock<Vec<Notification>>,
}

impl NotificationFeed {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            items: RwLock::new(Vec::new()),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    fn merge(&self, incoming: Vec<Notification>) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        let merged = merge_notifications(&items, incoming);
        let added = merged.len().saturating_sub(before);
        *items = merged;
        added
    }

    /// Ingest a `notification` push frame. Returns how many new items were added.
    pub fn ingest_push(&self, frame: &ServerFrame) -> usize {
        if frame.event_type() != Some(PushEventType::Notification) {
            return 0;
        }
        match serde_json::from_value::<Notification>(frame.data.clone()) {
            Ok(n) if n.address == self.address => self.merge(vec![n]),
            Ok(n) => {
                debug!(to = %n.address, "ignoring notification for another address");
                0
            }
            Err(e) => {
                warn!(error = %e, "malformed notification frame");
                0
            }
        }
    }

    pub fn ingest_polled(&self, batch: Vec<Notification>) -> usize {
        let own: Vec<Notification> = batch.into_iter().filter(|n| n.address == self.address).collect();
        self.merge(own)
    }

    /// Mark one notification read locally.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut items = self.items.write();
        match items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn unread(&self) -> usize {
        unread_count(&self.items.read())
    }

    /// Route push `notification` frames into this feed.
    pub fn attach(self: &Arc<Self>, registry: &HandlerRegistry) -> HandlerId {
        let feed = Arc::clone(self);
        registry.register(
            PushEventType::Notification,
            Arc::new(move |frame| {
                feed.ingest_push(frame);
            }),
        )
    }

    async fn poll_once(&self, source: &dyn NotificationSource) {
        match source.fetch_notifications(&self.address).await {
            Ok(batch) => {
                let added = self.ingest_polled(batch);
                if added > 0 {
                    debug!(added, "polled notifications");
                }
            }
            Err(e) => warn!(error = %e, "notification poll failed"),
        }
    }
}

/// Handle to a background poller; dropping it leaves the task running.
pub struct FeedPoller {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FeedPoller {
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "feed poller ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn poll_loop(
    feed: &NotificationFeed,
    source: &dyn NotificationSource,
    period: Duration,
    shutdown: &Notify,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => feed.poll_once(source).await,
            _ = shutdown.notified() => break,
        }
    }
}

/// Poll unconditionally every `period`.
pub fn spawn_poller(feed: Arc<NotificationFeed>, source: Arc<dyn NotificationSource>, period: Duration) -> FeedPoller {
    let shutdown = Arc::new(Notify::new());
    let stop = Arc::clone(&shutdown);
    let task = tokio::spawn(async move {
        poll_loop(&feed, source.as_ref(), period, &stop).await;
    });
    FeedPoller { shutdown, task }
}

/// Wait for push to give up, then poll every `period`.
///
/// Ends without polling if push closes (session teardown) first.
pub fn run_hybrid(
    feed: Arc<NotificationFeed>,
    source: Arc<dyn NotificationSource>,
    mut push_state: watch::Receiver<PushState>,
    period: Duration,
) -> FeedPoller {
    let shutdown = Arc::new(Notify::new());
    let stop = Arc::clone(&shutdown);
    let task = tokio::spawn(async move {
        let fallback = tokio::select! {
            r = push_state.wait_for(|s| matches!(s, PushState::PollingFallback | PushState::Closed)) => {
                matches!(r.as_deref(), Ok(PushState::PollingFallback))
            }
            _ = stop.notified() => false,
        };
        if !fallback {
            return;
        }
        info!(period_ms = period.as_millis() as u64, "push unavailable, polling notifications");
        poll_loop(&feed, source.as_ref(), period, &stop).await;
    });
    FeedPoller { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commity_common::NotificationKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn me() -> Address {
        Address::parse("0xa").expect("addr")
    }

    fn n(id: &str, ts: u64) -> Notification {
        Notification {
            id: id.to_string(),
            address: me(),
            kind: NotificationKind::VoteCasted,
            title: "Yeni oy".into(),
            message: String::new(),
            data: serde_json::Value::Null,
            read: false,
            timestamp: ts,
        }
    }

    fn push(n: &Notification) -> ServerFrame {
        ServerFrame::event(
            PushEventType::Notification,
            serde_json::to_value(n).expect("json"),
            n.timestamp,
        )
    }

    struct CountingSource {
        calls: AtomicUsize,
        batch: Vec<Notification>,
    }

    #[async_trait]
    impl NotificationSource for CountingSource {
        async fn fetch_notifications(&self, _a: &Address) -> Result<Vec<Notification>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.batch.clone())
        }
    }

    #[test]
    fn push_then_poll_dedups() {
        let feed = NotificationFeed::new(me());
        assert_eq!(feed.ingest_push(&push(&n("n2", 20))), 1);
        assert_eq!(feed.ingest_polled(vec![n("n1", 10), n("n2", 20), n("n3", 30)]), 2);
        let ids: Vec<String> = feed.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
        assert_eq!(feed.unread(), 3);
    }

    #[test]
    fn foreign_and_non_notification_frames_ignored() {
        let feed = NotificationFeed::new(me());
        let mut other = n("x", 1);
        other.address = Address::parse("0xb").expect("addr");
        assert_eq!(feed.ingest_push(&push(&other)), 0);
        let vote = ServerFrame::event(PushEventType::VoteCasted, serde_json::json!({}), 1);
        assert_eq!(feed.ingest_push(&vote), 0);
        assert_eq!(feed.ingest_polled(vec![other]), 0);
        assert!(feed.is_empty());
    }

    #[test]
    fn mark_read_is_monotonic() {
        let feed = NotificationFeed::new(me());
        feed.ingest_polled(vec![n("n1", 1)]);
        assert!(feed.mark_read("n1"));
        assert!(!feed.mark_read("n1"));
        assert!(!feed.mark_read("missing"));
        feed.ingest_polled(vec![n("n1", 1)]);
        assert_eq!(feed.unread(), 0);
    }

    #[test]
    fn attach_routes_push_frames() {
        let feed = Arc::new(NotificationFeed::new(me()));
        let registry = HandlerRegistry::new();
        feed.attach(&registry);
        registry.dispatch(&push(&n("n1", 1)));
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_ticks_until_shutdown() {
        let feed = Arc::new(NotificationFeed::new(me()));
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            batch: vec![n("n1", 1)],
        });
        let poller = spawn_poller(feed.clone(), source.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        poller.shutdown().await;
        // ticks at 0s, 5s, 10s
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(feed.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hybrid_polls_only_after_fallback() {
        let feed = Arc::new(NotificationFeed::new(me()));
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            batch: vec![n("n1", 1)],
        });
        let (tx, rx) = watch::channel(PushState::Connected);
        let poller = run_hybrid(feed.clone(), source.clone(), rx, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        tx.send_replace(PushState::PollingFallback);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hybrid_exits_when_push_closes() {
        let feed = Arc::new(NotificationFeed::new(me()));
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            batch: vec![],
        });
        let (tx, rx) = watch::channel(PushState::Connected);
        let poller = run_hybrid(feed, source.clone(), rx, Duration::from_secs(5));

        tx.send_replace(PushState::Closed);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(poller.is_finished());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
