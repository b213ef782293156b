//! # Push client
//!
//! One WebSocket per session, opened after the wallet connects.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting ──ok──► Connected ──lost──► Reconnecting{1} ──ok──► Connected
//!     │                                       │
//!     └──fail──► Reconnecting{n} … n = 5 ─────┴──► PollingFallback
//!
//! shutdown() from any state ──► Closed
//! ```
//!
//! - Right after connecting the client sends
//!   `{type:"subscribe", events, address}`.
//! - Reconnect delay for the n-th consecutive failure (0-based) is
//!   `base_delay_ms × 2^n`. A connection that gets as far as subscribing
//!   resets the counter.
//! - Past `max_attempts` the task stops and reports `PollingFallback`;
//!   the notification feed takes over with fixed-interval REST polling.
//! - Event frames are dispatched to registered handlers. Handlers may see
//!   the same event twice (push + poll); de-duplicate by
//!   [`ServerFrame::event_id`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use commity_common::{Address, ClientFrame, ControlType, FrameType, PushEventType, ServerFrame};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("push connect failed: {0}")]
    Connect(String),

    #[error("push send failed: {0}")]
    Send(String),

    #[error("push receive failed: {0}")]
    Receive(String),
}

// ════════════════════════════════════════════════════════════════════════════════
// TRANSPORT
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait PushConnection: Send {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), PushError>;

    /// Next server frame. `Ok(None)` once the server closed the socket.
    async fn next_frame(&mut self) -> Result<Option<ServerFrame>, PushError>;
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, PushError>;
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, PushError> {
        let (stream, _resp) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), PushError> {
        let text = serde_json::to_string(frame).map_err(|e| PushError::Send(e.to_string()))?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| PushError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Result<Option<ServerFrame>, PushError> {
        loop {
            let msg = match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(PushError::Receive(e.to_string())),
                Some(Ok(msg)) => msg,
            };
            match msg {
                Message::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => warn!(error = %e, "dropping malformed push frame"),
                },
                Message::Ping(payload) => {
                    self.stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| PushError::Send(e.to_string()))?;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ════════════════════════════════════════════════════════════════════════════════

pub type PushHandler = Arc<dyn Fn(&ServerFrame) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Per-event-type handler table shared between the push task and callers.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<PushEventType, Vec<(HandlerId, PushHandler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: PushEventType, handler: PushHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handlers.write().entry(kind).or_default().push((id, handler));
        id
    }

    /// Returns whether a handler was removed.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(h, _)| *h != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().values().all(Vec::is_empty)
    }

    /// Invoke every handler registered for the frame's event type.
    /// Returns how many ran.
    pub fn dispatch(&self, frame: &ServerFrame) -> usize {
        let Some(kind) = frame.event_type() else {
            return 0;
        };
        // Clone out so a handler can register/unregister without deadlocking.
        let targets: Vec<PushHandler> = self
            .handlers
            .read()
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in &targets {
            handler(frame);
        }
        targets.len()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// POLICY / STATE
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 3_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based): `base × 2^attempt`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(factor)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    PollingFallback,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub address: Address,
    pub events: Vec<PushEventType>,
}

impl Subscription {
    /// Every event type for one address.
    pub fn all(address: Address) -> Self {
        Self {
            address,
            events: PushEventType::ALL.to_vec(),
        }
    }

    fn frame(&self) -> ClientFrame {
        ClientFrame::Subscribe {
            events: self.events.clone(),
            address: self.address.clone(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════════

pub struct PushClient {
    transport: Arc<dyn PushTransport>,
    subscription: Subscription,
    registry: Arc<HandlerRegistry>,
    policy: ReconnectPolicy,
}

/// Handle to a running push task.
pub struct PushHandle {
    state: Arc<watch::Sender<PushState>>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PushHandle {
    pub fn state(&self) -> PushState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PushState> {
        self.state.subscribe()
    }

    /// Stop the task, cancelling any pending reconnect timer.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "push task ended abnormally");
        }
        self.state.send_replace(PushState::Closed);
    }
}

enum Step {
    Continue,
    Stop,
}

impl PushClient {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        subscription: Subscription,
        registry: Arc<HandlerRegistry>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            subscription,
            registry,
            policy,
        }
    }

    pub fn spawn(self) -> PushHandle {
        let (tx, _rx) = watch::channel(PushState::Connecting);
        let state = Arc::new(tx);
        let shutdown = Arc::new(Notify::new());

        let task_state = Arc::clone(&state);
        let task_shutdown = Arc::clone(&shutdown);
        let task = tokio::spawn(async move { self.run(task_state, task_shutdown).await });

        PushHandle { state, shutdown, task }
    }

    async fn run(self, state: Arc<watch::Sender<PushState>>, shutdown: Arc<Notify>) {
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                r = self.transport.connect() => r,
                _ = shutdown.notified() => break,
            };

            match connected {
                Ok(mut conn) => match conn.send(&self.subscription.frame()).await {
                    Ok(()) => {
                        attempt = 0;
                        state.send_replace(PushState::Connected);
                        info!(address = %self.subscription.address, "push channel connected");
                        if let Step::Stop = self.read_loop(conn.as_mut(), &shutdown).await {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "subscribe failed"),
                },
                Err(e) => warn!(attempt, error = %e, "push connect failed"),
            }

            if attempt >= self.policy.max_attempts {
                info!(attempts = attempt, "push reconnect budget exhausted, falling back to polling");
                state.send_replace(PushState::PollingFallback);
                return;
            }

            let delay = self.policy.delay(attempt);
            attempt += 1;
            state.send_replace(PushState::Reconnecting { attempt });
            debug!(attempt, delay_ms = delay.as_millis() as u64, "push reconnect scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.notified() => break,
            }
        }

        state.send_replace(PushState::Closed);
    }

    async fn read_loop(&self, conn: &mut dyn PushConnection, shutdown: &Notify) -> Step {
        loop {
            let next = tokio::select! {
                r = conn.next_frame() => r,
                _ = shutdown.notified() => return Step::Stop,
            };
            match next {
                Ok(Some(frame)) => self.handle_frame(&frame),
                Ok(None) => {
                    info!("push channel closed by server");
                    return Step::Continue;
                }
                Err(e) => {
                    warn!(error = %e, "push channel lost");
                    return Step::Continue;
                }
            }
        }
    }

    fn handle_frame(&self, frame: &ServerFrame) {
        match frame.frame_type {
            FrameType::Event(kind) => {
                let ran = self.registry.dispatch(frame);
                debug!(event = %kind, handlers = ran, "push event dispatched");
            }
            FrameType::Control(ControlType::Subscribed) => debug!("subscription acknowledged"),
            FrameType::Control(ControlType::Pong) => {}
            FrameType::Control(ControlType::Error) => {
                warn!(data = %frame.data, "push server reported error");
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════
