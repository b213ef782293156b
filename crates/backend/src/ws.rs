//! WebSocket push endpoint (`GET /ws`).
//!
//! Protocol:
//! - client sends `{"type":"subscribe","events":[...],"address":"0x.."}`;
//!   the server answers with a `subscribed` control frame and starts
//!   forwarding matching events. A later subscribe replaces the filter.
//! - `{"type":"ping"}` is answered with `pong`.
//! - anything unparseable is answered with an `error` control frame; the
//!   connection stays open.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::{json, Value};
use tracing::{debug, info};

use commity_common::{now_ms, ClientFrame, ControlType, PushEventType, ServerFrame};

use crate::hub::{HubSubscriber, PushHub, SubscriberFilter};
use crate::routes::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

async fn next_frame(sub: &mut Option<HubSubscriber>) -> Option<ServerFrame> {
    match sub {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    let Ok(text) = serde_json::to_string(frame) else {
        return true;
    };
    socket.send(Message::Text(text)).await.is_ok()
}

/// Reply to one client text frame, updating the subscription.
fn handle_client_text(text: &str, hub: &PushHub, sub: &mut Option<HubSubscriber>) -> ServerFrame {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe { events, address }) => {
            let events = if events.is_empty() {
                PushEventType::ALL.to_vec()
            } else {
                events
            };
            info!(%address, events = events.len(), "push subscriber registered");
            *sub = Some(hub.subscribe(SubscriberFilter::new(events.iter().copied(), address.clone())));
            ServerFrame::control(
                ControlType::Subscribed,
                json!({ "events": events, "address": address }),
                now_ms(),
            )
        }
        Ok(ClientFrame::Ping) => ServerFrame::control(ControlType::Pong, Value::Null, now_ms()),
        Err(e) => {
            debug!(error = %e, "invalid client frame");
            ServerFrame::control(ControlType::Error, json!({ "message": e.to_string() }), now_ms())
        }
    }
}

pub async fn serve_socket(mut socket: WebSocket, hub: PushHub) {
    let mut sub: Option<HubSubscriber> = None;
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        let reply = handle_client_text(&text, &hub, &mut sub);
                        if !send_frame(&mut socket, &reply).await {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // protocol pings are answered by the socket itself
                    _ => {}
                }
            }
            frame = next_frame(&mut sub) => {
                let Some(frame) = frame else { break };
                if !send_frame(&mut socket, &frame).await {
                    break;
                }
            }
        }
    }
    if let Some(s) = &sub {
        debug!(address = %s.filter().address, "push subscriber disconnected");
    }
}
