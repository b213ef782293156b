//! # Push Channel Wire Frames
//!
//! JSON frames exchanged over the `/ws` endpoint.
//!
//! ```text
//! client → server   {"type":"subscribe","events":["proposal_created",...],"address":"0x.."}
//!                   {"type":"ping"}
//! server → client   {"type":"proposal_created","data":{...},"timestamp":1700000000000}
//!                   {"type":"subscribed","data":{"events":[...]},"timestamp":...}
//! ```
//!
//! Delivery is best-effort and may duplicate what polling already
//! returned; receivers de-duplicate on [`ServerFrame::event_id`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushEventType {
    ProposalCreated,
    VoteCasted,
    ProposalFinalized,
    Notification,
}

impl PushEventType {
    pub const ALL: [PushEventType; 4] = [
        PushEventType::ProposalCreated,
        PushEventType::VoteCasted,
        PushEventType::ProposalFinalized,
        PushEventType::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PushEventType::ProposalCreated => "proposal_created",
            PushEventType::VoteCasted => "vote_casted",
            PushEventType::ProposalFinalized => "proposal_finalized",
            PushEventType::Notification => "notification",
        }
    }
}

impl fmt::Display for PushEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown push event type: {}", s))
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        events: Vec<PushEventType>,
        address: Address,
    },
    Ping,
}

/// Type tag of a server frame: a data event or a control reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameType {
    Event(PushEventType),
    Control(ControlType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Subscribed,
    Pong,
    Error,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(default)]
    pub data: serde_json::Value,
    pub timestamp: u64,
}

impl ServerFrame {
    pub fn event(kind: PushEventType, data: serde_json::Value, timestamp: u64) -> Self {
        Self {
            frame_type: FrameType::Event(kind),
            data,
            timestamp,
        }
    }

    pub fn control(kind: ControlType, data: serde_json::Value, timestamp: u64) -> Self {
        Self {
            frame_type: FrameType::Control(kind),
            data,
            timestamp,
        }
    }

    pub fn event_type(&self) -> Option<PushEventType> {
        match self.frame_type {
            FrameType::Event(kind) => Some(kind),
            FrameType::Control(_) => None,
        }
    }

    /// De-duplication key for data events.
    ///
    /// Uses `data.id` when present; votes are keyed by proposal and voter
    /// because one voter can vote once per proposal.
    pub fn event_id(&self) -> Option<String> {
        let kind = self.event_type()?;
        let field = |name: &str| self.data.get(name).and_then(|v| v.as_str()).map(str::to_string);
        match kind {
            PushEventType::VoteCasted => {
                let proposal = field("proposalId")?;
                let voter = field("voter")?;
                Some(format!("vote:{}:{}", proposal, voter))
            }
            PushEventType::ProposalFinalized => {
                let id = field("id").or_else(|| field("proposalId"))?;
                Some(format!("finalized:{}", id))
            }
            PushEventType::ProposalCreated => field("id").map(|id| format!("proposal:{}", id)),
            PushEventType::Notification => field("id").map(|id| format!("notification:{}", id)),
        }
    }
}
