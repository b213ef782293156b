//! # Chain Event Indexer
//!
//! Turns contract events into read projections, push frames and
//! notifications.
//!
//! ## Flow
//!
//! ```text
//! EventSource.next_page(cursor) ──► ChainEvent::decode ──► Indexer::apply_event
//!                                                            │
//!                                   ProjectionStore ◄────────┤
//!                                   PushHub.publish ◄────────┘
//! ```
//!
//! ## Idempotency
//!
//! Re-applying an event is harmless: creations are skipped when the object
//! is already projected, a second vote from the same voter is ignored, and
//! notification ids are derived from `(tx digest, event seq, recipient)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use commity_common::{
    now_ms, Address, Community, EventNft, Notification, NotificationKind, ObjectId, Profile, Proposal,
    ProposalStatus, PushEventType, ServerFrame, Vote, VoteType,
};

use crate::hub::PushHub;
use crate::store::ProjectionStore;

/// Events requested per `suix_queryEvents` page.
pub const PAGE_LIMIT: usize = 50;

/// Pages drained per tick before yielding to the next interval.
const MAX_PAGES_PER_TICK: usize = 20;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("event source error: {0}")]
    Source(String),

    #[error("malformed event type: {0}")]
    MalformedType(String),

    #[error("failed to decode {event}: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

// ════════════════════════════════════════════════════════════════════════════════
// RAW EVENTS
// ════════════════════════════════════════════════════════════════════════════════

fn flex_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        Int(u64),
        Text(String),
    }
    match Num::deserialize(d)? {
        Num::Int(n) => Ok(n),
        Num::Text(s) => s.parse().map_err(de::Error::custom),
    }
}

fn flex_u8<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let n = flex_u64(d)?;
    u8::try_from(n).map_err(|_| de::Error::custom(format!("{} does not fit in u8", n)))
}

fn flex_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    flex_u64(d).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    pub tx_digest: String,
    #[serde(deserialize_with = "flex_u64")]
    pub event_seq: u64,
}

/// One event as returned by `suix_queryEvents`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub parsed_json: Value,
    #[serde(default, deserialize_with = "flex_opt_u64")]
    pub timestamp_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub data: Vec<RawEvent>,
    #[serde(default)]
    pub next_cursor: Option<Value>,
    #[serde(default)]
    pub has_next_page: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// CONTRACT EVENTS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileCreated {
    pub profile_id: ObjectId,
    pub owner: Address,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommityCreated {
    pub commity_id: ObjectId,
    pub name: String,
    pub creator: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberJoined {
    pub commity_id: ObjectId,
    pub member: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProposalCreated {
    pub proposal_id: ObjectId,
    pub commity_id: ObjectId,
    pub creator: Address,
    #[serde(default)]
    pub message_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "flex_u64")]
    pub deadline: u64,
    #[serde(deserialize_with = "flex_u8")]
    pub quorum_threshold: u8,
    #[serde(default)]
    pub is_join_request: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoteCasted {
    pub proposal_id: ObjectId,
    pub voter: Address,
    #[serde(deserialize_with = "flex_u8")]
    pub vote_type: u8,
    #[serde(deserialize_with = "flex_u64")]
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProposalFinalized {
    pub proposal_id: ObjectId,
    #[serde(deserialize_with = "flex_u8")]
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NftMinted {
    pub nft_id: ObjectId,
    pub commity_id: ObjectId,
    pub owner: Address,
    #[serde(deserialize_with = "flex_u64")]
    pub xp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NftRedeemed {
    pub nft_id: ObjectId,
    pub profile_id: ObjectId,
    pub owner: Address,
    #[serde(deserialize_with = "flex_u64")]
    pub xp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    ProfileCreated(ProfileCreated),
    CommityCreated(CommityCreated),
    MemberJoined(MemberJoined),
    ProposalCreated(ProposalCreated),
    VoteCasted(VoteCasted),
    ProposalFinalized(ProposalFinalized),
    NftMinted(NftMinted),
    NftRedeemed(NftRedeemed),
}

impl ChainEvent {
    /// Decode a raw event of `<package>::<module>::<Name>`.
    ///
    /// Events of other packages or modules, and unknown names, yield
    /// `Ok(None)`.
    pub fn decode(raw: &RawEvent, package: &ObjectId, module: &str) -> Result<Option<Self>, IndexError> {
        let mut parts = raw.event_type.splitn(3, "::");
        let (Some(pkg), Some(event_module), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(IndexError::MalformedType(raw.event_type.clone()));
        };
        let pkg = ObjectId::parse(pkg).map_err(|_| IndexError::MalformedType(raw.event_type.clone()))?;
        if &pkg != package || event_module != module {
            return Ok(None);
        }
        // Generic parameters are not used by this module's events.
        let name = name.split('<').next().unwrap_or(name);

        fn parse<T: serde::de::DeserializeOwned>(name: &str, v: &Value) -> Result<T, IndexError> {
            serde_json::from_value(v.clone()).map_err(|source| IndexError::Decode {
                event: name.to_string(),
                source,
            })
        }

        let v = &raw.parsed_json;
        let event = match name {
            "ProfileCreated" => ChainEvent::ProfileCreated(parse(name, v)?),
            "CommityCreated" => ChainEvent::CommityCreated(parse(name, v)?),
            "MemberJoined" => ChainEvent::MemberJoined(parse(name, v)?),
            "ProposalCreated" => ChainEvent::ProposalCreated(parse(name, v)?),
            "VoteCasted" => ChainEvent::VoteCasted(parse(name, v)?),
            "ProposalFinalized" => ChainEvent::ProposalFinalized(parse(name, v)?),
            "NftMinted" => ChainEvent::NftMinted(parse(name, v)?),
            "NftRedeemed" => ChainEvent::NftRedeemed(parse(name, v)?),
            other => {
                debug!(event = other, "ignoring unknown contract event");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::ProfileCreated(_) => "ProfileCreated",
            ChainEvent::CommityCreated(_) => "CommityCreated",
            ChainEvent::MemberJoined(_) => "MemberJoined",
            ChainEvent::ProposalCreated(_) => "ProposalCreated",
            ChainEvent::VoteCasted(_) => "VoteCasted",
            ChainEvent::ProposalFinalized(_) => "ProposalFinalized",
            ChainEvent::NftMinted(_) => "NftMinted",
            ChainEvent::NftRedeemed(_) => "NftRedeemed",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// EVENT SOURCE
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait EventSource: Send + Sync {
    async fn next_page(&self, cursor: Option<&Value>, limit: usize) -> Result<EventPage, IndexError>;
}

/// `suix_queryEvents` filtered on the contract module.
pub struct JsonRpcEventSource {
    url: String,
    client: reqwest::Client,
    package: ObjectId,
    module: String,
}

impl JsonRpcEventSource {
    pub fn new(url: &str, package: ObjectId, module: &str, timeout: Duration) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Source(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
            package,
            module: module.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[async_trait]
impl EventSource for JsonRpcEventSource {
    async fn next_page(&self, cursor: Option<&Value>, limit: usize) -> Result<EventPage, IndexError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "suix_queryEvents",
            "params": [
                { "MoveModule": { "package": self.package.as_str(), "module": self.module } },
                cursor,
                limit,
                false
            ]
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Source(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(IndexError::Source(format!("rpc status {}", resp.status())));
        }
        let parsed: RpcResponse<EventPage> = resp.json().await.map_err(|e| IndexError::Source(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(IndexError::Source(err.message));
        }
        parsed
            .result
            .ok_or_else(|| IndexError::Source("rpc response without result".to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// INDEXER
// ════════════════════════════════════════════════════════════════════════════════

pub struct Indexer {
    store: Arc<ProjectionStore>,
    hub: PushHub,
    package: ObjectId,
    module: String,
}

impl Indexer {
    pub fn new(store: Arc<ProjectionStore>, hub: PushHub, package: ObjectId, module: &str) -> Self {
        Self {
            store,
            hub,
            package,
            module: module.to_string(),
        }
    }

    pub fn store(&self) -> &Arc<ProjectionStore> {
        &self.store
    }

    /// Decode and apply one raw event. Returns the number of frames
    /// published.
    pub fn apply(&self, raw: &RawEvent) -> Result<usize, IndexError> {
        let Some(event) = ChainEvent::decode(raw, &self.package, &self.module)? else {
            return Ok(0);
        };
        let timestamp = raw.timestamp_ms.unwrap_or_else(now_ms);
        Ok(self.apply_event(&event, &raw.id, timestamp))
    }

    /// Project one decoded event, publish its frames and return how many
    /// were published.
    pub fn apply_event(&self, event: &ChainEvent, origin: &EventId, timestamp: u64) -> usize {
        let mut frames = Vec::new();
        let mut notify = Vec::new();

        match event {
            ChainEvent::ProfileCreated(e) => {
                let inserted = self.store.insert_profile(Profile {
                    id: e.profile_id.clone(),
                    owner: e.owner.clone(),
                    nickname: e.nickname.clone(),
                    xp: 0,
                });
                if inserted {
                    info!(owner = %e.owner, nickname = %e.nickname, "profile indexed");
                }
            }
            ChainEvent::CommityCreated(e) => {
                if self.store.community(&e.commity_id).is_none() {
                    self.store.insert_community(Community {
                        id: e.commity_id.clone(),
                        name: e.name.clone(),
                        creator: Some(e.creator.clone()),
                        channel_id: None,
                        member_count: 0,
                    });
                    info!(community = %e.commity_id, name = %e.name, "community indexed");
                }
            }
            ChainEvent::MemberJoined(e) => {
                if self.store.add_member(&e.commity_id, &e.member) {
                    let community = self.store.community(&e.commity_id);
                    if let Some(creator) = community.as_ref().and_then(|c| c.creator.clone()) {
                        if creator != e.member {
                            let name = community.map(|c| c.name).unwrap_or_default();
                            notify.push((
                                creator,
                                NotificationKind::MemberJoined,
                                "Yeni üye".to_string(),
                                format!("{} topluluğa katıldı: {}", self.display_name(&e.member), name),
                                json!({ "communityId": e.commity_id, "member": e.member }),
                            ));
                        }
                    }
                }
            }
            ChainEvent::ProposalCreated(e) => {
                if self.store.proposal(&e.proposal_id).is_none() {
                    let proposal = Proposal {
                        id: e.proposal_id.clone(),
                        community_id: e.commity_id.clone(),
                        message_id: e.message_id.clone(),
                        creator: e.creator.clone(),
                        title: e.title.clone(),
                        description: e.description.clone(),
                        deadline: e.deadline,
                        yes_votes: 0,
                        no_votes: 0,
                        abstain_votes: 0,
                        total_voters: 0,
                        status: ProposalStatus::Active,
                        quorum_threshold: e.quorum_threshold,
                        is_join_request: e.is_join_request,
                    };
                    self.store.insert_proposal(proposal.clone());
                    frames.push(ServerFrame::event(
                        PushEventType::ProposalCreated,
                        to_data(&proposal),
                        timestamp,
                    ));

                    let (kind, title) = if e.is_join_request {
                        (NotificationKind::JoinRequest, "Yeni katılım isteği")
                    } else {
                        (NotificationKind::ProposalCreated, "Yeni teklif")
                    };
                    for member in self.store.members(&e.commity_id).unwrap_or_default() {
                        if member != e.creator {
                            notify.push((
                                member,
                                kind,
                                title.to_string(),
                                e.title.clone(),
                                json!({ "proposalId": e.proposal_id, "communityId": e.commity_id }),
                            ));
                        }
                    }
                }
            }
            ChainEvent::VoteCasted(e) => match VoteType::try_from(e.vote_type) {
                Ok(vote_type) => {
                    let vote = Vote {
                        voter: e.voter.clone(),
                        vote_type,
                        weight: e.weight,
                        timestamp,
                    };
                    if self.store.record_vote(&e.proposal_id, vote) {
                        let proposal = self.store.proposal(&e.proposal_id);
                        frames.push(ServerFrame::event(
                            PushEventType::VoteCasted,
                            json!({
                                "proposalId": e.proposal_id,
                                "communityId": proposal.as_ref().map(|p| p.community_id.clone()),
                                "voter": e.voter,
                                "voteType": vote_type,
                                "weight": e.weight,
                                "timestamp": timestamp,
                            }),
                            timestamp,
                        ));
                        if let Some(p) = proposal.filter(|p| p.creator != e.voter) {
                            notify.push((
                                p.creator.clone(),
                                NotificationKind::VoteCasted,
                                "Teklifinize oy verildi".to_string(),
                                p.title.clone(),
                                json!({ "proposalId": p.id, "voter": e.voter }),
                            ));
                        }
                    }
                }
                Err(err) => warn!(proposal = %e.proposal_id, error = %err, "vote with unknown type skipped"),
            },
            ChainEvent::ProposalFinalized(e) => match ProposalStatus::from_code(e.status) {
                Ok(status) => {
                    let already_final = self.store.proposal(&e.proposal_id).is_some_and(|p| p.status.is_final());
                    if !already_final {
                        if let Some(p) = self.store.set_status(&e.proposal_id, status) {
                            frames.push(ServerFrame::event(
                                PushEventType::ProposalFinalized,
                                json!({ "id": p.id, "communityId": p.community_id, "status": status }),
                                timestamp,
                            ));
                            let mut recipients = self.store.members(&p.community_id).unwrap_or_default();
                            if !recipients.contains(&p.creator) {
                                recipients.push(p.creator.clone());
                            }
                            for member in recipients {
                                notify.push((
                                    member,
                                    NotificationKind::ProposalFinalized,
                                    "Teklif sonuçlandı".to_string(),
                                    format!("{}: {}", p.title, status),
                                    json!({ "proposalId": p.id, "status": status }),
                                ));
                            }
                        }
                    }
                }
                Err(err) => warn!(proposal = %e.proposal_id, error = %err, "finalization with unknown status skipped"),
            },
            ChainEvent::NftMinted(e) => {
                if self.store.nft(&e.nft_id).is_none() {
                    self.store.insert_nft(EventNft {
                        id: e.nft_id.clone(),
                        community_id: e.commity_id.clone(),
                        xp: e.xp,
                        owner: e.owner.clone(),
                        redeemed: false,
                    });
                }
            }
            ChainEvent::NftRedeemed(e) => {
                let fresh = self.store.nft(&e.nft_id).map_or(true, |n| !n.redeemed);
                if fresh {
                    self.store.mark_redeemed(&e.nft_id);
                    let total = self.store.add_xp(&e.owner, e.xp);
                    notify.push((
                        e.owner.clone(),
                        NotificationKind::NftRedeemed,
                        "NFT kullanıldı".to_string(),
                        format!("+{} XP", e.xp),
                        json!({ "nftId": e.nft_id, "xp": e.xp, "total": total }),
                    ));
                }
            }
        }

        for (address, kind, title, message, data) in notify {
            let notification = Notification {
                id: format!("{}:{}:{}", origin.tx_digest, origin.event_seq, address),
                address,
                kind,
                title,
                message,
                data,
                read: false,
                timestamp,
            };
            if self.store.push_notification(notification.clone()) {
                frames.push(ServerFrame::event(
                    PushEventType::Notification,
                    to_data(&notification),
                    timestamp,
                ));
            }
        }

        let published = frames.len();
        for frame in frames {
            self.hub.publish(frame);
        }
        debug!(event = event.name(), tx = %origin.tx_digest, published, "event applied");
        published
    }

    fn display_name(&self, address: &Address) -> String {
        self.store
            .profile(address)
            .map(|p| p.nickname)
            .unwrap_or_else(|| address.short())
    }

    /// Drain available pages from the source, resuming at the stored
    /// cursor. Returns the number of events applied.
    pub async fn poll_once(&self, source: &dyn EventSource) -> Result<usize, IndexError> {
        let mut applied = 0;
        for _ in 0..MAX_PAGES_PER_TICK {
            let cursor = self.store.cursor();
            let page = source.next_page(cursor.as_ref(), PAGE_LIMIT).await?;
            for raw in &page.data {
                match self.apply(raw) {
                    Ok(_) => applied += 1,
                    Err(e) => warn!(tx = %raw.id.tx_digest, error = %e, "skipping undecodable event"),
                }
            }
            self.store.set_cursor(page.next_cursor);
            if !page.has_next_page {
                break;
            }
        }
        Ok(applied)
    }

    /// Poll `source` every `interval` until shut down.
    pub fn spawn(self: Arc<Self>, source: Arc<dyn EventSource>, interval: Duration) -> IndexerHandle {
        let shutdown = Arc::new(Notify::new());
        let stop = Arc::clone(&shutdown);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.poll_once(source.as_ref()).await {
                            Ok(0) => {}
                            Ok(n) => debug!(applied = n, "indexer tick"),
                            Err(e) => warn!(error = %e, "indexer poll failed"),
                        }
                    }
                    _ = stop.notified() => {
                        info!("indexer stopped");
                        break;
                    }
                }
            }
        });
        IndexerHandle { shutdown, task }
    }
}

fn to_data<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

pub struct IndexerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl IndexerHandle {
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            warn!(error = %e, "indexer task ended abnormally");
        }
    }
}
