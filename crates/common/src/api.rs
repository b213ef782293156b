//! REST request/response bodies shared by the backend routes and the client.
//!
//! | Endpoint | Method | Body | Response |
//! |----------|--------|------|----------|
//! | `/profile/:address` | GET | - | [`ProfileResponse`] |
//! | `/profile` | POST | [`CreateProfileRequest`] | [`BuildResponse`] |
//! | `/profile/:address/stats?commityId=` | GET | - | [`StatsResponse`] |
//! | `/community` | GET | - | [`CommunityListResponse`] |
//! | `/community/:id` | GET | - | [`CommunityResponse`] |
//! | `/community/:id/members` | GET | - | [`MembersResponse`] |
//! | `/community/:id/channel` | POST | [`SetChannelRequest`] | [`CommunityResponse`] |
//! | `/community/member/:address` | GET | - | [`CommunityListResponse`] |
//! | `/proposal/community/:id` | GET | - | [`ProposalListResponse`] |
//! | `/proposal` | POST | [`CreateProposalRequest`] | [`BuildResponse`] |
//! | `/proposal/:id/vote` | POST | [`VoteRequest`] | [`BuildResponse`] |
//! | `/proposal/:id/votes` | GET | - | [`VotesResponse`] |
//! | `/notification/:address` | GET | - | [`NotificationListResponse`] |
//! | `/notification/:address/:id/read` | POST | - | [`OkResponse`] |
//! | `/nft/:address` | GET | - | [`NftListResponse`] |
//! | `/transaction/sponsor` | POST | [`SponsorRequest`] | [`BuildResponse`] |
//! | `/transaction/execute` | POST | [`ExecuteRequest`] | [`ExecutionResult`](crate::ExecutionResult) |

use serde::{Deserialize, Serialize};

use crate::move_call::{CallArg, ProposalArgs};
use crate::transaction::SponsoredTransaction;
use crate::types::{
    Address, Community, EventNft, Notification, ObjectId, Profile, ProfileStats, Proposal, Vote, VoteType,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ── profile ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProfileRequest {
    pub address: Address,
    pub nickname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    /// Spelled the way the contract names communities.
    pub commity_id: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: ProfileStats,
}

// ── community ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityListResponse {
    pub communities: Vec<Community>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityResponse {
    pub community: Community,
}

/// Binds a chat channel to a community. Only the creator may set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChannelRequest {
    pub requester: Address,
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersResponse {
    pub community_id: ObjectId,
    pub members: Vec<Address>,
}

// ── proposal ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalListResponse {
    pub proposals: Vec<Proposal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub sender: Address,
    #[serde(flatten)]
    pub args: ProposalArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub voter: Address,
    pub profile_id: ObjectId,
    pub community_id: ObjectId,
    pub vote_type: VoteType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotesResponse {
    pub proposal_id: ObjectId,
    pub votes: Vec<Vote>,
}

// ── notification / nft ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftListResponse {
    pub nfts: Vec<EventNft>,
}

// ── transactions ─────────────────────────────────────────────────────────────

/// Generic sponsored build for any known target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorRequest {
    pub sender: Address,
    /// `<package>::<module>::<function>`.
    pub target: String,
    pub arguments: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResponse {
    pub transaction: SponsoredTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Base64 transaction bytes exactly as returned by the build call.
    pub bytes: String,
    /// Base64 user signature.
    pub signature: String,
}
