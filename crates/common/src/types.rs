//! # Read-Side Data Model
//!
//! Mirror types for the entities owned by the on-chain contract. Nothing
//! here is authoritative: the backend derives these projections from chain
//! events and the client only displays and reconciles them.
//!
//! ## Identifiers
//!
//! [`Address`] and [`ObjectId`] share one canonical form: `0x` followed by
//! 64 lowercase hex characters. Shorter input (e.g. `0x6`) is left-padded,
//! so `0x6` and `0x000…006` compare equal.
//!
//! ## JSON Shape
//!
//! All structs serialize in camelCase because the REST API and the push
//! channel speak the same JSON the web client consumed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ════════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ════════════════════════════════════════════════════════════════════════════════

/// Hex characters in a canonical 32-byte identifier.
pub const ID_HEX_LEN: usize = 64;

/// Minimum nickname length after trimming.
pub const NICKNAME_MIN_LEN: usize = 3;

/// Maximum nickname length after trimming.
pub const NICKNAME_MAX_LEN: usize = 32;

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("identifier is empty")]
    EmptyId,

    #[error("identifier too long: {0} hex chars (max 64)")]
    IdTooLong(usize),

    #[error("identifier contains non-hex characters: {0}")]
    NonHexId(String),

    #[error("unknown vote type code: {0}")]
    UnknownVoteType(u8),

    #[error("unknown proposal status code: {0}")]
    UnknownStatus(u8),

    #[error("nickname must be between {min} and {max} characters")]
    NicknameLength { min: usize, max: usize },
}

// ════════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ════════════════════════════════════════════════════════════════════════════════

fn normalize_hex_id(raw: &str) -> Result<String, TypeError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if body.is_empty() {
        return Err(TypeError::EmptyId);
    }
    if body.len() > ID_HEX_LEN {
        return Err(TypeError::IdTooLong(body.len()));
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TypeError::NonHexId(raw.to_string()));
    }

    Ok(format!("0x{:0>64}", body.to_ascii_lowercase()))
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and normalize a hex identifier.
            pub fn parse(raw: &str) -> Result<Self, TypeError> {
                normalize_hex_id(raw).map(Self)
            }

            /// Build from raw 32 bytes.
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(format!("0x{}", hex::encode(bytes)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Short form used in log lines (`0x1234…abcd`).
            pub fn short(&self) -> String {
                let s = &self.0;
                format!("{}…{}", &s[..6], &s[s.len() - 4..])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }
    };
}

hex_id!(
    /// Account address of a wallet holder.
    Address
);

hex_id!(
    /// Identifier of an on-chain object (profile, community, proposal, NFT).
    ObjectId
);

// ════════════════════════════════════════════════════════════════════════════════
// PROFILE
// ════════════════════════════════════════════════════════════════════════════════

/// A user profile. One per address; the nickname is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ObjectId,
    pub owner: Address,
    pub nickname: String,
    /// Accumulated XP from redeemed event NFTs.
    #[serde(default)]
    pub xp: u64,
}

/// Validate a nickname before a `create_profile` call is built.
///
/// Returns the trimmed nickname.
pub fn validate_nickname(raw: &str) -> Result<String, TypeError> {
    let nickname = raw.trim();
    let len = nickname.chars().count();
    if !(NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len) {
        return Err(TypeError::NicknameLength {
            min: NICKNAME_MIN_LEN,
            max: NICKNAME_MAX_LEN,
        });
    }
    Ok(nickname.to_string())
}

/// Per-community statistics for one profile
/// (`GET /profile/:address/stats?commityId=`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub profile_id: Option<ObjectId>,
    pub community_id: Option<ObjectId>,
    pub is_member: bool,
    pub votes_cast: u64,
    pub proposals_created: u64,
    pub xp: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// COMMUNITY
// ════════════════════════════════════════════════════════════════════════════════

/// A community ("commity" on-chain). Membership itself lives in dynamic
/// fields of the community object; `member_count` is a cached projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub creator: Option<Address>,
    /// Messaging channel bound to this community, once created.
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub member_count: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// PROPOSAL
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalStatus {
    Active,
    Passed,
    Failed,
    Expired,
}

impl ProposalStatus {
    /// Decode the contract's `u8` status field.
    pub fn from_code(code: u8) -> Result<Self, TypeError> {
        match code {
            0 => Ok(Self::Active),
            1 => Ok(Self::Passed),
            2 => Ok(Self::Failed),
            3 => Ok(Self::Expired),
            other => Err(TypeError::UnknownStatus(other)),
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: ObjectId,
    pub community_id: ObjectId,
    /// Chat message the proposal was announced with (empty when none).
    #[serde(default)]
    pub message_id: String,
    pub creator: Address,
    pub title: String,
    pub description: String,
    /// Voting deadline, milliseconds since the Unix epoch.
    pub deadline: u64,
    #[serde(default)]
    pub yes_votes: u64,
    #[serde(default)]
    pub no_votes: u64,
    #[serde(default)]
    pub abstain_votes: u64,
    #[serde(default)]
    pub total_voters: u64,
    pub status: ProposalStatus,
    /// Minimum participation percentage (1..=100).
    pub quorum_threshold: u8,
    #[serde(default)]
    pub is_join_request: bool,
}

impl Proposal {
    /// Sum of weighted tallies.
    pub fn total_votes(&self) -> u64 {
        self.yes_votes
            .saturating_add(self.no_votes)
            .saturating_add(self.abstain_votes)
    }

    pub fn is_past_deadline(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline
    }

    /// Status to show before the chain has finalized the proposal.
    ///
    /// An `ACTIVE` proposal whose deadline has passed is displayed as
    /// `EXPIRED` until someone calls `finalize_proposal`.
    pub fn display_status(&self, now_ms: u64) -> ProposalStatus {
        if self.status == ProposalStatus::Active && self.is_past_deadline(now_ms) {
            ProposalStatus::Expired
        } else {
            self.status
        }
    }

    /// Voter participation relative to the community size, in percent.
    ///
    /// Returns 0 for an empty community.
    pub fn participation_percent(&self, member_count: u64) -> u64 {
        if member_count == 0 {
            return 0;
        }
        self.total_voters.saturating_mul(100) / member_count
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// VOTE
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VoteType {
    No,
    Yes,
    Abstain,
}

impl VoteType {
    pub fn code(self) -> u8 {
        match self {
            Self::No => 0,
            Self::Yes => 1,
            Self::Abstain => 2,
        }
    }
}

impl TryFrom<u8> for VoteType {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::No),
            1 => Ok(Self::Yes),
            2 => Ok(Self::Abstain),
            other => Err(TypeError::UnknownVoteType(other)),
        }
    }
}

impl From<VoteType> for u8 {
    fn from(value: VoteType) -> u8 {
        value.code()
    }
}

impl FromStr for VoteType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "no" | "0" => Ok(Self::No),
            "yes" | "1" => Ok(Self::Yes),
            "abstain" | "2" => Ok(Self::Abstain),
            _ => Err(TypeError::UnknownVoteType(u8::MAX)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter: Address,
    pub vote_type: VoteType,
    pub weight: u64,
    pub timestamp: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// EVENT NFT
// ════════════════════════════════════════════════════════════════════════════════

/// Attendance NFT that can be redeemed once for XP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNft {
    pub id: ObjectId,
    pub community_id: ObjectId,
    pub xp: u64,
    pub owner: Address,
    #[serde(default)]
    pub redeemed: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// NOTIFICATION
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProposalCreated,
    VoteCasted,
    ProposalFinalized,
    JoinRequest,
    MemberJoined,
    NftRedeemed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub address: Address,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub read: bool,
    pub timestamp: u64,
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════
