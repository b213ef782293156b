//! # Move-Call Targets
//!
//! Typed builders for the seven contract entry points this application
//! invokes. The contract itself is external; this module only guarantees
//! that every call we hand to a signer has the argument shape the entry
//! point expects.
//!
//! ## Entry Points
//!
//! | Function | Arguments |
//! |----------|-----------|
//! | `create_profile` | nickname |
//! | `create_commity` | name |
//! | `join_commity` | profile, community |
//! | `create_proposal` | community, message id, title, description, deadline, quorum, is join request |
//! | `cast_vote` | profile, proposal, community, vote type, clock |
//! | `finalize_proposal` | creator profile, proposal, community, clock |
//! | `redeem_nft_for_xp` | profile, nft, community |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Address, ObjectId, TypeError, VoteType};

/// Shared clock object passed to time-dependent entry points.
pub const CLOCK_OBJECT_ID: &str = "0x6";

// ════════════════════════════════════════════════════════════════════════════════
// ERRORS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveCallError {
    #[error("unknown move function: {0}")]
    UnknownFunction(String),

    #[error("malformed target '{0}': expected <package>::<module>::<function>")]
    MalformedTarget(String),

    #[error("{function} expects {expected} arguments, got {found}")]
    Arity {
        function: MoveFunction,
        expected: usize,
        found: usize,
    },

    #[error("{function} argument {index}: expected {expected}")]
    ArgumentShape {
        function: MoveFunction,
        index: usize,
        expected: &'static str,
    },

    #[error("clock argument must reference the shared clock object")]
    WrongClock,

    #[error(transparent)]
    Type(#[from] TypeError),
}

// ════════════════════════════════════════════════════════════════════════════════
// FUNCTIONS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveFunction {
    CreateProfile,
    CreateCommity,
    JoinCommity,
    CreateProposal,
    CastVote,
    FinalizeProposal,
    RedeemNftForXp,
}

/// Expected shape of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgShape {
    Str,
    U64,
    U8,
    Bool,
    Object,
    Clock,
}

impl ArgShape {
    fn describe(self) -> &'static str {
        match self {
            ArgShape::Str => "string",
            ArgShape::U64 => "u64",
            ArgShape::U8 => "u8",
            ArgShape::Bool => "bool",
            ArgShape::Object => "object id",
            ArgShape::Clock => "clock",
        }
    }

    fn matches(self, arg: &CallArg) -> bool {
        matches!(
            (self, arg),
            (ArgShape::Str, CallArg::Pure(PureValue::String(_)))
                | (ArgShape::U64, CallArg::Pure(PureValue::U64(_)))
                | (ArgShape::U8, CallArg::Pure(PureValue::U8(_)))
                | (ArgShape::Bool, CallArg::Pure(PureValue::Bool(_)))
                | (ArgShape::Object, CallArg::Object(_))
                | (ArgShape::Clock, CallArg::Clock)
        )
    }
}

impl MoveFunction {
    pub const ALL: [MoveFunction; 7] = [
        MoveFunction::CreateProfile,
        MoveFunction::CreateCommity,
        MoveFunction::JoinCommity,
        MoveFunction::CreateProposal,
        MoveFunction::CastVote,
        MoveFunction::FinalizeProposal,
        MoveFunction::RedeemNftForXp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MoveFunction::CreateProfile => "create_profile",
            MoveFunction::CreateCommity => "create_commity",
            MoveFunction::JoinCommity => "join_commity",
            MoveFunction::CreateProposal => "create_proposal",
            MoveFunction::CastVote => "cast_vote",
            MoveFunction::FinalizeProposal => "finalize_proposal",
            MoveFunction::RedeemNftForXp => "redeem_nft_for_xp",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, MoveCallError> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| MoveCallError::UnknownFunction(name.to_string()))
    }

    fn signature(&self) -> &'static [ArgShape] {
        use ArgShape::*;
        match self {
            MoveFunction::CreateProfile => &[Str],
            MoveFunction::CreateCommity => &[Str],
            MoveFunction::JoinCommity => &[Object, Object],
            MoveFunction::CreateProposal => &[Object, Str, Str, Str, U64, U8, Bool],
            MoveFunction::CastVote => &[Object, Object, Object, U8, Clock],
            MoveFunction::FinalizeProposal => &[Object, Object, Object, Clock],
            MoveFunction::RedeemNftForXp => &[Object, Object, Object],
        }
    }

    pub fn arity(&self) -> usize {
        self.signature().len()
    }
}

impl fmt::Display for MoveFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ARGUMENTS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PureValue {
    String(String),
    U64(u64),
    U8(u8),
    Bool(bool),
    Address(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    Pure(PureValue),
    Object(ObjectId),
    Clock,
}

impl CallArg {
    pub fn string(s: impl Into<String>) -> Self {
        CallArg::Pure(PureValue::String(s.into()))
    }

    pub fn u64(v: u64) -> Self {
        CallArg::Pure(PureValue::U64(v))
    }

    pub fn u8(v: u8) -> Self {
        CallArg::Pure(PureValue::U8(v))
    }

    pub fn bool(v: bool) -> Self {
        CallArg::Pure(PureValue::Bool(v))
    }

    pub fn object(id: &ObjectId) -> Self {
        CallArg::Object(id.clone())
    }

    pub fn as_object(&self) -> Option<&ObjectId> {
        match self {
            CallArg::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CallArg::Pure(PureValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// MOVE CALL
// ════════════════════════════════════════════════════════════════════════════════

/// A single programmable call against the contract module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: MoveFunction,
    pub arguments: Vec<CallArg>,
}

/// Fields for a new proposal, shared by the builder and the REST layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalArgs {
    pub community_id: ObjectId,
    #[serde(default)]
    pub message_id: String,
    pub title: String,
    pub description: String,
    pub deadline: u64,
    pub quorum_threshold: u8,
    #[serde(default)]
    pub is_join_request: bool,
}

impl MoveCall {
    fn new(package: &ObjectId, module: &str, function: MoveFunction, arguments: Vec<CallArg>) -> Self {
        Self {
            package: package.clone(),
            module: module.to_string(),
            function,
            arguments,
        }
    }

    pub fn create_profile(package: &ObjectId, module: &str, nickname: &str) -> Self {
        Self::new(package, module, MoveFunction::CreateProfile, vec![CallArg::string(nickname)])
    }

    pub fn create_commity(package: &ObjectId, module: &str, name: &str) -> Self {
        Self::new(package, module, MoveFunction::CreateCommity, vec![CallArg::string(name)])
    }

    pub fn join_commity(package: &ObjectId, module: &str, profile: &ObjectId, community: &ObjectId) -> Self {
        Self::new(
            package,
            module,
            MoveFunction::JoinCommity,
            vec![CallArg::object(profile), CallArg::object(community)],
        )
    }

    pub fn create_proposal(package: &ObjectId, module: &str, args: &ProposalArgs) -> Self {
        Self::new(
            package,
            module,
            MoveFunction::CreateProposal,
            vec![
                CallArg::object(&args.community_id),
                CallArg::string(args.message_id.clone()),
                CallArg::string(args.title.clone()),
                CallArg::string(args.description.clone()),
                CallArg::u64(args.deadline),
                CallArg::u8(args.quorum_threshold),
                CallArg::bool(args.is_join_request),
            ],
        )
    }

    pub fn cast_vote(
        package: &ObjectId,
        module: &str,
        profile: &ObjectId,
        proposal: &ObjectId,
        community: &ObjectId,
        vote: VoteType,
    ) -> Self {
        Self::new(
            package,
            module,
            MoveFunction::CastVote,
            vec![
                CallArg::object(profile),
                CallArg::object(proposal),
                CallArg::object(community),
                CallArg::u8(vote.code()),
                CallArg::Clock,
            ],
        )
    }

    pub fn finalize_proposal(
        package: &ObjectId,
        module: &str,
        creator_profile: &ObjectId,
        proposal: &ObjectId,
        community: &ObjectId,
    ) -> Self {
        Self::new(
            package,
            module,
            MoveFunction::FinalizeProposal,
            vec![
                CallArg::object(creator_profile),
                CallArg::object(proposal),
                CallArg::object(community),
                CallArg::Clock,
            ],
        )
    }

    pub fn redeem_nft_for_xp(
        package: &ObjectId,
        module: &str,
        profile: &ObjectId,
        nft: &ObjectId,
        community: &ObjectId,
    ) -> Self {
        Self::new(
            package,
            module,
            MoveFunction::RedeemNftForXp,
            vec![CallArg::object(profile), CallArg::object(nft), CallArg::object(community)],
        )
    }

    /// Fully-qualified target, `<package>::<module>::<function>`.
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }

    /// Split a fully-qualified target into its parts.
    pub fn parse_target(target: &str) -> Result<(ObjectId, String, MoveFunction), MoveCallError> {
        let parts: Vec<&str> = target.split("::").collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(MoveCallError::MalformedTarget(target.to_string()));
        }
        let package = ObjectId::parse(parts[0])?;
        let function = MoveFunction::from_name(parts[2])?;
        Ok((package, parts[1].to_string(), function))
    }

    /// Check argument count and per-position shape against the entry point.
    pub fn validate(&self) -> Result<(), MoveCallError> {
        let signature = self.function.signature();
        if signature.len() != self.arguments.len() {
            return Err(MoveCallError::Arity {
                function: self.function,
                expected: signature.len(),
                found: self.arguments.len(),
            });
        }
        for (index, (shape, arg)) in signature.iter().zip(&self.arguments).enumerate() {
            if !shape.matches(arg) {
                return Err(MoveCallError::ArgumentShape {
                    function: self.function,
                    index,
                    expected: shape.describe(),
                });
            }
        }
        Ok(())
    }

    /// First object argument, which is the community for every
    /// community-scoped call except `join_commity` / `cast_vote`.
    pub fn community_argument(&self) -> Option<&ObjectId> {
        let index = match self.function {
            MoveFunction::CreateProposal => 0,
            MoveFunction::JoinCommity => 1,
            MoveFunction::CastVote | MoveFunction::FinalizeProposal | MoveFunction::RedeemNftForXp => 2,
            MoveFunction::CreateProfile | MoveFunction::CreateCommity => return None,
        };
        self.arguments.get(index).and_then(CallArg::as_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg() -> ObjectId {
        ObjectId::parse("0xda0").expect("pkg")
    }

    fn oid(s: &str) -> ObjectId {
        ObjectId::parse(s).expect("oid")
    }

    fn every_builder() -> Vec<MoveCall> {
        let p = pkg();
        vec![
            MoveCall::create_profile(&p, "commity", "nadolink"),
            MoveCall::create_commity(&p, "commity", "Rustaceans"),
            MoveCall::join_commity(&p, "commity", &oid("0x1"), &oid("0x2")),
            MoveCall::create_proposal(
                &p,
                "commity",
                &ProposalArgs {
                    community_id: oid("0x2"),
                    message_id: "m-1".into(),
                    title: "t".into(),
                    description: "d".into(),
                    deadline: 10,
                    quorum_threshold: 51,
                    is_join_request: false,
                },
            ),
            MoveCall::cast_vote(&p, "commity", &oid("0x1"), &oid("0x3"), &oid("0x2"), VoteType::Yes),
            MoveCall::finalize_proposal(&p, "commity", &oid("0x1"), &oid("0x3"), &oid("0x2")),
            MoveCall::redeem_nft_for_xp(&p, "commity", &oid("0x1"), &oid("0x4"), &oid("0x2")),
        ]
    }

    #[test]
    fn builders_produce_valid_calls() {
        for call in &every_builder() {
            assert_eq!(call.validate(), Ok(()), "{}", call.function);
            assert_eq!(call.arguments.len(), call.function.arity());
        }
    }

    #[test]
    fn every_builder_survives_json() {
        for call in every_builder() {
            let json = serde_json::to_string(&call).expect("serialize");
            let back: MoveCall = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, call, "{}", call.function);
        }
    }

    #[test]
    fn call_arg_wire_shape() {
        let object = serde_json::to_value(CallArg::object(&oid("0x2"))).expect("object");
        assert_eq!(object["kind"], "object");
        assert_eq!(object["value"], oid("0x2").to_string());
        let pure = serde_json::to_value(CallArg::u8(1)).expect("pure");
        assert_eq!(pure["kind"], "pure");
        assert_eq!(pure["value"]["type"], "u8");
        let clock = serde_json::to_value(CallArg::Clock).expect("clock");
        assert_eq!(clock, serde_json::json!({ "kind": "clock" }));
    }

    #[test]
    fn wrong_arity_rejected() {
        let mut call = MoveCall::create_profile(&pkg(), "commity", "nadolink");
        call.arguments.push(CallArg::u8(1));
        assert!(matches!(
            call.validate(),
            Err(MoveCallError::Arity { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn wrong_shape_rejected() {
        let mut call = MoveCall::cast_vote(&pkg(), "commity", &oid("0x1"), &oid("0x3"), &oid("0x2"), VoteType::No);
        call.arguments[3] = CallArg::u64(1);
        assert_eq!(
            call.validate(),
            Err(MoveCallError::ArgumentShape {
                function: MoveFunction::CastVote,
                index: 3,
                expected: "u8",
            })
        );
    }

    #[test]
    fn target_roundtrips_through_parse() {
        let call = MoveCall::create_commity(&pkg(), "commity", "x");
        let (package, module, function) = MoveCall::parse_target(&call.target()).expect("parse");
        assert_eq!(package, pkg());
        assert_eq!(module, "commity");
        assert_eq!(function, MoveFunction::CreateCommity);

        assert!(matches!(
            MoveCall::parse_target("0x1::commity"),
            Err(MoveCallError::MalformedTarget(_))
        ));
        assert!(matches!(
            MoveCall::parse_target("0x1::commity::burn_everything"),
            Err(MoveCallError::UnknownFunction(_))
        ));
    }

    #[test]
    fn community_argument_position() {
        let p = pkg();
        let join = MoveCall::join_commity(&p, "commity", &oid("0x1"), &oid("0x2"));
        assert_eq!(join.community_argument(), Some(&oid("0x2")));
        let vote = MoveCall::cast_vote(&p, "commity", &oid("0x1"), &oid("0x3"), &oid("0x2"), VoteType::Yes);
        assert_eq!(vote.community_argument(), Some(&oid("0x2")));
        let profile = MoveCall::create_profile(&p, "commity", "abc");
        assert_eq!(profile.community_argument(), None);
    }
}
