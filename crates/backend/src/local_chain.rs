//! # In-process chain
//!
//! A [`ChainExecutor`] that runs the contract rules in memory and feeds the
//! resulting events straight into an [`Indexer`]. Used for local
//! development (`rpc_url = "local"`) and for end-to-end tests.
//!
//! Aborts are reported in the same text shape the real chain uses, so the
//! client-side error classification sees identical messages.
//!
//! Finalization rule: participation below the quorum ⇒ `EXPIRED`, otherwise
//! `PASSED` when yes outweighs no, else `FAILED`. A passed join request adds
//! the requester to the community.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use commity_common::transaction::digest;
use commity_common::{
    now_ms, AbortReason, Address, CallArg, ExecutionResult, MoveCall, MoveFunction, ObjectId, ProposalStatus,
    PureValue, TransactionData, UserSignature, VoteType,
};

use crate::indexer::{
    ChainEvent, CommityCreated, EventId, Indexer, MemberJoined, NftMinted, NftRedeemed, ProfileCreated,
    ProposalCreated, ProposalFinalized, VoteCasted,
};
use crate::sponsor::{ChainExecutor, ExecutorError};

struct LocalProposal {
    community: ObjectId,
    creator: Address,
    deadline: u64,
    quorum: u8,
    is_join_request: bool,
    status: ProposalStatus,
    voters: HashSet<Address>,
    yes: u64,
    no: u64,
}

struct LocalNft {
    community: ObjectId,
    owner: Address,
    xp: u64,
    redeemed: bool,
}

#[derive(Default)]
struct ChainState {
    next_object: u64,
    /// profile id -> owner
    profiles: HashMap<ObjectId, Address>,
    communities: HashMap<ObjectId, BTreeSet<Address>>,
    proposals: HashMap<ObjectId, LocalProposal>,
    nfts: HashMap<ObjectId, LocalNft>,
}

impl ChainState {
    fn new_object(&mut self) -> ObjectId {
        self.next_object += 1;
        let mut bytes = [0u8; 32];
        bytes[0] = 0xc0;
        bytes[24..].copy_from_slice(&self.next_object.to_be_bytes());
        ObjectId::from_bytes(bytes)
    }
}

type Outcome = Result<(Vec<ChainEvent>, Vec<ObjectId>), AbortReason>;

pub struct LocalChain {
    indexer: Arc<Indexer>,
    state: Mutex<ChainState>,
    clock_offset_ms: AtomicU64,
    index_delay: Option<Duration>,
}

impl LocalChain {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self {
            indexer,
            state: Mutex::new(ChainState::default()),
            clock_offset_ms: AtomicU64::new(0),
            index_delay: None,
        }
    }

    /// Apply events to the projections only after `delay`, to reproduce
    /// indexer lag.
    pub fn with_index_delay(mut self, delay: Duration) -> Self {
        self.index_delay = Some(delay);
        self
    }

    /// Move the chain clock forward.
    pub fn advance_clock(&self, by: Duration) {
        self.clock_offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn now(&self) -> u64 {
        now_ms().saturating_add(self.clock_offset_ms.load(Ordering::SeqCst))
    }

    /// Mint an event NFT. Outside the user entry points, so no transaction.
    pub fn mint_nft(&self, owner: &Address, community: &ObjectId, xp: u64) -> ObjectId {
        let id = {
            let mut state = self.state.lock();
            let id = state.new_object();
            state.nfts.insert(
                id.clone(),
                LocalNft {
                    community: community.clone(),
                    owner: owner.clone(),
                    xp,
                    redeemed: false,
                },
            );
            id
        };
        let event = ChainEvent::NftMinted(NftMinted {
            nft_id: id.clone(),
            commity_id: community.clone(),
            owner: owner.clone(),
            xp,
        });
        self.publish(format!("mint-{}", id), vec![event]);
        id
    }

    /// Dynamic-field view of a community's members, as a chain read sees it.
    pub fn members(&self, community: &ObjectId) -> Option<Vec<Address>> {
        self.state
            .lock()
            .communities
            .get(community)
            .map(|m| m.iter().cloned().collect())
    }

    fn publish(&self, tx_digest: String, events: Vec<ChainEvent>) {
        if events.is_empty() {
            return;
        }
        let indexer = Arc::clone(&self.indexer);
        let timestamp = self.now();
        let apply = move || {
            for (seq, event) in events.iter().enumerate() {
                let origin = EventId {
                    tx_digest: tx_digest.clone(),
                    event_seq: seq as u64,
                };
                indexer.apply_event(event, &origin, timestamp);
            }
        };
        match self.index_delay {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    apply();
                });
            }
            None => apply(),
        }
    }

    fn run(&self, sender: &Address, call: &MoveCall) -> Outcome {
        let mut state = self.state.lock();
        let now = self.now();
        let args = &call.arguments;
        let object = |i: usize| args.get(i).and_then(CallArg::as_object).cloned().ok_or(AbortReason::Unknown(100));
        let string = |i: usize| args.get(i).and_then(CallArg::as_str).map(str::to_string).ok_or(AbortReason::Unknown(100));
        let pure = |i: usize| match args.get(i) {
            Some(CallArg::Pure(v)) => Ok(v.clone()),
            _ => Err(AbortReason::Unknown(100)),
        };
        let owned_profile = |state: &ChainState, id: &ObjectId| -> Result<(), AbortReason> {
            match state.profiles.get(id) {
                Some(owner) if owner == sender => Ok(()),
                _ => Err(AbortReason::NotProfileOwner),
            }
        };

        match call.function {
            MoveFunction::CreateProfile => {
                if state.profiles.values().any(|owner| owner == sender) {
                    return Err(AbortReason::ProfileAlreadyExists);
                }
                let id = state.new_object();
                state.profiles.insert(id.clone(), sender.clone());
                let event = ChainEvent::ProfileCreated(ProfileCreated {
                    profile_id: id.clone(),
                    owner: sender.clone(),
                    nickname: string(0)?,
                });
                Ok((vec![event], vec![id]))
            }
            MoveFunction::CreateCommity => {
                let id = state.new_object();
                state.communities.insert(id.clone(), BTreeSet::new());
                let event = ChainEvent::CommityCreated(CommityCreated {
                    commity_id: id.clone(),
                    name: string(0)?,
                    creator: sender.clone(),
                });
                Ok((vec![event], vec![id]))
            }
            MoveFunction::JoinCommity => {
                let (profile, community) = (object(0)?, object(1)?);
                owned_profile(&*state, &profile)?;
                let members = state.communities.get_mut(&community).ok_or(AbortReason::WrongCommunity)?;
                if !members.insert(sender.clone()) {
                    return Err(AbortReason::AlreadyMember);
                }
                let event = ChainEvent::MemberJoined(MemberJoined {
                    commity_id: community,
                    member: sender.clone(),
                });
                Ok((vec![event], Vec::new()))
            }
            MoveFunction::CreateProposal => {
                let community = object(0)?;
                let is_join_request = matches!(pure(6)?, PureValue::Bool(true));
                let is_member = state
                    .communities
                    .get(&community)
                    .ok_or(AbortReason::WrongCommunity)?
                    .contains(sender);
                if is_join_request && is_member {
                    return Err(AbortReason::AlreadyMember);
                }
                if !is_join_request && !is_member {
                    return Err(AbortReason::NotMember);
                }
                let (PureValue::U64(deadline), PureValue::U8(quorum)) = (pure(4)?, pure(5)?) else {
                    return Err(AbortReason::Unknown(100));
                };
                let id = state.new_object();
                state.proposals.insert(
                    id.clone(),
                    LocalProposal {
                        community: community.clone(),
                        creator: sender.clone(),
                        deadline,
                        quorum,
                        is_join_request,
                        status: ProposalStatus::Active,
                        voters: HashSet::new(),
                        yes: 0,
                        no: 0,
                    },
                );
                let event = ChainEvent::ProposalCreated(ProposalCreated {
                    proposal_id: id.clone(),
                    commity_id: community,
                    creator: sender.clone(),
                    message_id: string(1)?,
                    title: string(2)?,
                    description: string(3)?,
                    deadline,
                    quorum_threshold: quorum,
                    is_join_request,
                });
                Ok((vec![event], vec![id]))
            }
            MoveFunction::CastVote => {
                let (profile, proposal_id, community) = (object(0)?, object(1)?, object(2)?);
                let PureValue::U8(code) = pure(3)? else {
                    return Err(AbortReason::Unknown(100));
                };
                let vote_type = VoteType::try_from(code).map_err(|_| AbortReason::Unknown(100))?;
                owned_profile(&*state, &profile)?;
                let is_member = state.communities.get(&community).is_some_and(|m| m.contains(sender));
                let proposal = state.proposals.get_mut(&proposal_id).ok_or(AbortReason::ProposalNotActive)?;
                if proposal.community != community {
                    return Err(AbortReason::WrongCommunity);
                }
                if !is_member {
                    return Err(AbortReason::NotMember);
                }
                if proposal.status != ProposalStatus::Active || now >= proposal.deadline {
                    return Err(AbortReason::ProposalNotActive);
                }
                if !proposal.voters.insert(sender.clone()) {
                    return Err(AbortReason::AlreadyVoted);
                }
                match vote_type {
                    VoteType::Yes => proposal.yes += 1,
                    VoteType::No => proposal.no += 1,
                    VoteType::Abstain => {}
                }
                let event = ChainEvent::VoteCasted(VoteCasted {
                    proposal_id,
                    voter: sender.clone(),
                    vote_type: vote_type.code(),
                    weight: 1,
                });
                Ok((vec![event], Vec::new()))
            }
            MoveFunction::FinalizeProposal => {
                let (profile, proposal_id, community) = (object(0)?, object(1)?, object(2)?);
                owned_profile(&*state, &profile)?;
                let member_count = state.communities.get(&community).map_or(0, |m| m.len() as u64);
                let proposal = state.proposals.get_mut(&proposal_id).ok_or(AbortReason::ProposalNotActive)?;
                if proposal.community != community {
                    return Err(AbortReason::WrongCommunity);
                }
                if &proposal.creator != sender {
                    return Err(AbortReason::NotProposalCreator);
                }
                if proposal.status != ProposalStatus::Active {
                    return Err(AbortReason::ProposalNotActive);
                }
                if now < proposal.deadline {
                    return Err(AbortReason::DeadlineNotReached);
                }
                let participation = if member_count == 0 {
                    0
                } else {
                    (proposal.voters.len() as u64) * 100 / member_count
                };
                let status = if participation < u64::from(proposal.quorum) {
                    ProposalStatus::Expired
                } else if proposal.yes > proposal.no {
                    ProposalStatus::Passed
                } else {
                    ProposalStatus::Failed
                };
                proposal.status = status;
                let admit = (proposal.is_join_request && status == ProposalStatus::Passed)
                    .then(|| proposal.creator.clone());

                let mut events = vec![ChainEvent::ProposalFinalized(ProposalFinalized {
                    proposal_id,
                    status: status_code(status),
                })];
                if let Some(requester) = admit {
                    if let Some(members) = state.communities.get_mut(&community) {
                        if members.insert(requester.clone()) {
                            events.push(ChainEvent::MemberJoined(MemberJoined {
                                commity_id: community,
                                member: requester,
                            }));
                        }
                    }
                }
                Ok((events, Vec::new()))
            }
            MoveFunction::RedeemNftForXp => {
                let (profile, nft_id, community) = (object(0)?, object(1)?, object(2)?);
                owned_profile(&*state, &profile)?;
                let nft = state.nfts.get_mut(&nft_id).ok_or(AbortReason::NotProfileOwner)?;
                if &nft.owner != sender {
                    return Err(AbortReason::NotProfileOwner);
                }
                if nft.community != community {
                    return Err(AbortReason::WrongCommunity);
                }
                if nft.redeemed {
                    return Err(AbortReason::NftAlreadyRedeemed);
                }
                nft.redeemed = true;
                let event = ChainEvent::NftRedeemed(NftRedeemed {
                    nft_id,
                    profile_id: profile,
                    owner: sender.clone(),
                    xp: nft.xp,
                });
                Ok((vec![event], Vec::new()))
            }
        }
    }
}

fn status_code(status: ProposalStatus) -> u8 {
    match status {
        ProposalStatus::Active => 0,
        ProposalStatus::Passed => 1,
        ProposalStatus::Failed => 2,
        ProposalStatus::Expired => 3,
    }
}

fn abort_message(call: &MoveCall, reason: AbortReason) -> String {
    format!(
        "MoveAbort(MoveLocation {{ module: ModuleId {{ address: {}, name: Identifier(\"{}\") }}, function: 0, instruction: 0, function_name: Some(\"{}\") }}, {}) in command 0",
        call.package,
        call.module,
        call.function,
        reason.code()
    )
}

#[async_trait]
impl ChainExecutor for LocalChain {
    async fn execute(&self, tx_bytes: &[u8], signatures: &[UserSignature]) -> Result<ExecutionResult, ExecutorError> {
        let data = TransactionData::from_bytes(tx_bytes).map_err(|e| ExecutorError::Rejected(e.to_string()))?;
        let signers: Vec<Address> = signatures.iter().filter_map(|s| s.verify(tx_bytes).ok()).collect();
        if !signers.contains(&data.sender) || !signers.contains(&data.gas.owner) {
            return Err(ExecutorError::Rejected("signature verification failed".to_string()));
        }

        let call = data.kind.move_call();
        let tx_digest = digest(tx_bytes);
        let (events, created) = self
            .run(&data.sender, call)
            .map_err(|reason| ExecutorError::Rejected(abort_message(call, reason)))?;
        debug!(digest = %tx_digest, function = %call.function, events = events.len(), "local transaction executed");
        self.publish(tx_digest.clone(), events);
        Ok(ExecutionResult {
            digest: tx_digest,
            created,
        })
    }
}
