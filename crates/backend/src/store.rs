//! # Projection Store
//!
//! In-memory read model rebuilt from chain events. Every REST read is served
//! from here; the chain stays authoritative and this store may lag behind it.
//!
//! ## Thread Safety
//!
//! A single `parking_lot::RwLock` guards all maps so that one applied event
//! (which may touch a proposal, its votes and several notifications) is seen
//! atomically by readers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;

use commity_common::{
    Address, Community, EventNft, Notification, ObjectId, Profile, ProfileStats, Proposal, ProposalStatus, Vote,
    VoteType,
};

#[derive(Default)]
struct StoreInner {
    profiles: HashMap<Address, Profile>,
    profile_owners: HashMap<ObjectId, Address>,
    communities: BTreeMap<ObjectId, Community>,
    members: HashMap<ObjectId, BTreeSet<Address>>,
    proposals: BTreeMap<ObjectId, Proposal>,
    votes: HashMap<ObjectId, Vec<Vote>>,
    notifications: HashMap<Address, Vec<Notification>>,
    nfts: BTreeMap<ObjectId, EventNft>,
    /// Opaque indexer cursor of the last applied event page.
    cursor: Option<serde_json::Value>,
}

pub struct ProjectionStore {
    inner: RwLock<StoreInner>,
}

impl Default for ProjectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    // ── profiles ────────────────────────────────────────────────────────────

    /// Insert a profile. A second profile for the same owner is ignored;
    /// the contract allows one per address.
    pub fn insert_profile(&self, profile: Profile) -> bool {
        let mut inner = self.inner.write();
        if inner.profiles.contains_key(&profile.owner) {
            return false;
        }
        inner.profile_owners.insert(profile.id.clone(), profile.owner.clone());
        inner.profiles.insert(profile.owner.clone(), profile);
        true
    }

    pub fn profile(&self, owner: &Address) -> Option<Profile> {
        self.inner.read().profiles.get(owner).cloned()
    }

    pub fn profile_by_id(&self, id: &ObjectId) -> Option<Profile> {
        let inner = self.inner.read();
        let owner = inner.profile_owners.get(id)?;
        inner.profiles.get(owner).cloned()
    }

    /// Add XP to a profile; returns the new total.
    pub fn add_xp(&self, owner: &Address, xp: u64) -> Option<u64> {
        let mut inner = self.inner.write();
        let profile = inner.profiles.get_mut(owner)?;
        profile.xp = profile.xp.saturating_add(xp);
        Some(profile.xp)
    }

    // ── communities ─────────────────────────────────────────────────────────

    pub fn insert_community(&self, community: Community) {
        let mut inner = self.inner.write();
        inner.members.entry(community.id.clone()).or_default();
        inner.communities.insert(community.id.clone(), community);
    }

    pub fn community(&self, id: &ObjectId) -> Option<Community> {
        self.inner.read().communities.get(id).cloned()
    }

    pub fn communities(&self) -> Vec<Community> {
        self.inner.read().communities.values().cloned().collect()
    }

    pub fn set_channel(&self, id: &ObjectId, channel_id: String) -> bool {
        match self.inner.write().communities.get_mut(id) {
            Some(c) => {
                c.channel_id = Some(channel_id);
                true
            }
            None => false,
        }
    }

    /// Record a membership. Returns `false` when already a member.
    pub fn add_member(&self, community: &ObjectId, member: &Address) -> bool {
        let mut inner = self.inner.write();
        let inserted = inner.members.entry(community.clone()).or_default().insert(member.clone());
        if inserted {
            if let Some(c) = inner.communities.get_mut(community) {
                c.member_count = c.member_count.saturating_add(1);
            }
        }
        inserted
    }

    pub fn is_member(&self, community: &ObjectId, address: &Address) -> bool {
        self.inner
            .read()
            .members
            .get(community)
            .is_some_and(|m| m.contains(address))
    }

    /// `None` when the community is unknown.
    pub fn members(&self, community: &ObjectId) -> Option<Vec<Address>> {
        let inner = self.inner.read();
        if !inner.communities.contains_key(community) {
            return None;
        }
        Some(
            inner
                .members
                .get(community)
                .map(|m| m.iter().cloned().collect())
                .unwrap_or_default(),
        )
    }

    pub fn communities_of(&self, member: &Address) -> Vec<Community> {
        let inner = self.inner.read();
        inner
            .communities
            .values()
            .filter(|c| inner.members.get(&c.id).is_some_and(|m| m.contains(member)))
            .cloned()
            .collect()
    }

    // ── proposals & votes ───────────────────────────────────────────────────

    pub fn insert_proposal(&self, proposal: Proposal) {
        let mut inner = self.inner.write();
        inner.votes.entry(proposal.id.clone()).or_default();
        inner.proposals.insert(proposal.id.clone(), proposal);
    }

    pub fn proposal(&self, id: &ObjectId) -> Option<Proposal> {
        self.inner.read().proposals.get(id).cloned()
    }

    /// Proposals of one community, newest deadline first.
    pub fn proposals_of(&self, community: &ObjectId) -> Vec<Proposal> {
        let mut list: Vec<Proposal> = self
            .inner
            .read()
            .proposals
            .values()
            .filter(|p| &p.community_id == community)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.deadline.cmp(&a.deadline).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Record a vote and update the proposal tallies.
    ///
    /// Returns `false` if the voter already voted or the proposal is unknown.
    pub fn record_vote(&self, proposal_id: &ObjectId, vote: Vote) -> bool {
        let mut inner = self.inner.write();
        let StoreInner { proposals, votes, .. } = &mut *inner;
        let Some(proposal) = proposals.get_mut(proposal_id) else {
            return false;
        };
        let list = votes.entry(proposal_id.clone()).or_default();
        if list.iter().any(|v| v.voter == vote.voter) {
            return false;
        }
        match vote.vote_type {
            VoteType::Yes => proposal.yes_votes = proposal.yes_votes.saturating_add(vote.weight),
            VoteType::No => proposal.no_votes = proposal.no_votes.saturating_add(vote.weight),
            VoteType::Abstain => proposal.abstain_votes = proposal.abstain_votes.saturating_add(vote.weight),
        }
        proposal.total_voters = proposal.total_voters.saturating_add(1);
        list.push(vote);
        true
    }

    /// `None` when the proposal is unknown.
    pub fn votes(&self, proposal_id: &ObjectId) -> Option<Vec<Vote>> {
        let inner = self.inner.read();
        if !inner.proposals.contains_key(proposal_id) {
            return None;
        }
        Some(inner.votes.get(proposal_id).cloned().unwrap_or_default())
    }

    pub fn set_status(&self, proposal_id: &ObjectId, status: ProposalStatus) -> Option<Proposal> {
        let mut inner = self.inner.write();
        let proposal = inner.proposals.get_mut(proposal_id)?;
        proposal.status = status;
        Some(proposal.clone())
    }

    // ── notifications ───────────────────────────────────────────────────────

    /// Store a notification. Ids are deterministic per event and recipient,
    /// so re-applying an event does not duplicate it.
    pub fn push_notification(&self, notification: Notification) -> bool {
        let mut inner = self.inner.write();
        let list = inner.notifications.entry(notification.address.clone()).or_default();
        if list.iter().any(|n| n.id == notification.id) {
            return false;
        }
        list.push(notification);
        true
    }

    /// Notifications for one address, oldest first.
    pub fn notifications(&self, address: &Address) -> Vec<Notification> {
        let mut list = self.inner.read().notifications.get(address).cloned().unwrap_or_default();
        list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn mark_read(&self, address: &Address, id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(n) = inner
            .notifications
            .get_mut(address)
            .and_then(|list| list.iter_mut().find(|n| n.id == id))
        else {
            return false;
        };
        n.read = true;
        true
    }

    // ── nfts ────────────────────────────────────────────────────────────────

    pub fn insert_nft(&self, nft: EventNft) {
        self.inner.write().nfts.insert(nft.id.clone(), nft);
    }

    pub fn nft(&self, id: &ObjectId) -> Option<EventNft> {
        self.inner.read().nfts.get(id).cloned()
    }

    pub fn nfts_of(&self, owner: &Address) -> Vec<EventNft> {
        self.inner
            .read()
            .nfts
            .values()
            .filter(|n| &n.owner == owner)
            .cloned()
            .collect()
    }

    pub fn mark_redeemed(&self, id: &ObjectId) -> Option<EventNft> {
        let mut inner = self.inner.write();
        let nft = inner.nfts.get_mut(id)?;
        nft.redeemed = true;
        Some(nft.clone())
    }

    // ── stats ───────────────────────────────────────────────────────────────

    /// Per-profile statistics, scoped to one community when given.
    pub fn stats(&self, address: &Address, community: Option<&ObjectId>) -> ProfileStats {
        let inner = self.inner.read();
        let profile = inner.profiles.get(address);
        let in_scope = |p: &Proposal| community.map_or(true, |c| &p.community_id == c);

        let proposals_created = inner
            .proposals
            .values()
            .filter(|p| in_scope(p) && &p.creator == address)
            .count() as u64;
        let votes_cast = inner
            .proposals
            .values()
            .filter(|p| in_scope(p))
            .filter(|p| {
                inner
                    .votes
                    .get(&p.id)
                    .is_some_and(|votes| votes.iter().any(|v| &v.voter == address))
            })
            .count() as u64;
        let is_member = community
            .and_then(|c| inner.members.get(c))
            .is_some_and(|m| m.contains(address));

        ProfileStats {
            profile_id: profile.map(|p| p.id.clone()),
            community_id: community.cloned(),
            is_member,
            votes_cast,
            proposals_created,
            xp: profile.map(|p| p.xp).unwrap_or(0),
        }
    }

    // ── cursor ──────────────────────────────────────────────────────────────

    pub fn cursor(&self) -> Option<serde_json::Value> {
        self.inner.read().cursor.clone()
    }

    pub fn set_cursor(&self, cursor: Option<serde_json::Value>) {
        if cursor.is_some() {
            self.inner.write().cursor = cursor;
        }
    }
}
