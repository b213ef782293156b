//! Plain-text rendering for command results.

use std::fmt::Write as _;

use commity_client::{FlowError, FlowOutcome};
use commity_common::{Community, Notification, Profile, Proposal, Vote};

/// One line describing how a write ended.
pub fn outcome_line<T>(outcome: &FlowOutcome<T>, what: &str) -> String {
    match outcome {
        FlowOutcome::Confirmed(_) => format!("{}: confirmed", what),
        FlowOutcome::Optimistic(_) => format!("{}: submitted, indexer has not caught up yet", what),
        FlowOutcome::Cancelled => format!("{}: cancelled", what),
    }
}

/// Flow errors are shown with their user-facing message.
pub fn flow_error(e: FlowError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

pub fn profile(p: &Profile) -> String {
    format!("{}  {}  xp={}  owner={}", p.id, p.nickname, p.xp, p.owner.short())
}

pub fn communities(list: &[Community]) -> String {
    if list.is_empty() {
        return "(no communities)".to_string();
    }
    let mut out = String::new();
    for c in list {
        let _ = writeln!(
            out,
            "{}  {:<24}  members={:<4}  chat={}",
            c.id,
            c.name,
            c.member_count,
            c.channel_id.as_deref().unwrap_or("-")
        );
    }
    out.trim_end().to_string()
}

pub fn proposals(list: &[Proposal], now_ms: u64) -> String {
    if list.is_empty() {
        return "(no proposals)".to_string();
    }
    let mut out = String::new();
    for p in list {
        let kind = if p.is_join_request { "join" } else { "vote" };
        let _ = writeln!(
            out,
            "{}  [{:<7}] {:<4}  {:<32}  yes={} no={} abstain={}  quorum={}%",
            p.id,
            p.display_status(now_ms).to_string(),
            kind,
            p.title,
            p.yes_votes,
            p.no_votes,
            p.abstain_votes,
            p.quorum_threshold
        );
    }
    out.trim_end().to_string()
}

pub fn vote(v: &Vote) -> String {
    format!("{} voted {:?} (weight {})", v.voter.short(), v.vote_type, v.weight)
}

pub fn notification(n: &Notification) -> String {
    let mark = if n.read { ' ' } else { '*' };
    format!("{} {}  {}: {}", mark, n.id, n.title, n.message)
}

pub fn notifications(list: &[Notification]) -> String {
    if list.is_empty() {
        return "(no notifications)".to_string();
    }
    list.iter().map(notification).collect::<Vec<_>>().join("\n")
}
