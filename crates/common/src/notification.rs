//! Notification merge for the push/poll hybrid feed.
//!
//! The same notification can arrive once over the socket and again from
//! the next poll. Merging keeps exactly one copy per id, ordered by
//! timestamp ascending (ties broken by id so the order is deterministic).

use std::collections::HashMap;

use crate::types::Notification;

/// Merge `incoming` into `existing`.
///
/// The first copy seen for an id is kept, except that a copy with
/// `read = true` upgrades the kept copy: read state only moves forward.
pub fn merge_notifications(existing: &[Notification], incoming: Vec<Notification>) -> Vec<Notification> {
    let mut by_id: HashMap<String, Notification> = HashMap::with_capacity(existing.len() + incoming.len());

    for n in existing.iter().cloned().chain(incoming) {
        match by_id.get_mut(&n.id) {
            Some(kept) => {
                if n.read {
                    kept.read = true;
                }
            }
            None => {
                by_id.insert(n.id.clone(), n);
            }
        }
    }

    let mut merged: Vec<Notification> = by_id.into_values().collect();
    merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    merged
}

/// Number of unread notifications.
pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, NotificationKind};
    use std::collections::HashSet;

    fn n(id: &str, ts: u64, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            address: Address::parse("0xa").expect("addr"),
            kind: NotificationKind::ProposalCreated,
            title: format!("title {}", id),
            message: String::new(),
            data: serde_json::Value::Null,
            read,
            timestamp: ts,
        }
    }

    #[test]
    fn merge_dedups_and_sorts() {
        let existing = vec![n("b", 20, false), n("a", 10, false)];
        let incoming = vec![n("c", 5, false), n("b", 20, false), n("a", 10, false), n("d", 30, false)];

        let merged = merge_notifications(&existing, incoming);
        let ids: Vec<&str> = merged.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d"]);

        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), merged.len());
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn read_flag_only_moves_forward() {
        let existing = vec![n("a", 1, true), n("b", 2, false)];
        let incoming = vec![n("a", 1, false), n("b", 2, true)];
        let merged = merge_notifications(&existing, incoming);
        assert!(merged.iter().all(|x| x.read));
        assert_eq!(unread_count(&merged), 0);
    }

    #[test]
    fn equal_timestamps_order_by_id() {
        let merged = merge_notifications(&[], vec![n("z", 7, false), n("m", 7, false)]);
        let ids: Vec<&str> = merged.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z"]);
    }

    #[test]
    fn empty_inputs() {
        assert!(merge_notifications(&[], Vec::new()).is_empty());
    }
}
