//! Listener records and listener sets.
//!
//! A [`ListenerSet`] is the value stored in the coordination store under
//! `listen.<type>.<id>`. It is an ordered list of [`ListenerRecord`]s, one per
//! `(session_id, subscription_id)` pair observing the entity.

use std::collections::HashSet;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One observer's subscription to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRecord {
    /// Transport-assigned session identifier.
    pub session_id: String,
    /// Client-generated token, stable across reconnects of one observer.
    pub subscription_id: String,
    /// Deliver only changed fields instead of the full snapshot.
    pub atomic: bool,
    /// Last time the subscription was (re)issued.
    pub last_seen: DateTime<Utc>,
}

impl ListenerRecord {
    /// Create a record seen at `now`.
    pub fn new(
        session_id: impl Into<String>,
        subscription_id: impl Into<String>,
        atomic: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            subscription_id: subscription_id.into(),
            atomic,
            last_seen: now,
        }
    }

    /// Check whether this record belongs to the given observer.
    pub fn matches(&self, session_id: &str, subscription_id: &str) -> bool {
        self.session_id == session_id && self.subscription_id == subscription_id
    }

    /// Check whether the record was last seen before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen < cutoff
    }
}

/// Ordered collection of listeners for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerSet {
    records: Vec<ListenerRecord>,
}

impl ListenerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a set from its stored JSON form.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Encode the set to its stored JSON form.
    pub fn encode(&self) -> Result<Bytes, Error> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Record a subscribe call.
    ///
    /// Refreshes `last_seen` of the record for `(session_id, subscription_id)`
    /// if it exists, otherwise appends a new record. Returns `true` when a new
    /// record was added. The `atomic` flag of an existing record is kept.
    pub fn touch(
        &mut self,
        session_id: &str,
        subscription_id: &str,
        atomic: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(found) = self
            .records
            .iter_mut()
            .find(|record| record.matches(session_id, subscription_id))
        {
            found.last_seen = now;
            return false;
        }

        self.records
            .push(ListenerRecord::new(session_id, subscription_id, atomic, now));
        true
    }

    /// Remove every record with the given subscription id. Returns how many were removed.
    pub fn remove_subscription(&mut self, subscription_id: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| record.subscription_id != subscription_id);
        before - self.records.len()
    }

    /// Remove every record last seen before `cutoff`. Returns how many were removed.
    pub fn evict_stale(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|record| !record.is_stale(cutoff));
        before - self.records.len()
    }

    /// Records that should receive a delivery: the first record of each session.
    pub fn deliveries(&self) -> impl Iterator<Item = &ListenerRecord> {
        let mut sent = HashSet::new();
        self.records
            .iter()
            .filter(move |record| sent.insert(record.session_id.as_str()))
    }

    /// All records, in insertion order.
    pub fn records(&self) -> &[ListenerRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the set has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_touch_is_idempotent_per_observer() {
        let t0 = now();
        let t1 = t0 + Duration::seconds(5);
        let mut set = ListenerSet::new();

        assert!(set.touch("s1", "sub-a", false, t0));
        assert!(!set.touch("s1", "sub-a", true, t1));

        assert_eq!(set.len(), 1);
        assert_eq!(set.records()[0].last_seen, t1);
        assert!(!set.records()[0].atomic);
    }

    #[test]
    fn test_touch_distinguishes_sessions_and_subscriptions() {
        let t0 = now();
        let mut set = ListenerSet::new();

        set.touch("s1", "sub-a", false, t0);
        set.touch("s1", "sub-b", false, t0);
        set.touch("s2", "sub-a", false, t0);

        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_remove_subscription() {
        let t0 = now();
        let mut set = ListenerSet::new();
        set.touch("s1", "sub-a", false, t0);
        set.touch("s2", "sub-a", false, t0);
        set.touch("s1", "sub-b", true, t0);

        assert_eq!(set.remove_subscription("sub-a"), 2);
        assert_eq!(set.len(), 1);
        assert_eq!(set.records()[0].subscription_id, "sub-b");
        assert_eq!(set.remove_subscription("missing"), 0);
    }

    #[test]
    fn test_evict_stale() {
        let t0 = now();
        let mut set = ListenerSet::new();
        set.touch("s1", "old", false, t0 - Duration::hours(2));
        set.touch("s2", "fresh", false, t0);

        assert_eq!(set.evict_stale(t0 - Duration::hours(1)), 1);
        assert_eq!(set.records()[0].subscription_id, "fresh");
    }

    #[test]
    fn test_deliveries_dedup_by_session() {
        let t0 = now();
        let mut set = ListenerSet::new();
        set.touch("s1", "sub-a", true, t0);
        set.touch("s2", "sub-b", false, t0);
        set.touch("s1", "sub-c", false, t0);

        let delivered: Vec<_> = set
            .deliveries()
            .map(|r| (r.session_id.as_str(), r.atomic))
            .collect();
        assert_eq!(delivered, vec![("s1", true), ("s2", false)]);
    }

    #[test]
    fn test_encode_decode() {
        let mut set = ListenerSet::new();
        set.touch("s1", "sub-a", true, now());

        let bytes = set.encode().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with('['));
        assert!(text.contains("\"subscriptionId\":\"sub-a\""));

        assert_eq!(ListenerSet::decode(&bytes).unwrap(), set);
        assert!(ListenerSet::decode(b"{not json").is_err());
    }
}
