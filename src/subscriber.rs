//! The per-subscriber record.
//!
//! Everything the engine knows about one end user lives in a single
//! [`Subscriber`]: lifecycle state, registered sources and delivery history.
//! The only way to record a delivery is [`Subscriber::record_delivery`],
//! which keeps `delivered_count` and `seen_items` in step.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SubscriberError;

/// Opaque, stable identity of an end user (a chat id for Telegram delivery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubscriberId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle state.  `CollectingSources -> Monitoring` on finalize; only
/// re-initialization goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    CollectingSources,
    Monitoring,
}

/// One end user's state.  Counters change only through
/// [`record_delivery`](Self::record_delivery).
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub state: SubscriberState,
    /// Feed URLs in registration order, unique by exact string.
    sources: Vec<String>,
    /// Permalinks already delivered.
    seen_items: HashSet<String>,
    delivered_count: u32,
    /// Whether the quota-exhaustion notice has been delivered.
    pub notice_sent: bool,
    pub created_at: DateTime<Utc>,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// A fresh record collecting sources, with no delivery history.
    pub fn new(id: SubscriberId) -> Self {
        Self {
            id,
            state: SubscriberState::CollectingSources,
            sources: Vec::new(),
            seen_items: HashSet::new(),
            delivered_count: 0,
            notice_sent: false,
            created_at: Utc::now(),
            last_delivery_at: None,
        }
    }

    /// Registered feed URLs in registration order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn has_source(&self, url: &str) -> bool {
        self.sources.iter().any(|s| s == url)
    }

    /// Append `url` unless it is already registered.  Returns whether it was
    /// added.
    pub fn push_source(&mut self, url: &str) -> bool {
        if self.has_source(url) {
            return false;
        }
        self.sources.push(url.to_string());
        true
    }

    /// Lifetime number of confirmed deliveries.
    pub fn delivered_count(&self) -> u32 {
        self.delivered_count
    }

    /// Whether `permalink` has already been delivered.
    pub fn has_seen(&self, permalink: &str) -> bool {
        self.seen_items.contains(permalink)
    }

    pub fn is_monitoring(&self) -> bool {
        self.state == SubscriberState::Monitoring
    }

    /// Whether the quota has been reached.
    pub fn is_exhausted(&self, quota_limit: u32) -> bool {
        self.delivered_count >= quota_limit
    }

    pub fn remaining(&self, quota_limit: u32) -> u32 {
        quota_limit.saturating_sub(self.delivered_count)
    }

    /// Record one confirmed delivery.
    ///
    /// Returns `false` (and changes nothing) when the permalink was already
    /// recorded, so a delivery can never be counted twice.
    pub fn record_delivery(&mut self, permalink: &str) -> bool {
        if !self.seen_items.insert(permalink.to_string()) {
            return false;
        }
        self.delivered_count += 1;
        self.last_delivery_at = Some(Utc::now());
        true
    }

    /// Check the record's invariants before a cycle touches it.
    pub fn check_invariants(&self) -> Result<(), SubscriberError> {
        if self.delivered_count as usize != self.seen_items.len() {
            return Err(SubscriberError::CorruptState(format!(
                "delivered_count {} does not match {} seen items",
                self.delivered_count,
                self.seen_items.len()
            )));
        }
        let unique: HashSet<&String> = self.sources.iter().collect();
        if unique.len() != self.sources.len() {
            return Err(SubscriberError::CorruptState(
                "duplicate source registered".to_string(),
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn corrupt_for_test(&mut self) {
        self.delivered_count += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_subscriber_collects_sources() {
        let sub = Subscriber::new(SubscriberId(1));
        assert_eq!(sub.state, SubscriberState::CollectingSources);
        assert!(sub.sources().is_empty());
        assert_eq!(sub.delivered_count(), 0);
        assert!(!sub.notice_sent);
        assert!(sub.last_delivery_at.is_none());
    }

    #[test]
    fn push_source_rejects_exact_duplicates_only() {
        let mut sub = Subscriber::new(SubscriberId(1));
        assert!(sub.push_source("https://example.com/feed"));
        assert!(!sub.push_source("https://example.com/feed"));
        assert!(sub.push_source("https://example.com/FEED"), "comparison is case-sensitive");
        assert_eq!(sub.sources().len(), 2);
    }

    #[test]
    fn record_delivery_keeps_count_and_seen_in_step() {
        let mut sub = Subscriber::new(SubscriberId(1));
        assert!(sub.record_delivery("https://example.com/a"));
        assert!(!sub.record_delivery("https://example.com/a"));
        assert!(sub.record_delivery("https://example.com/b"));

        assert_eq!(sub.delivered_count(), 2);
        assert!(sub.has_seen("https://example.com/a"));
        assert!(sub.last_delivery_at.is_some());
        sub.check_invariants().unwrap();
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let mut sub = Subscriber::new(SubscriberId(1));
        sub.record_delivery("a");
        sub.record_delivery("b");
        assert_eq!(sub.remaining(1), 0);
        assert!(sub.is_exhausted(2));
        assert!(!sub.is_exhausted(3));
    }

    #[test]
    fn check_invariants_detects_count_drift() {
        let mut sub = Subscriber::new(SubscriberId(1));
        sub.corrupt_for_test();
        assert!(matches!(
            sub.check_invariants(),
            Err(SubscriberError::CorruptState(_))
        ));
    }

    #[test]
    fn id_displays_as_number() {
        assert_eq!(SubscriberId(-100123).to_string(), "-100123");
    }
}
