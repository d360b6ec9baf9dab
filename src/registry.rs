//! Subscriber table and source registry.
//!
//! The [`Registry`] owns every [`Subscriber`] record.  Each record sits behind
//! its own async mutex: the monitor holds it while processing that subscriber,
//! and front-end operations (`add_source`, `finalize`, `start_subscriber`)
//! take the same lock, so one subscriber never has two writers.  The table
//! lock itself is only held long enough to look up or insert an entry.
//!
//! This is also the API consumed by a chat front end.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::InvalidSource;
use crate::source::FeedSource;
use crate::subscriber::{Subscriber, SubscriberId, SubscriberState};

/// A subscriber record behind its own lock.
pub type SharedSubscriber = Arc<Mutex<Subscriber>>;

/// Outcome of a successful [`Registry::add_source`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddResult {
    Added {
        source_count: usize,
        /// The feed's own title, for the confirmation message.
        feed_title: Option<String>,
    },
    AlreadyExists {
        source_count: usize,
    },
}

/// Outcome of [`Registry::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeResult {
    /// Monitoring has started for these sources.
    Monitoring { sources: Vec<String> },
    /// Nothing to monitor yet; the subscriber keeps collecting sources.
    NoSources,
}

/// Externally visible phase, folding quota exhaustion into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CollectingSources,
    Monitoring,
    QuotaExhausted,
}

/// Point-in-time view of one subscriber, as shown to the end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberStatus {
    pub source_count: usize,
    pub delivered_count: u32,
    /// Deliveries left before the quota is reached.
    pub remaining: u32,
    pub state: Phase,
    pub created_at: DateTime<Utc>,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

/// Table-wide counts, logged after every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySummary {
    pub subscribers: usize,
    /// Subscribers that have not used up their quota.
    pub active: usize,
}

/// Owns every subscriber and validates new sources against the live feed.
pub struct Registry {
    subscribers: RwLock<BTreeMap<SubscriberId, SharedSubscriber>>,
    source: Arc<dyn FeedSource>,
    quota_limit: u32,
    fetch_timeout: Duration,
}

impl Registry {
    /// `source` is used for the liveness probe, bounded by `fetch_timeout`.
    pub fn new(source: Arc<dyn FeedSource>, quota_limit: u32, fetch_timeout: Duration) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            source,
            quota_limit,
            fetch_timeout,
        }
    }

    /// Lifetime deliveries allowed per subscriber.
    pub fn quota_limit(&self) -> u32 {
        self.quota_limit
    }

    /// Create the subscriber, or restart an existing one from scratch.
    pub async fn start_subscriber(&self, id: SubscriberId) {
        let entry = self.entry(id).await;
        let mut subscriber = entry.lock().await;
        *subscriber = Subscriber::new(id);
        info!(subscriber = %id, "subscriber (re)initialized");
    }

    /// Register a feed URL for a subscriber.
    ///
    /// The URL must be an absolute http(s) URL whose feed currently returns
    /// at least one item.  A URL already registered is reported as
    /// [`AddResult::AlreadyExists`] without probing the feed again.
    pub async fn add_source(
        &self,
        id: SubscriberId,
        url: &str,
    ) -> Result<AddResult, InvalidSource> {
        validate_url(url)?;

        let entry = self.entry(id).await;
        {
            let subscriber = entry.lock().await;
            if subscriber.has_source(url) {
                return Ok(AddResult::AlreadyExists {
                    source_count: subscriber.sources().len(),
                });
            }
        }

        // Probe without holding the subscriber lock.
        let feed = tokio::time::timeout(self.fetch_timeout, self.source.fetch(url))
            .await
            .map_err(|_| InvalidSource::Timeout(self.fetch_timeout))?
            .map_err(InvalidSource::Unreachable)?;
        if feed.is_empty() {
            return Err(InvalidSource::EmptyFeed);
        }

        let mut subscriber = entry.lock().await;
        let source_count = subscriber.sources().len();
        if !subscriber.push_source(url) {
            return Ok(AddResult::AlreadyExists { source_count });
        }
        info!(subscriber = %id, source = url, "source added");
        Ok(AddResult::Added {
            source_count: source_count + 1,
            feed_title: feed.title,
        })
    }

    /// Finish source collection and start monitoring.
    pub async fn finalize(&self, id: SubscriberId) -> FinalizeResult {
        let Some(entry) = self.get(id).await else {
            return FinalizeResult::NoSources;
        };
        let mut subscriber = entry.lock().await;
        if subscriber.sources().is_empty() {
            return FinalizeResult::NoSources;
        }
        subscriber.state = SubscriberState::Monitoring;
        info!(
            subscriber = %id,
            sources = subscriber.sources().len(),
            "monitoring started"
        );
        FinalizeResult::Monitoring {
            sources: subscriber.sources().to_vec(),
        }
    }

    /// Current status, or `None` for a subscriber never seen.
    pub async fn status(&self, id: SubscriberId) -> Option<SubscriberStatus> {
        let entry = self.get(id).await?;
        let subscriber = entry.lock().await;
        Some(self.status_of(&subscriber))
    }

    /// Counts over the whole table.  Locks each subscriber in turn.
    pub async fn summary(&self) -> RegistrySummary {
        let snapshot = self.snapshot().await;
        let mut active = 0;
        for (_, entry) in &snapshot {
            if !entry.lock().await.is_exhausted(self.quota_limit) {
                active += 1;
            }
        }
        RegistrySummary {
            subscribers: snapshot.len(),
            active,
        }
    }

    /// All subscribers, ordered by id, detached from the table lock.
    pub async fn snapshot(&self) -> Vec<(SubscriberId, SharedSubscriber)> {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect()
    }

    async fn get(&self, id: SubscriberId) -> Option<SharedSubscriber> {
        self.subscribers.read().await.get(&id).cloned()
    }

    async fn entry(&self, id: SubscriberId) -> SharedSubscriber {
        if let Some(entry) = self.get(id).await {
            return entry;
        }
        let mut table = self.subscribers.write().await;
        Arc::clone(table.entry(id).or_insert_with(|| {
            debug!(subscriber = %id, "new subscriber");
            Arc::new(Mutex::new(Subscriber::new(id)))
        }))
    }

    fn status_of(&self, subscriber: &Subscriber) -> SubscriberStatus {
        let state = match subscriber.state {
            SubscriberState::CollectingSources => Phase::CollectingSources,
            SubscriberState::Monitoring if subscriber.is_exhausted(self.quota_limit) => {
                Phase::QuotaExhausted
            }
            SubscriberState::Monitoring => Phase::Monitoring,
        };
        SubscriberStatus {
            source_count: subscriber.sources().len(),
            delivered_count: subscriber.delivered_count(),
            remaining: subscriber.remaining(self.quota_limit),
            state,
            created_at: subscriber.created_at,
            last_delivery_at: subscriber.last_delivery_at,
        }
    }
}

/// Check that `url` is an absolute http(s) URL with a host.
pub fn validate_url(url: &str) -> Result<(), InvalidSource> {
    let parsed = url::Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(InvalidSource::UnsupportedScheme(scheme.to_string())),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(InvalidSource::MissingHost);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
