//! In-memory collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::delivery::DeliveryChannel;
use crate::error::{DeliveryError, FetchError, TransformError};
use crate::source::{CandidateItem, Feed, FeedSource};
use crate::subscriber::SubscriberId;
use crate::transform::ContentTransformer;

/// A feed titled "Stub" whose items have the given permalinks, in order.
pub fn feed_of(permalinks: &[&str]) -> Feed {
    let items = permalinks
        .iter()
        .map(|p| CandidateItem::new(format!("Title {p}"), format!("Summary {p}"), *p))
        .collect();
    Feed::new(Some("Stub".to_string()), items)
}

enum StubFeed {
    Ok(Feed),
    Failing,
}

#[derive(Default)]
pub struct StubFeedSource {
    feeds: Mutex<HashMap<String, StubFeed>>,
    fetches: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

impl StubFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed(&self, url: &str, feed: Feed) {
        self.feeds.lock().unwrap().insert(url.to_string(), StubFeed::Ok(feed));
    }

    pub fn set_failing(&self, url: &str) {
        self.feeds.lock().unwrap().insert(url.to_string(), StubFeed::Failing);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FeedSource for StubFeedSource {
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.feeds.lock().unwrap().get(url) {
            Some(StubFeed::Ok(feed)) => Ok(feed.clone()),
            Some(StubFeed::Failing) => Err(FetchError::Status(500)),
            None => Err(FetchError::Status(404)),
        }
    }
}

pub struct StubTransformer {
    reply: Option<String>,
    delay: Duration,
}

impl StubTransformer {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ContentTransformer for StubTransformer {
    async fn rewrite(&self, _item: &CandidateItem) -> Result<String, TransformError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().ok_or(TransformError::Status {
            status: 500,
            body: "stub failure".to_string(),
        })
    }
}

/// Records every delivered message; can be told to fail or panic for a
/// subscriber.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(SubscriberId, String)>>,
    failing: Mutex<HashSet<SubscriberId>>,
    failing_text: Mutex<Option<String>>,
    panicking: Mutex<HashSet<SubscriberId>>,
    delay: Mutex<Duration>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, id: SubscriberId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn recover(&self, id: SubscriberId) {
        self.failing.lock().unwrap().remove(&id);
        *self.failing_text.lock().unwrap() = None;
    }

    /// Reject every message containing `needle`, for any subscriber.
    pub fn fail_containing(&self, needle: &str) {
        *self.failing_text.lock().unwrap() = Some(needle.to_string());
    }

    /// Hold every send for `delay` before recording it.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn panic_for(&self, id: SubscriberId) {
        self.panicking.lock().unwrap().insert(id);
    }

    pub fn sent_to(&self, id: SubscriberId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send(&self, to: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.panicking.lock().unwrap().contains(&to) {
            panic!("delivery channel blew up for {to}");
        }
        if self.failing.lock().unwrap().contains(&to) {
            return Err(DeliveryError::Api("stub failure".to_string()));
        }
        let text_fails = self
            .failing_text
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| text.contains(needle));
        if text_fails {
            return Err(DeliveryError::Api("stub failure".to_string()));
        }
        self.sent.lock().unwrap().push((to, text.to_string()));
        Ok(())
    }
}
