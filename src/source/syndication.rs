//! HTTP feed source for RSS 2.0 and Atom.
//!
//! The body is parsed as RSS first and as Atom second.  A body that is
//! neither is logged and reported as an empty [`Feed`], never as an error.
//!
//! Parsing is done by pure functions ([`HttpFeedSource::parse_channel`],
//! [`HttpFeedSource::parse_atom`]) so tests can exercise it without the
//! network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{CandidateItem, Feed, FeedSource};
use crate::error::FetchError;

/// User agent sent with every feed request.
const USER_AGENT: &str = concat!("feed-relay/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Polls feeds over HTTP(S).
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    /// Create a source whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Parse a body as RSS, then Atom; anything else is an empty feed.
    pub fn parse_body(body: &[u8]) -> Feed {
        match ::rss::Channel::read_from(body) {
            Ok(channel) => return Self::parse_channel(&channel),
            Err(rss_err) => debug!(error = %rss_err, "body is not RSS, trying Atom"),
        }
        match atom_syndication::Feed::read_from(body) {
            Ok(feed) => Self::parse_atom(&feed),
            Err(atom_err) => {
                warn!(error = %atom_err, "feed body is neither RSS nor Atom");
                Feed::default()
            }
        }
    }

    /// Convert an RSS channel into a [`Feed`].
    pub fn parse_channel(channel: &::rss::Channel) -> Feed {
        let items = channel
            .items()
            .iter()
            .map(|item| {
                // Prefer <link>; a guid only counts when it is a permalink.
                let permalink = item
                    .link()
                    .map(String::from)
                    .or_else(|| {
                        item.guid()
                            .filter(|g| g.is_permalink())
                            .map(|g| g.value().to_string())
                    })
                    .unwrap_or_default();

                CandidateItem {
                    title: item.title().unwrap_or_default().trim().to_string(),
                    summary: item.description().unwrap_or_default().trim().to_string(),
                    permalink: permalink.trim().to_string(),
                }
            })
            .collect();

        Feed::new(non_empty(channel.title()), items)
    }

    /// Convert an Atom feed into a [`Feed`].
    pub fn parse_atom(feed: &atom_syndication::Feed) -> Feed {
        let items = feed
            .entries()
            .iter()
            .map(|entry| {
                let permalink = entry
                    .links()
                    .iter()
                    .find(|link| link.rel() == "alternate")
                    .or_else(|| entry.links().first())
                    .map(|link| link.href().trim().to_string())
                    .unwrap_or_default();

                let summary = entry
                    .summary()
                    .map(|s| s.as_str().to_string())
                    .or_else(|| entry.content().and_then(|c| c.value().map(String::from)))
                    .unwrap_or_default();

                CandidateItem {
                    title: entry.title().as_str().trim().to_string(),
                    summary: summary.trim().to_string(),
                    permalink,
                }
            })
            .collect();

        Feed::new(non_empty(feed.title().as_str()), items)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let feed = Self::parse_body(&body);
        debug!(source = url, items = feed.items.len(), "fetched feed");
        Ok(feed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
