//! Feed source abstraction layer.
//!
//! This module defines the [`FeedSource`] trait and the common
//! [`CandidateItem`] / [`Feed`] types.  Concrete source implementations live
//! in sub-modules (currently only [`syndication`], covering RSS 2.0 and Atom).
//!
//! ## For contributors: adding a new source
//!
//! 1. Create a new file in this directory (e.g. `json_feed.rs`).
//! 2. Define a struct and implement [`FeedSource`] for it.
//! 3. Add `mod json_feed;` below and re-export your struct in the `pub use`
//!    block.
//! 4. Construct an instance in `main.rs` and hand it to the registry and the
//!    monitor.
//!
//! The registry, gate and monitor are all source-agnostic.

mod feed_item;
mod syndication;

pub use feed_item::{CandidateItem, Feed};
pub use syndication::HttpFeedSource;

use async_trait::async_trait;

use crate::error::FetchError;

/// Trait that every feed source must implement.
///
/// The registry calls [`fetch()`](FeedSource::fetch) once to check that a
/// new source is live; the monitor calls it once per source per cycle.  Both
/// wrap the call in a timeout, but implementations should bound their own
/// network I/O as well.
///
/// A body that cannot be parsed is not an error: implementations return an
/// empty [`Feed`] so that malformed feeds never surface as exceptions across
/// this boundary.  Only transport and HTTP failures are [`FetchError`]s.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Feed, FetchError>;
}
