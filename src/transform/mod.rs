//! Turning candidate items into post text.
//!
//! [`ContentTransformer`] is the pluggable rewrite step (see [`openai`] for
//! the shipped implementation).  [`Renderer`] wraps it with a timeout and a
//! deterministic plain-text fallback, so rendering itself never fails.

pub mod openai;

pub use openai::OpenAiTransformer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::source::CandidateItem;

/// Rewrites an item into publishable text.
#[async_trait]
pub trait ContentTransformer: Send + Sync {
    async fn rewrite(&self, item: &CandidateItem) -> Result<String, TransformError>;
}

/// Renders post text, falling back to a plain template whenever the
/// transformer is missing, fails, times out or returns nothing.
///
/// Every rendered post contains the item's permalink exactly once.
#[derive(Clone)]
pub struct Renderer {
    transformer: Option<Arc<dyn ContentTransformer>>,
    timeout: Duration,
}

impl Renderer {
    pub fn new(transformer: Arc<dyn ContentTransformer>, timeout: Duration) -> Self {
        Self {
            transformer: Some(transformer),
            timeout,
        }
    }

    /// A renderer that always uses the plain template.
    pub fn plain() -> Self {
        Self {
            transformer: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn render(&self, item: &CandidateItem) -> String {
        let Some(transformer) = &self.transformer else {
            return fallback_post(item);
        };

        let result = match tokio::time::timeout(self.timeout, transformer.rewrite(item)).await {
            Ok(result) => result,
            Err(_) => Err(TransformError::Timeout(self.timeout)),
        };

        match result {
            Ok(text) if !text.trim().is_empty() => {
                debug!(permalink = %item.permalink, "item rewritten");
                ensure_permalink_once(text.trim(), &item.permalink)
            }
            Ok(_) => {
                warn!(permalink = %item.permalink, "transformer returned nothing; using plain template");
                fallback_post(item)
            }
            Err(e) => {
                warn!(permalink = %item.permalink, error = %e, "using plain template");
                fallback_post(item)
            }
        }
    }
}

/// The plain template: title, summary and a source line.
pub fn fallback_post(item: &CandidateItem) -> String {
    let title = strip_permalink(&item.title, &item.permalink);
    let summary = strip_permalink(&item.summary, &item.permalink);
    if item.permalink.is_empty() {
        return format!("{title}\n\n{summary}");
    }
    format!("{title}\n\n{summary}\n\nSource: {}", item.permalink)
}

/// Make `permalink` appear in `text` exactly once: append a source line if
/// it is missing, drop any repeats after the first.
///
/// Only whole occurrences count, so a longer URL that merely starts with the
/// permalink (`<permalink>/comments`) is left untouched.
pub fn ensure_permalink_once(text: &str, permalink: &str) -> String {
    if permalink.is_empty() {
        return text.to_string();
    }
    if whole_occurrences(text, permalink).next().is_none() {
        return format!("{text}\n\nSource: {permalink}");
    }
    remove_occurrences(text, permalink, 1)
}

fn strip_permalink(text: &str, permalink: &str) -> String {
    if permalink.is_empty() {
        return text.trim().to_string();
    }
    remove_occurrences(text, permalink, 0).trim().to_string()
}

/// Byte offsets of every occurrence of `permalink` that ends at a word
/// boundary (end of text or whitespace, optionally after closing punctuation).
fn whole_occurrences<'a>(text: &'a str, permalink: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.match_indices(permalink)
        .map(|(start, _)| start)
        .filter(move |&start| ends_at_boundary(&text[start + permalink.len()..]))
}

fn ends_at_boundary(rest: &str) -> bool {
    let rest = rest.trim_start_matches(|c: char| {
        matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '>' | '"' | '\'')
    });
    rest.chars().next().map_or(true, char::is_whitespace)
}

/// Remove whole occurrences of `permalink`, keeping the first `keep`.
fn remove_occurrences(text: &str, permalink: &str, keep: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for start in whole_occurrences(text, permalink).skip(keep) {
        out.push_str(&text[copied..start]);
        copied = start + permalink.len();
    }
    out.push_str(&text[copied..]);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
