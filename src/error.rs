//! Error taxonomy for the relay engine.
//!
//! Each collaborator boundary has its own error type so the monitor can decide
//! at which scope a failure is contained:
//!
//! | Error             | Scope        | Handling                                 |
//! |-------------------|--------------|------------------------------------------|
//! | [`InvalidSource`] | caller       | returned from `add_source`               |
//! | [`FetchError`]    | one source   | logged, source retried next cycle        |
//! | [`TransformError`]| one item     | absorbed by the renderer's fallback      |
//! | [`DeliveryError`] | one message  | logged, item stays pending for retry     |
//! | [`SubscriberError`]| subscriber  | logged, other subscribers still processed|
//!
//! Quota exhaustion is not an error; see [`crate::gate::Admission`].

use std::time::Duration;

use thiserror::Error;

/// A feed could not be polled.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, connection reset, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The fetch did not complete within the configured bound.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// A URL was rejected by the source registry.
#[derive(Debug, Error)]
pub enum InvalidSource {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("feed is unreachable: {0}")]
    Unreachable(#[source] FetchError),

    #[error("feed has no items")]
    EmptyFeed,

    /// The liveness probe did not finish within the fetch timeout.
    #[error("feed did not respond within {0:?}")]
    Timeout(Duration),
}

/// The content transformer failed; always resolved through the fallback.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transformer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transformer returned an empty response")]
    EmptyResponse,

    #[error("transform timed out after {0:?}")]
    Timeout(Duration),
}

/// A single message could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The delivery API rejected the message.
    #[error("delivery API error: {0}")]
    Api(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure scoped to one subscriber during a cycle.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("corrupt subscriber state: {0}")]
    CorruptState(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_source_wraps_fetch_error() {
        let err = InvalidSource::Unreachable(FetchError::Status(404));
        assert_eq!(err.to_string(), "feed is unreachable: HTTP status 404");
    }

    #[test]
    fn liveness_timeout_display() {
        let err = InvalidSource::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "feed did not respond within 1.5s");
    }

    #[test]
    fn url_parse_error_converts() {
        let err: InvalidSource = url::Url::parse("not a url").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid URL"));
    }

    #[test]
    fn timeout_display_includes_duration() {
        let err = DeliveryError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "delivery timed out after 10s");
    }
}
