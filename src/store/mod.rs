/*!
 * Store client boundary
 *
 * Everything the mirror knows about the underlying time-series store lives
 * behind [`StoreClient`]: reachability probing, watermark discovery, delta
 * queries, and batch writes. The production implementation speaks the
 * store's HTTP API; tests substitute scripted fakes.
 */

pub mod csv;
pub mod http;
pub mod line;
pub mod point;

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use http::HttpStoreClient;
pub use point::{DataPoint, FieldValue};

/// One store endpoint: URL, organization, and API token.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub url: String,
    pub org: String,
    pub token: String,
}

impl StoreTarget {
    pub fn new(url: impl Into<String>, org: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            org: org.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for StoreTarget {
    // Tokens are credentials; keep them out of logs and panics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTarget")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Transport-level store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request never completed (connect, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(String),

    /// Request completed with a non-success status
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded
    #[error("malformed query response: {0}")]
    Decode(String),
}

/// Query/write capability of a time-series store.
///
/// `ping` deliberately returns `bool` rather than a `Result`: an unreachable
/// remote is the expected steady state of the link this tool exists for, not
/// an error to propagate.
pub trait StoreClient {
    /// Probe whether the target's service answers at all
    fn ping(&self, target: &StoreTarget) -> bool;

    /// Timestamp of the most recent point stored for a series, if any
    fn latest_timestamp(
        &self,
        target: &StoreTarget,
        series: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// All points of a series with timestamp strictly greater than `since`
    fn query_after(
        &self,
        target: &StoreTarget,
        series: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StoreError>;

    /// Write a batch of points to a series in one call
    fn write(
        &self,
        target: &StoreTarget,
        series: &str,
        points: &[DataPoint],
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let target = StoreTarget::new("http://127.0.0.1:8086", "edge", "super-secret");
        let debug = format!("{:?}", target);
        assert!(debug.contains("http://127.0.0.1:8086"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Status {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("unauthorized"));

        let err = StoreError::Transport("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
