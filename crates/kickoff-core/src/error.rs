use thiserror::Error;

/// Errors surfaced by a `FixtureProvider` and by the cache coordinator.
///
/// Cloneable because one coalesced fetch hands the same outcome to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Fetch timed out after {0}s")]
    Timeout(u64),

    #[error("Fetch task aborted before completing")]
    Aborted,
}

/// Maximum length for provider response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build a decode error from a parse failure and the offending payload.
    pub fn decode(err: impl std::fmt::Display, body: &str) -> Self {
        FetchError::Decode(format!("{}: {}", err, Self::truncate_body(body)))
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout(_) | FetchError::Aborted)
    }
}

/// Errors raised by a `LiveDeltaFeed` subscription.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Live feed disconnected: {0}")]
    Disconnected(String),

    #[error("Unauthorized - live feed rejected the subscription")]
    Unauthorized,
}

impl SubscriptionError {
    /// Unauthorized subscriptions are not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubscriptionError::Disconnected(_))
    }
}
