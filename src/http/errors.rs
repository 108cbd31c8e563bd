//! Error types for the EvaluationKit HTTP client.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// No response headers within the request deadline, or the body went
    /// quiet for longer than the idle limit.
    #[error("timed out after {after:?} waiting on {url}")]
    Timeout { url: String, after: Duration },
    #[error("invalid URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("redirect from {url} has no usable Location header")]
    BadRedirect { url: String },
    #[error("gave up after {hops} redirects, last at {url}")]
    TooManyRedirects { url: String, hops: usize },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Connection failures, timeouts, interrupted bodies, 5xx and 429 are
    /// transient; every other status (and any redirect problem) is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Transport { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_body()
            }
            Self::Timeout { .. } => true,
            Self::InvalidUrl { .. } | Self::BadRedirect { .. } | Self::TooManyRedirects { .. } => {
                false
            }
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
