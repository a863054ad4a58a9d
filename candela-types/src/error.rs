use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the candela workspace.
///
/// Covers upstream connector failures (transient or not), storage problems for a
/// single series, argument validation, not-found conditions at the publication
/// boundary, and the process-level lock.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CandelaError {
    /// Issues with the returned or expected data (unparseable rows, ordering violations).
    #[error("data issue: {0}")]
    Data(String),

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// An exchange client returned an error.
    #[error("{connector} failed: {msg}")]
    Connector {
        /// Connector name that failed.
        connector: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A resource or symbol could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of missing resource, e.g. "series btc1h.csv".
        what: String,
    },

    /// Reading or writing one series failed.
    #[error("storage error on {series}: {msg}")]
    Storage {
        /// Series file name the operation targeted.
        series: String,
        /// Human-readable error message.
        msg: String,
    },

    /// An individual exchange request exceeded the configured timeout.
    #[error("provider timed out: {connector}")]
    ProviderTimeout {
        /// Connector name that timed out.
        connector: String,
    },

    /// The upstream rejected the request because of its rate limit.
    #[error("rate limit exceeded: limit={limit} window_ms={window_ms}")]
    RateLimitExceeded {
        /// Allowed number of requests in the window, when known (0 otherwise).
        limit: u64,
        /// Window length in milliseconds (or the upstream's retry-after hint).
        window_ms: u64,
    },

    /// The client-side quota budget for the current window is exhausted.
    #[error("quota exceeded: remaining={remaining} reset_in_ms={reset_in_ms}")]
    QuotaExceeded {
        /// Remaining units at the time of rejection.
        remaining: u64,
        /// Milliseconds until the quota window resets.
        reset_in_ms: u64,
    },

    /// Another process holds the data directory lock.
    #[error("data directory is locked by another process: {path}")]
    Locked {
        /// Lock file path.
        path: String,
    },

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl CandelaError {
    /// Helper: build a `Connector` error with the connector name and message.
    pub fn connector(connector: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connector {
            connector: connector.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `Storage` error for a series file.
    pub fn storage(series: impl Into<String>, msg: impl ToString) -> Self {
        Self::Storage {
            series: series.into(),
            msg: msg.to_string(),
        }
    }

    /// Helper: build a `ProviderTimeout` error.
    pub fn provider_timeout(connector: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            connector: connector.into(),
        }
    }

    /// Returns true if retrying the same request later may succeed.
    ///
    /// Network failures, timeouts and rate/quota rejections are transient. Bad
    /// arguments, missing resources, malformed data and storage errors are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connector { .. }
                | Self::ProviderTimeout { .. }
                | Self::RateLimitExceeded { .. }
                | Self::QuotaExceeded { .. }
        )
    }
}
