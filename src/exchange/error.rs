//! Error taxonomy for the exchange client boundary.

use thiserror::Error;

/// Errors surfaced by exchange API calls.
///
/// Transient transport failures are retried inside the client and only
/// reach callers after the bounded retry budget is exhausted.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The session token was rejected. The client performs one reactive
    /// re-login; this variant escapes only when that also fails.
    #[error("session expired or invalid")]
    SessionExpired,

    /// Interactive login was rejected by the identity endpoint.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// The exchange rejected the request parameters. Non-retryable for
    /// the same instruction.
    #[error("exchange rejected request ({code}): {message}")]
    Api { code: String, message: String },

    /// Network-level failure after retries.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response that could not be parsed into the typed contract.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ExchangeError {
    /// Whether this error signals a lost session.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ExchangeError::SessionExpired)
    }
}
