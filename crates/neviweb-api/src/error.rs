use thiserror::Error;

use crate::auth::AuthError;

/// Top-level error type for the `neviweb-api` crate.
///
/// Covers every failure mode of the session and request layers:
/// authentication, transport, provider rejections, and lock waits.
/// `neviweb-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login, renewal, or session validity failure, decoded from the
    /// provider's error code.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A token could not be encoded as an HTTP header value.
    #[error("Invalid value for header {name}")]
    InvalidHeader { name: &'static str },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Provider ────────────────────────────────────────────────────
    /// The provider answered, but refused the request. Carries the raw
    /// payload so callers can interpret it.
    #[error("Request rejected by Neviweb (HTTP {status}): {payload}")]
    Rejected {
        status: u16,
        code: Option<String>,
        payload: String,
    },

    // ── Concurrency ─────────────────────────────────────────────────
    /// A bounded wait on a shared lock ran out.
    #[error("Timed out after {waited_ms}ms waiting for {resource}")]
    LockTimeout {
        resource: &'static str,
        waited_ms: u64,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the session is gone and only a fresh login helps.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Auth(AuthError::SessionExpired))
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::LockTimeout { .. } => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Extract the provider error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => code.as_deref(),
            Self::Auth(auth) => auth.code(),
            _ => None,
        }
    }
}
