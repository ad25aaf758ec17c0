// ── Core error types ──
//
// User-facing errors from neviweb-core. Consumers branch on these kinds
// instead of raw HTTP statuses or provider payloads. The
// `From<neviweb_api::Error>` impl translates transport-layer errors into
// domain variants.

use std::sync::Arc;

use neviweb_api::AuthError;
use thiserror::Error;

use crate::model::DeviceFamily;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Neviweb at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: AuthError },

    /// No usable session. A fresh login is needed before anything else
    /// reaches the provider.
    #[error("Session expired -- login required")]
    SessionExpired,

    #[error("Request timed out")]
    Timeout,

    // ── Concurrency errors ───────────────────────────────────────────
    #[error("Timed out after {waited_ms}ms waiting for {resource}")]
    LockTimeout { resource: String, waited_ms: u64 },

    #[error("Write queue is full ({pending} writes outstanding)")]
    Busy { pending: usize },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: i64 },

    #[error("Device {device_id} is a {actual}, not a {expected}")]
    FamilyMismatch {
        device_id: i64,
        expected: DeviceFamily,
        actual: DeviceFamily,
    },

    #[error("Unsupported device {device_id} (SKU {sku})")]
    UnsupportedDevice { device_id: i64, sku: String },

    /// Refreshing a device's state failed. Every caller that waited on the
    /// same refresh receives the same `source`.
    #[error("Refreshing device {device_id} failed: {source}")]
    RefreshFailed {
        device_id: i64,
        source: Arc<neviweb_api::Error>,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Provider error code (e.g. "DVCCOMMTO"), when one was sent.
        code: Option<String>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for errors that say nothing about the device, only that
    /// the session must be re-established.
    pub fn is_session_error(&self) -> bool {
        match self {
            Self::SessionExpired => true,
            Self::RefreshFailed { source, .. } => {
                source.is_session_expired() || is_expired_code(source.api_error_code())
            }
            _ => false,
        }
    }
}

fn is_expired_code(code: Option<&str>) -> bool {
    code == Some("USRSESSEXP")
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<neviweb_api::Error> for CoreError {
    fn from(err: neviweb_api::Error) -> Self {
        match err {
            neviweb_api::Error::Auth(AuthError::SessionExpired) => CoreError::SessionExpired,
            neviweb_api::Error::Auth(reason) => CoreError::AuthenticationFailed { reason },
            neviweb_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            neviweb_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            neviweb_api::Error::InvalidHeader { name } => {
                CoreError::Internal(format!("token not encodable as {name} header"))
            }
            neviweb_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            neviweb_api::Error::Rejected { code, .. } if is_expired_code(code.as_deref()) => {
                CoreError::SessionExpired
            }
            neviweb_api::Error::Rejected {
                status,
                code,
                payload,
            } => CoreError::Api {
                message: payload,
                code,
                status: Some(status),
            },
            neviweb_api::Error::LockTimeout {
                resource,
                waited_ms,
            } => CoreError::LockTimeout {
                resource: resource.into(),
                waited_ms,
            },
            neviweb_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Failed to parse Neviweb response: {message}"),
                code: None,
                status: None,
            },
        }
    }
}
