//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use neviweb_config::ConfigError;
use neviweb_core::CoreError;
use neviweb_api::AuthError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const BUSY: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Neviweb at {url}")]
    #[diagnostic(
        code(neviweb::connection_failed),
        help(
            "Check your network connection and the API URL.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {reason}")]
    #[diagnostic(
        code(neviweb::auth_failed),
        help(
            "Verify your e-mail and password.\n\
             Run: neviweb config set-password"
        )
    )]
    AuthFailed { reason: String },

    #[error("Too many sessions are open on this Neviweb account")]
    #[diagnostic(
        code(neviweb::too_many_sessions),
        help(
            "Neviweb limits concurrent sessions per account. Close other apps\n\
             using the account or wait about 10 minutes, then retry."
        )
    )]
    TooManySessions,

    #[error("The Neviweb account is locked")]
    #[diagnostic(
        code(neviweb::account_locked),
        help("Too many failed logins. Unlock the account from the Neviweb website.")
    )]
    AccountLocked,

    #[error("Session expired")]
    #[diagnostic(
        code(neviweb::session_expired),
        help("The session could not be renewed. Run the command again to log in.")
    )]
    SessionExpired,

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(neviweb::no_credentials),
        help(
            "Configure credentials with: neviweb config init\n\
             Or set NEVIWEB_USERNAME and NEVIWEB_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(neviweb::not_found),
        help("Run: neviweb {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Device {device_id} is a {actual}, not a {expected}")]
    #[diagnostic(
        code(neviweb::wrong_device_type),
        help("Run: neviweb devices list --family {expected}")
    )]
    WrongDeviceType {
        device_id: i64,
        expected: String,
        actual: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Neviweb error ({code}): {message}")]
    #[diagnostic(code(neviweb::api_error))]
    ApiError { code: String, message: String },

    // ── Flow control ─────────────────────────────────────────────────
    #[error("Too many writes in flight ({pending} outstanding)")]
    #[diagnostic(
        code(neviweb::busy),
        help("Wait for pending changes to finish, then retry.")
    )]
    Busy { pending: usize },

    #[error("Timed out: {detail}")]
    #[diagnostic(
        code(neviweb::timeout),
        help("Increase timeout with --timeout or retry later.")
    )]
    Timeout { detail: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(neviweb::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(neviweb::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: neviweb config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(neviweb::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. }
            | Self::TooManySessions
            | Self::AccountLocked
            | Self::SessionExpired
            | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Busy { .. } => exit_code::BUSY,
            Self::Validation { .. } | Self::WrongDeviceType { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<AuthError> for CliError {
    fn from(reason: AuthError) -> Self {
        match reason {
            AuthError::TooManySessions => CliError::TooManySessions,
            AuthError::AccountLocked => CliError::AccountLocked,
            AuthError::SessionExpired => CliError::SessionExpired,
            other @ AuthError::Unknown { .. } => CliError::AuthFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }

            CoreError::AuthenticationFailed { reason } => reason.into(),

            CoreError::SessionExpired => CliError::SessionExpired,

            CoreError::Timeout => CliError::Timeout {
                detail: "no response from Neviweb".into(),
            },

            CoreError::LockTimeout {
                resource,
                waited_ms,
            } => CliError::Timeout {
                detail: format!("waited {waited_ms}ms for {resource}"),
            },

            CoreError::Busy { pending } => CliError::Busy { pending },

            CoreError::DeviceNotFound { device_id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device_id.to_string(),
                list_command: "devices list".into(),
            },

            CoreError::FamilyMismatch {
                device_id,
                expected,
                actual,
            } => CliError::WrongDeviceType {
                device_id,
                expected: expected.to_string(),
                actual: actual.to_string(),
            },

            CoreError::UnsupportedDevice { device_id, sku } => CliError::Validation {
                field: "device".into(),
                reason: format!("device {device_id} (SKU {sku}) is not supported"),
            },

            CoreError::RefreshFailed { source, .. } => from_refresh_failure(&source),

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Api { message, code, .. } => CliError::ApiError {
                code: code.unwrap_or_else(|| "unknown".into()),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

/// A failed read carries the transport error shared by all its waiters.
fn from_refresh_failure(source: &neviweb_api::Error) -> CliError {
    match source {
        neviweb_api::Error::Auth(reason) => reason.clone().into(),
        neviweb_api::Error::Transport(e) if e.is_timeout() => CliError::Timeout {
            detail: e.to_string(),
        },
        neviweb_api::Error::Transport(e) => CliError::ConnectionFailed {
            url: e.url().map_or_else(|| "(unknown)".into(), ToString::to_string),
            reason: e.to_string(),
        },
        neviweb_api::Error::LockTimeout { .. } => CliError::Timeout {
            detail: source.to_string(),
        },
        other => CliError::ApiError {
            code: other.api_error_code().unwrap_or("unknown").to_owned(),
            message: other.to_string(),
        },
    }
}
