use secrecy::SecretString;
use thiserror::Error;

/// Why the provider refused to authenticate us.
///
/// Decoded once from the `{"error": {"code": "..."}}` payload so callers
/// branch on a closed set of kinds instead of raw provider codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Too many concurrent sessions are open on the account (`ACCSESSEXC`).
    /// Neviweb frees them after roughly ten minutes.
    #[error("too many sessions open on the Neviweb account, retry in about 10 minutes")]
    TooManySessions,

    /// Too many failed attempts, the account is locked
    /// (`USRLOCKED`, `USRMAXLOGRETRY`).
    #[error("account locked after too many failed authentication attempts")]
    AccountLocked,

    /// The session is gone (`USRSESSEXP`, failed renewal, or logged out).
    /// A fresh login is required.
    #[error("session expired -- login required")]
    SessionExpired,

    /// Any other refusal. `code` is the raw provider code when one was sent.
    #[error("authentication refused ({})", code.as_deref().unwrap_or("no error code"))]
    Unknown { code: Option<String> },
}

impl AuthError {
    /// Map a provider error code to its kind.
    pub fn from_code(code: &str) -> Self {
        match code {
            "ACCSESSEXC" => Self::TooManySessions,
            "USRLOCKED" | "USRMAXLOGRETRY" => Self::AccountLocked,
            "USRSESSEXP" => Self::SessionExpired,
            other => Self::Unknown {
                code: Some(other.to_owned()),
            },
        }
    }

    /// The raw provider code, when this kind was decoded from an unknown one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Unknown { code } => code.as_deref(),
            _ => None,
        }
    }
}

/// Username/password pair for the Neviweb login endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}
