// Session management
//
// One login session per process. The access token is short-lived; the
// refresh token trades it for a new one via `POST connect`. Renewal is
// serialized behind a single async mutex so a burst of requests that all
// notice the expiry trigger exactly one renewal.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{AuthError, Credentials};
use crate::error::Error;
use crate::models::{AuthResponse, ErrorEnvelope, LoginRequest, LogoutResponse};

/// How long Neviweb honours an access token (9.5 minutes).
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(570);

/// Default bound on waiting for another caller's renewal.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

pub(crate) const SESSION_HEADER: &str = "session-id";
pub(crate) const REFRESH_HEADER: &str = "refreshToken";

const LOGIN_INTERFACE: &str = "neviweb";

/// `iat` values above this are milliseconds since the epoch, not seconds.
const IAT_MILLIS_THRESHOLD: i64 = 100_000_000_000;

// ── Session state ────────────────────────────────────────────────────

struct Session {
    access_token: SecretString,
    issued_at: DateTime<Utc>,
    refresh_token: SecretString,
    connected: bool,
    /// Bumped on every successful login or renewal.
    generation: u64,
}

impl Session {
    fn disconnected(generation: u64) -> Self {
        Self {
            access_token: SecretString::from(String::new()),
            issued_at: DateTime::<Utc>::UNIX_EPOCH,
            refresh_token: SecretString::from(String::new()),
            connected: false,
            generation,
        }
    }
}

/// Tokens returned by a successful login or renewal.
struct Grant {
    access_token: SecretString,
    issued_at: DateTime<Utc>,
    refresh_token: SecretString,
}

/// Non-secret view of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub generation: u64,
}

// ── Manager ──────────────────────────────────────────────────────────

/// Owner of the Neviweb authentication session.
///
/// The session itself never leaves this type; other components only get
/// the access token, already renewed if needed, through
/// [`access_token()`](Self::access_token).
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    token_lifetime: TimeDelta,
    lock_wait: Duration,
    session: RwLock<Session>,
    renewal: Mutex<()>,
}

impl SessionManager {
    /// Create a manager with no session. Call [`login()`](Self::login) next.
    ///
    /// `base_url` must end with `/` so endpoint paths join beneath it.
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            token_lifetime: lifetime_delta(DEFAULT_TOKEN_LIFETIME),
            lock_wait: DEFAULT_LOCK_WAIT,
            session: RwLock::new(Session::disconnected(0)),
            renewal: Mutex::new(()),
        }
    }

    /// Override the access token lifetime.
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime_delta(lifetime);
        self
    }

    /// Override the bound on waiting for a concurrent renewal.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// Whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        self.read().connected
    }

    /// `true` once `now` reaches `issued_at + token_lifetime`, or when there
    /// is no session at all.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let session = self.read();
        !session.connected || self.expired(&session, now)
    }

    /// Bumped on every successful login or renewal. Lets callers tell
    /// whether someone else re-established the session in the meantime.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Snapshot of the current session, if connected.
    pub fn info(&self) -> Option<SessionInfo> {
        let session = self.read();
        session.connected.then(|| self.describe(&session))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Authenticate with username/password.
    ///
    /// `POST login`. On any failure the session is left disconnected and
    /// nothing is stored. Never retries.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, Error> {
        let url = self.endpoint("login")?;
        debug!(username = %credentials.username, "logging in at {url}");

        let body = LoginRequest {
            username: &credentials.username,
            password: credentials.password.expose_secret(),
            interface: LOGIN_INTERFACE,
            stay_connected: 1,
        };

        let outcome = match self.http.post(url).json(&body).send().await {
            Ok(resp) => parse_grant(resp).await,
            Err(e) => Err(Error::Transport(e)),
        };

        match outcome {
            Ok(grant) => {
                let info = self.install(grant);
                info!(generation = info.generation, "logged in to Neviweb");
                Ok(info)
            }
            Err(e) => {
                self.mark_disconnected();
                warn!(error = %e, "login failed");
                Err(e)
            }
        }
    }

    /// Trade the refresh token for a new access token.
    ///
    /// `POST connect` with the `refreshToken` header. Failure is hard: the
    /// session is marked disconnected and callers must log in again.
    ///
    /// The outcome only applies to the session the renewal started from.
    /// If a login or logout replaced it meanwhile, new tokens are dropped
    /// with `SessionExpired` and a failure leaves the newer session alone.
    pub async fn renew(&self) -> Result<SessionInfo, Error> {
        let (refresh_token, started) = {
            let session = self.read();
            if !session.connected {
                return Err(AuthError::SessionExpired.into());
            }
            (session.refresh_token.clone(), session.generation)
        };

        let url = self.endpoint("connect")?;
        debug!("renewing session at {url}");

        let outcome = match secret_header(&refresh_token, REFRESH_HEADER) {
            Ok(value) => match self
                .http
                .post(url)
                .header(REFRESH_HEADER, value)
                .send()
                .await
            {
                Ok(resp) => parse_grant(resp).await,
                Err(e) => Err(Error::Transport(e)),
            },
            Err(e) => Err(e),
        };

        // A login or logout that landed meanwhile owns the session now.
        match outcome {
            Ok(grant) => match self.install_if_current(started, grant) {
                Some(info) => {
                    debug!(generation = info.generation, "session renewed");
                    Ok(info)
                }
                None => {
                    debug!(started, "session replaced during renewal, discarding new tokens");
                    Err(AuthError::SessionExpired.into())
                }
            },
            Err(e) => {
                if self.disconnect_if_current(started) {
                    warn!(error = %e, "session renewal failed, login required");
                } else {
                    debug!(error = %e, started, "stale renewal failed, session already replaced");
                }
                Err(e)
            }
        }
    }

    /// Revoke the session.
    ///
    /// `GET logout`. The local session always ends disconnected, even when
    /// the provider call fails. Logging out without a session is a no-op.
    pub async fn logout(&self) -> Result<(), Error> {
        let tokens = {
            let mut session = self.write();
            let tokens = session
                .connected
                .then(|| (session.access_token.clone(), session.refresh_token.clone()));
            *session = Session::disconnected(session.generation);
            tokens
        };

        let Some((access_token, refresh_token)) = tokens else {
            debug!("logout without an active session");
            return Ok(());
        };

        let url = self.endpoint("logout")?;
        debug!("logging out at {url}");

        let resp = self
            .http
            .get(url)
            .header(SESSION_HEADER, secret_header(&access_token, SESSION_HEADER)?)
            .header(REFRESH_HEADER, secret_header(&refresh_token, REFRESH_HEADER)?)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let parsed: Option<LogoutResponse> = serde_json::from_str(&body).ok();
        if status.is_success() && parsed.is_some_and(|r| r.success) {
            debug!("logout complete");
            Ok(())
        } else {
            Err(Error::Rejected {
                status: status.as_u16(),
                code: error_code(&body),
                payload: body,
            })
        }
    }

    // ── Token access ─────────────────────────────────────────────────

    /// A valid access token, renewing first if the current one expired.
    ///
    /// Fails fast with [`AuthError::SessionExpired`] when disconnected.
    /// When several callers find the token expired at once, exactly one
    /// renews; the rest wait (bounded by the lock wait) and reuse its
    /// outcome.
    pub async fn access_token(&self) -> Result<SecretString, Error> {
        let observed = {
            let session = self.read();
            if !session.connected {
                return Err(AuthError::SessionExpired.into());
            }
            if !self.expired(&session, Utc::now()) {
                return Ok(session.access_token.clone());
            }
            session.generation
        };

        let _guard = tokio::time::timeout(self.lock_wait, self.renewal.lock())
            .await
            .map_err(|_| Error::LockTimeout {
                resource: "session renewal",
                waited_ms: duration_millis(self.lock_wait),
            })?;

        {
            let session = self.read();
            if !session.connected {
                return Err(AuthError::SessionExpired.into());
            }
            if session.generation != observed || !self.expired(&session, Utc::now()) {
                return Ok(session.access_token.clone());
            }
        }

        if self.renew().await.is_ok() {
            return Ok(self.read().access_token.clone());
        }

        // The renewal may have lost to a fresh login.
        let session = self.read();
        if session.connected
            && session.generation != observed
            && !self.expired(&session, Utc::now())
        {
            return Ok(session.access_token.clone());
        }
        Err(AuthError::SessionExpired.into())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(Error::InvalidUrl)
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session
            .issued_at
            .checked_add_signed(self.token_lifetime)
            .is_none_or(|expires| now >= expires)
    }

    fn describe(&self, session: &Session) -> SessionInfo {
        SessionInfo {
            issued_at: session.issued_at,
            expires_at: session.issued_at.checked_add_signed(self.token_lifetime),
            generation: session.generation,
        }
    }

    fn install(&self, grant: Grant) -> SessionInfo {
        let mut session = self.write();
        let generation = session.generation + 1;
        *session = Session {
            access_token: grant.access_token,
            issued_at: grant.issued_at,
            refresh_token: grant.refresh_token,
            connected: true,
            generation,
        };
        self.describe(&session)
    }

    /// Install a renewal's grant only if the session is still the
    /// connected one at generation `started`.
    fn install_if_current(&self, started: u64, grant: Grant) -> Option<SessionInfo> {
        let mut session = self.write();
        if !session.connected || session.generation != started {
            return None;
        }
        session.access_token = grant.access_token;
        session.issued_at = grant.issued_at;
        session.refresh_token = grant.refresh_token;
        session.generation = started + 1;
        Some(self.describe(&session))
    }

    /// Returns `false` when the session moved on since `started`.
    fn disconnect_if_current(&self, started: u64) -> bool {
        let mut session = self.write();
        if session.connected && session.generation == started {
            *session = Session::disconnected(started);
            true
        } else {
            false
        }
    }

    fn mark_disconnected(&self) {
        let mut session = self.write();
        *session = Session::disconnected(session.generation);
    }
}

// ── Response decoding ────────────────────────────────────────────────

/// Decode a login/renewal response into a token grant, classifying
/// provider refusals into [`AuthError`] kinds.
async fn parse_grant(resp: reqwest::Response) -> Result<Grant, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    let parsed: AuthResponse = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            let preview: String = body.chars().take(200).collect();
            return Err(Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            });
        }
        Err(_) => {
            return Err(Error::Rejected {
                status: status.as_u16(),
                code: None,
                payload: body,
            });
        }
    };

    if let Some(err) = parsed.error {
        return Err(match err.code.as_deref() {
            Some(code) => AuthError::from_code(code),
            None => AuthError::Unknown { code: None },
        }
        .into());
    }

    if !status.is_success() {
        return Err(Error::Rejected {
            status: status.as_u16(),
            code: None,
            payload: body,
        });
    }

    match (parsed.session, parsed.refresh_token) {
        (Some(access), Some(refresh)) => Ok(Grant {
            access_token: SecretString::from(access),
            issued_at: parsed.iat.and_then(issued_at_from_iat).unwrap_or_else(Utc::now),
            refresh_token: SecretString::from(refresh),
        }),
        _ => Err(Error::Deserialization {
            message: "authentication response is missing session or refreshToken".into(),
            body,
        }),
    }
}

/// Neviweb reports `iat` as epoch milliseconds; accept seconds as well.
fn issued_at_from_iat(iat: i64) -> Option<DateTime<Utc>> {
    if iat > IAT_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(iat).single()
    } else {
        Utc.timestamp_opt(iat, 0).single()
    }
}

pub(crate) fn error_code(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|env| env.error)
        .and_then(|err| err.code)
}

pub(crate) fn secret_header(secret: &SecretString, name: &'static str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(secret.expose_secret())
        .map_err(|_| Error::InvalidHeader { name })?;
    value.set_sensitive(true);
    Ok(value)
}

fn lifetime_delta(lifetime: Duration) -> TimeDelta {
    TimeDelta::from_std(lifetime).unwrap_or(TimeDelta::MAX)
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
