// Request gateway for the Neviweb API
//
// Base path: https://neviweb.com/api/
// Auth: `session-id` header carrying the current access token
//
// Every request asks the `SessionManager` for a token first, which renews
// it proactively when it has aged past its lifetime. A request is never
// replayed after it fails; renewal happens before sending, not after.

use std::sync::Arc;

use reqwest::RequestBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credentials;
use crate::error::Error;
use crate::models::ErrorEnvelope;
use crate::session::{SESSION_HEADER, SessionInfo, SessionManager, error_code, secret_header};
use crate::transport::TransportConfig;

/// Public Neviweb endpoint.
pub const DEFAULT_BASE_URL: &str = "https://neviweb.com/api/";

/// Async client for the Neviweb API.
///
/// Cheap to share behind an `Arc`; the HTTP connection pool and the
/// session are shared by every caller.
pub struct NeviwebClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

impl NeviwebClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client with default session settings.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client` with a fresh session manager.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = normalize_base_url(base_url)?;
        let session = Arc::new(SessionManager::new(http.clone(), base_url.clone()));
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// Assemble a client around a pre-configured session manager.
    ///
    /// `session` must have been built with the same base URL.
    pub fn with_session(http: reqwest::Client, base_url: Url, session: Arc<SessionManager>) -> Self {
        Self {
            http,
            base_url,
            session,
        }
    }

    /// Ensure the base URL ends with `/` so relative paths join beneath it.
    pub fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        normalize_base_url(raw)
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    // ── Session shortcuts ────────────────────────────────────────────

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, Error> {
        self.session.login(credentials).await
    }

    pub async fn logout(&self) -> Result<(), Error> {
        self.session.logout().await
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    /// Join a relative path (e.g. `"device/42/attribute?attributes=onOff"`)
    /// onto the base URL.
    fn url(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(Error::InvalidUrl)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");
        self.send(self.http.get(url)).await
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("PUT {url}");
        self.send(self.http.put(url).json(body)).await
    }

    /// Attach the session token and send.
    ///
    /// Fails with `SessionExpired` before any network I/O when the session
    /// is disconnected or cannot be renewed.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, Error> {
        let token = self.session.access_token().await?;
        let resp = builder
            .header(SESSION_HEADER, secret_header(&token, SESSION_HEADER)?)
            .send()
            .await?;
        handle_response(resp).await
    }
}

// ── Response handling ────────────────────────────────────────────────

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(Error::Rejected {
            status: status.as_u16(),
            code: error_code(&body),
            payload: body,
        });
    }

    // Neviweb reports most refusals as HTTP 200 with an `error` member.
    if let Ok(ErrorEnvelope { error: Some(err) }) = serde_json::from_str::<ErrorEnvelope>(&body) {
        trace!(code = ?err.code, "provider error payload");
        return Err(Error::Rejected {
            status: status.as_u16(),
            code: err.code,
            payload: body,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/"));
    Ok(url)
}
