// neviweb-api: Async Rust client for the Sinopé Neviweb cloud API
//
// Two layers live here:
// - `SessionManager` owns the login session (access token, refresh token,
//   issue time) and serializes token renewal.
// - `NeviwebClient` is the request gateway: every call goes through the
//   session manager for a fresh token before it hits the wire.
//
// Device-specific endpoints are inherent methods on `NeviwebClient`,
// implemented in `devices.rs`.

pub mod auth;
pub mod client;
pub mod devices;
pub mod error;
pub mod models;
pub mod session;
pub mod transport;

pub use auth::{AuthError, Credentials};
pub use client::{DEFAULT_BASE_URL, NeviwebClient};
pub use error::Error;
pub use models::{ApiDevice, ApiLocation, AttributeUpdate};
pub use session::{
    DEFAULT_LOCK_WAIT, DEFAULT_TOKEN_LIFETIME, SessionInfo, SessionManager, duration_millis,
};
pub use transport::{TlsMode, TransportConfig};
