// ── Runtime connection configuration ──
//
// These types describe how to talk to Neviweb and how aggressively to
// cache, poll and write. They carry credential data but never touch disk.
// The CLI constructs a `ControllerConfig` and hands it in.

use std::time::Duration;

use neviweb_api::{Credentials, DEFAULT_LOCK_WAIT, DEFAULT_TOKEN_LIFETIME, TlsMode};
use url::Url;

use crate::model::DeviceFamily;

/// How long a fetched state stays fresh, per device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub thermostat: Duration,
    pub switch: Duration,
    pub dimmer: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            thermostat: Duration::from_secs(10),
            switch: Duration::from_secs(1),
            dimmer: Duration::from_secs(1),
        }
    }
}

impl TtlPolicy {
    pub fn ttl(&self, family: DeviceFamily) -> Duration {
        match family {
            DeviceFamily::Thermostat => self.thermostat,
            DeviceFamily::Switch => self.switch,
            DeviceFamily::Dimmer => self.dimmer,
        }
    }
}

/// Background poll period per device family. Zero disables polling for
/// that family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub thermostat: Duration,
    pub switch: Duration,
    pub dimmer: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            thermostat: Duration::from_secs(30),
            switch: Duration::from_secs(5),
            dimmer: Duration::from_secs(5),
        }
    }
}

impl PollIntervals {
    /// No background polling at all.
    pub const DISABLED: Self = Self {
        thermostat: Duration::ZERO,
        switch: Duration::ZERO,
        dimmer: Duration::ZERO,
    };

    pub fn interval(&self, family: DeviceFamily) -> Duration {
        match family {
            DeviceFamily::Thermostat => self.thermostat,
            DeviceFamily::Switch => self.switch,
            DeviceFamily::Dimmer => self.dimmer,
        }
    }
}

/// Write queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Writes allowed in flight at once.
    pub concurrency: usize,
    /// Ceiling on running + waiting writes. Beyond it `enqueue` fails
    /// with `Busy` instead of queueing.
    pub max_pending: usize,
    /// Minimum gap between the starts of two consecutive writes.
    pub min_spacing: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_pending: 16,
            min_spacing: Duration::from_millis(250),
        }
    }
}

/// Configuration for one Neviweb account.
///
/// Built by the CLI, passed to `Controller` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// API base URL (e.g., `https://neviweb.com/api/`).
    pub url: Url,
    pub credentials: Credentials,
    /// Restrict discovery to one location. `None` lists every device.
    pub location_id: Option<i64>,
    pub tls: TlsMode,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// How long an access token is honoured after issue.
    pub token_lifetime: Duration,
    /// Bound on every internal wait (session renewal, cache guard,
    /// write ticket).
    pub lock_wait: Duration,
    pub ttl: TtlPolicy,
    pub poll: PollIntervals,
    pub throttle: ThrottleConfig,
    /// Log in again when an operation finds the session gone.
    pub auto_reconnect: bool,
    /// Minimum time between two automatic re-logins.
    pub reconnect_backoff: Duration,
}

impl ControllerConfig {
    /// Defaults for everything except where and who.
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            location_id: None,
            tls: TlsMode::default(),
            timeout: Duration::from_secs(10),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            lock_wait: DEFAULT_LOCK_WAIT,
            ttl: TtlPolicy::default(),
            poll: PollIntervals::default(),
            throttle: ThrottleConfig::default(),
            auto_reconnect: true,
            reconnect_backoff: Duration::from_secs(60),
        }
    }
}
