//! Configuration for the Neviweb CLI.
//!
//! TOML profiles, password resolution (env + keyring + plaintext), and
//! translation to `neviweb_core::ControllerConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use neviweb_core::{
    ControllerConfig, Credentials, DEFAULT_BASE_URL, PollIntervals, TlsMode, TtlPolicy,
};

/// Keyring service name; entries are keyed `{profile}/password`.
pub const KEYRING_SERVICE: &str = "neviweb";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Per-request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// One Neviweb account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL. Defaults to the public Neviweb endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Account e-mail.
    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Only discover devices of this location.
    pub location_id: Option<i64>,

    /// Extra CA certificate (PEM), for intercepting proxies.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout, seconds.
    pub timeout: Option<u64>,

    /// Poll period overrides, humantime strings ("30s", "0s" disables).
    #[serde(default, skip_serializing_if = "FamilyDurations::is_empty")]
    pub poll: FamilyDurations,

    /// Cache TTL overrides, humantime strings.
    #[serde(default, skip_serializing_if = "FamilyDurations::is_empty")]
    pub ttl: FamilyDurations,

    /// Log in again automatically when the session is lost.
    pub auto_reconnect: Option<bool>,
}

fn default_url() -> String {
    DEFAULT_BASE_URL.into()
}

/// Optional per-family durations, e.g. `poll = { switch = "10s" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FamilyDurations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermostat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimmer: Option<String>,
}

impl FamilyDurations {
    pub fn is_empty(&self) -> bool {
        self.thermostat.is_none() && self.switch.is_none() && self.dimmer.is_none()
    }

    /// Overlay the parsed values on `(thermostat, switch, dimmer)`.
    fn apply(
        &self,
        section: &str,
        base: (Duration, Duration, Duration),
    ) -> Result<(Duration, Duration, Duration), ConfigError> {
        let parse = |name: &str, raw: Option<&String>, fallback: Duration| match raw {
            None => Ok(fallback),
            Some(raw) => humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
                field: format!("{section}.{name}"),
                reason: format!("'{raw}': {e}"),
            }),
        };
        Ok((
            parse("thermostat", self.thermostat.as_ref(), base.0)?,
            parse("switch", self.switch.as_ref(), base.1)?,
            parse("dimmer", self.dimmer.as_ref(), base.2)?,
        ))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "neviweb", "neviweb").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("neviweb");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (missing is fine), then `NEVIWEB_*` variables.
///
/// Nested keys use a double underscore: `NEVIWEB_DEFAULTS__OUTPUT=json`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NEVIWEB_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Account e-mail: profile, then `NEVIWEB_USERNAME`.
pub fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var("NEVIWEB_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Password from the credential chain: the profile's `password_env`,
/// `NEVIWEB_PASSWORD`, the system keyring, then plaintext.
pub fn resolve_password(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(pw) = std::env::var("NEVIWEB_PASSWORD") {
        return Ok(SecretString::from(pw));
    }

    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    let username = resolve_username(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;
    Ok(Credentials::new(username, password))
}

// ── Profile → ControllerConfig ──────────────────────────────────────

/// Build a `ControllerConfig` from a profile, with no flag overrides.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<ControllerConfig, ConfigError> {
    let url = parse_url(&profile.url)?;
    let credentials = resolve_credentials(profile, profile_name)?;

    let mut config = ControllerConfig::new(url, credentials);
    config.location_id = profile.location_id;
    if let Some(ref ca_path) = profile.ca_cert {
        config.tls = TlsMode::CustomCa(ca_path.clone());
    }
    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(auto) = profile.auto_reconnect {
        config.auto_reconnect = auto;
    }

    let poll = config.poll;
    let (thermostat, switch, dimmer) = profile
        .poll
        .apply("poll", (poll.thermostat, poll.switch, poll.dimmer))?;
    config.poll = PollIntervals {
        thermostat,
        switch,
        dimmer,
    };

    let ttl = config.ttl;
    let (thermostat, switch, dimmer) = profile
        .ttl
        .apply("ttl", (ttl.thermostat, ttl.switch, ttl.dimmer))?;
    config.ttl = TtlPolicy {
        thermostat,
        switch,
        dimmer,
    };

    Ok(config)
}

pub fn parse_url(raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}
