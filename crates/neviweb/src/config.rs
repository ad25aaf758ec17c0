//! CLI configuration -- thin wrapper around `neviweb_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--url, --username, --location, --timeout).

use neviweb_core::{ControllerConfig, DEFAULT_BASE_URL};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use neviweb_config::{
    Config, Defaults, Profile, config_path, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ControllerConfig` from the config file, the active profile
/// and CLI overrides.
///
/// A missing profile is only an error when it was asked for by name;
/// otherwise flags and `NEVIWEB_*` variables alone are enough.
pub fn build_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(profile_not_found(&cfg, profile_name));
        }
        None => Profile {
            url: DEFAULT_BASE_URL.into(),
            ..Profile::default()
        },
    };

    resolve_profile(profile, &profile_name, global, &cfg.defaults)
}

/// Apply flag overrides to a profile and translate it.
///
/// Precedence: flag (or its env var) > profile > `[defaults]`.
pub fn resolve_profile(
    mut profile: Profile,
    profile_name: &str,
    global: &GlobalOpts,
    defaults: &Defaults,
) -> Result<ControllerConfig, CliError> {
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
    }
    if global.username.is_some() {
        profile.username.clone_from(&global.username);
    }
    if global.location.is_some() {
        profile.location_id = global.location;
    }
    profile.timeout = Some(
        global
            .timeout
            .or(profile.timeout)
            .unwrap_or(defaults.timeout),
    );

    Ok(neviweb_config::profile_to_controller_config(
        &profile,
        profile_name,
    )?)
}

pub fn profile_not_found(cfg: &Config, name: String) -> CliError {
    let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
    available.sort();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}
