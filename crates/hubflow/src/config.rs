//! CLI configuration: thin wrapper around `hubflow_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--host, --api-key, etc.).

use std::time::Duration;

use secrecy::SecretString;

use hubflow_core::{BridgeConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use hubflow_config::{
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

/// Comma-separated profile names for diagnostics.
pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Build a `BridgeConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile the bridge is built from `--host` and
/// `--api-key` alone.
pub fn build_bridge_config(global: &GlobalOpts) -> Result<BridgeConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        return resolve_profile(profile, &profile_name, &cfg.defaults, global);
    }

    // An explicitly named profile must exist.
    if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    }

    let Some(host) = global.host.clone() else {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    };
    let profile = Profile {
        host,
        port: 80,
        ..Profile::default()
    };
    resolve_profile(&profile, &profile_name, &cfg.defaults, global)
}

/// Translate a `Profile` + global flags into a `BridgeConfig`.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<BridgeConfig, CliError> {
    let mut profile = profile.clone();
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }

    // 1. API key: the flag wins over every entry of the credential chain
    if let Some(ref key) = global.api_key {
        profile.api_key = Some(key.clone());
    }
    let mut config = hubflow_config::profile_to_bridge_config(&profile, profile_name, defaults)?;
    if let Some(ref key) = global.api_key {
        config.api_key = SecretString::from(key.clone());
    }

    // 2. TLS
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }

    // 3. Timeout
    if let Some(ms) = global.timeout {
        config.request_timeout = Duration::from_millis(ms);
    }

    Ok(config)
}
