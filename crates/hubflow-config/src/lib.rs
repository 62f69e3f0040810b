//! Shared configuration for hubflow.
//!
//! TOML profiles, API-key resolution (env + keyring + plaintext), and
//! translation to `hubflow_core::BridgeConfig`. The CLI adds
//! `GlobalOpts`-aware overrides on top.

use std::collections::BTreeMap;
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

use hubflow_core::{BridgeConfig, TlsVerification};

/// Keyring service name for stored API keys.
pub const KEYRING_SERVICE: &str = "hubflow";

/// Environment variable consulted when a profile names none.
pub const API_KEY_ENV: &str = "HUBFLOW_API_KEY";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

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
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// REST request timeout (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Discovery poll interval (seconds).
    #[serde(default = "default_polling")]
    pub polling: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout_ms: default_timeout_ms(),
            polling: default_polling(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout_ms() -> u64 {
    2000
}
fn default_polling() -> u64 {
    15
}

/// A named gateway profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Gateway host or IP.
    pub host: String,

    /// REST port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Event stream port; asked from the gateway when unset.
    pub ws_port: Option<u16>,

    /// Use HTTPS / WSS.
    #[serde(default)]
    pub secure: bool,

    /// API key (plaintext — prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override discovery poll interval (seconds).
    pub polling: Option<u64>,

    /// Override REST request timeout (milliseconds).
    pub timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    80
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            ws_port: None,
            secure: false,
            api_key: None,
            api_key_env: None,
            ca_cert: None,
            insecure: None,
            polling: None,
            timeout_ms: None,
        }
    }
}

impl Profile {
    /// REST root derived from host, port and scheme.
    pub fn base_url(&self) -> Result<url::Url, ConfigError> {
        let scheme = if self.secure { "https" } else { "http" };
        let raw = format!("{scheme}://{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Validation {
            field: "host".into(),
            reason: format!("invalid gateway address: {raw}"),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "hubflow", "hubflow").map_or_else(
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
    p.push("hubflow");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Environment keys nest with a double underscore:
/// `HUBFLOW_PROFILES__HOME__HOST=10.0.0.2`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUBFLOW_").ignore(&["API_KEY"]).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve an API key from the credential chain.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env, then the global variable
    let env_name = profile.api_key_env.as_deref().unwrap_or(API_KEY_ENV);
    if let Ok(val) = std::env::var(env_name) {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store an API key in the system keyring.
pub fn store_api_key(profile_name: &str, key: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
        .and_then(|entry| entry.set_password(key))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

/// Build a `BridgeConfig` from a profile — no CLI flag overrides.
pub fn profile_to_bridge_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<BridgeConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "gateway host is empty".into(),
        });
    }

    let url = profile.base_url()?;
    let api_key = resolve_api_key(profile, profile_name)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = BridgeConfig::new(url, api_key);
    config.tls = tls;
    config.request_timeout =
        Duration::from_millis(profile.timeout_ms.unwrap_or(defaults.timeout_ms));
    config.poll_interval = Duration::from_secs(profile.polling.unwrap_or(defaults.polling));
    config.websocket_port = profile.ws_port;
    config.secure_websocket = profile.secure;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.polling, 15);
        assert_eq!(config.defaults.timeout_ms, 2000);
    }

    #[test]
    fn profiles_load_from_toml() {
        let file = write_config(
            r#"
            default_profile = "home"

            [defaults]
            polling = 30

            [profiles.home]
            host = "192.168.1.10"
            ws_port = 8088
            api_key = "ABCDEF"
            "#,
        );
        let config = load_config_from(file.path()).unwrap();
        let (name, profile) = config.profile(None).unwrap();

        assert_eq!(name, "home");
        assert_eq!(profile.port, 80);
        assert_eq!(profile.ws_port, Some(8088));
        assert_eq!(config.defaults.polling, 30);
        assert!(matches!(
            config.profile(Some("office")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn profile_translates_to_bridge_config() {
        let profile = Profile {
            host: "10.0.0.2".into(),
            port: 8080,
            ws_port: Some(443),
            secure: true,
            api_key: Some("PLAINTEXT".into()),
            api_key_env: Some("HUBFLOW_TEST_UNSET_VARIABLE".into()),
            polling: Some(2),
            ..Profile::default()
        };
        let config = profile_to_bridge_config(&profile, "test", &Defaults::default()).unwrap();

        assert_eq!(config.url.as_str(), "https://10.0.0.2:8080/");
        assert_eq!(config.api_key.expose_secret(), "PLAINTEXT");
        assert_eq!(config.websocket_port, Some(443));
        assert!(config.secure_websocket);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        // Below the floor: the bridge falls back to its default interval.
        assert_eq!(config.effective_poll_interval(), Duration::from_secs(15));
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn empty_host_is_rejected() {
        let profile = Profile {
            api_key: Some("KEY".into()),
            ..Profile::default()
        };
        let err = profile_to_bridge_config(&profile, "test", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "host"));
    }

    #[test]
    fn config_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                host: "gw.local".into(),
                port: 80,
                ..Profile::default()
            },
        );
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profile(None).unwrap().1.host, "gw.local");
    }
}
