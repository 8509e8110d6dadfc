//! Shared configuration for Ayla clients.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `ayla_core::SessionConfig`. The CLI layers its own
//! flag overrides on top of what this crate produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ayla_api::stream_service::types::EventType;
use ayla_core::config::{
    DEFAULT_DEVICE_SERVICE_URL, DEFAULT_STREAM_SERVICE_URL, DEFAULT_STREAM_SOCKET_URL,
};
use ayla_core::{SessionConfig, TlsVerification};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyring service name for stored access tokens.
const KEYRING_SERVICE: &str = "ayla";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

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
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
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

impl Config {
    /// Name of the profile to use: `explicit`, else `default_profile`,
    /// else `"default"`.
    pub fn active_profile_name(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// HTTP timeout in seconds.
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
    30
}
fn default_true() -> bool {
    true
}

/// One account against one Ayla region.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Device service base URL. Defaults to the US field region.
    pub device_service_url: Option<String>,

    /// Subscription service base URL.
    pub stream_service_url: Option<String>,

    /// Push socket base URL.
    pub stream_socket_url: Option<String>,

    /// Access token (plaintext -- prefer keyring or env var).
    pub access_token: Option<String>,

    /// Environment variable holding the access token.
    pub access_token_env: Option<String>,

    /// Names this session in cache keys. Defaults to the profile name.
    pub session_name: Option<String>,

    #[serde(default)]
    pub allow_offline_use: bool,

    #[serde(default = "default_true")]
    pub allow_dss: bool,

    #[serde(default)]
    pub allow_lan_for_shared_devices: bool,

    /// Device list poll interval, seconds.
    pub poll_interval_secs: Option<u64>,

    /// Per-device property poll interval, seconds.
    pub device_poll_interval_secs: Option<u64>,

    /// Default ack wait for writes, seconds.
    pub ack_timeout_secs: Option<u64>,

    /// Floor for LAN batch timeouts, milliseconds.
    pub network_timeout_ms: Option<u64>,

    /// Push event types: `connectivity`, `datapoint`, `datapointack`.
    pub subscription_types: Option<Vec<String>>,

    /// Offline cache directory. Defaults to the platform cache dir.
    pub cache_dir: Option<PathBuf>,

    /// Custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub insecure: bool,

    /// HTTP timeout override, seconds.
    pub timeout: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            device_service_url: None,
            stream_service_url: None,
            stream_socket_url: None,
            access_token: None,
            access_token_env: None,
            session_name: None,
            allow_offline_use: false,
            allow_dss: true,
            allow_lan_for_shared_devices: false,
            poll_interval_secs: None,
            device_poll_interval_secs: None,
            ack_timeout_secs: None,
            network_timeout_ms: None,
            subscription_types: None,
            cache_dir: None,
            ca_cert: None,
            insecure: false,
            timeout: None,
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "ayla", "ayla")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| {
            let mut p = dirs_fallback(".config");
            p.push("config.toml");
            p
        })
}

/// Offline cache directory for a profile.
pub fn cache_dir(profile: &Profile, profile_name: &str) -> PathBuf {
    if let Some(ref dir) = profile.cache_dir {
        return dir.clone();
    }
    project_dirs()
        .map_or_else(|| dirs_fallback(".cache"), |dirs| dirs.cache_dir().to_path_buf())
        .join(profile_name)
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("ayla");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path, layered under `AYLA_*` env vars.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`. A missing file yields the defaults. Nested keys in
/// env vars are separated by `__`, e.g. `AYLA_PROFILES__HOME__ALLOW_DSS`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("AYLA_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or fails
/// to parse.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
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

fn keyring_entry(profile_name: &str) -> Option<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")).ok()
}

/// Resolve the access token: profile env var, then system keyring, then
/// plaintext in the config.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's access_token_env → env var lookup
    if let Some(ref env_name) = profile.access_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Some(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.access_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token")).map_err(|e| {
        ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        }
    })?;
    entry.set_password(token).map_err(|e| ConfigError::Validation {
        field: "keyring".into(),
        reason: e.to_string(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, value: Option<&str>, default: &str) -> Result<url::Url, ConfigError> {
    let raw = value.unwrap_or(default);
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Parse event type names (`"datapoint"`, ...).
pub fn parse_subscription_types(names: &[String]) -> Result<Vec<EventType>, ConfigError> {
    names
        .iter()
        .map(|name| {
            name.trim()
                .parse::<EventType>()
                .map_err(|reason| ConfigError::Validation {
                    field: "subscription_types".into(),
                    reason,
                })
        })
        .collect()
}

/// Build a `SessionConfig` from a profile. Credentials are resolved
/// separately via [`resolve_token`].
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<SessionConfig, ConfigError> {
    let device_url = parse_url(
        "device_service_url",
        profile.device_service_url.as_deref(),
        DEFAULT_DEVICE_SERVICE_URL,
    )?;
    let stream_url = parse_url(
        "stream_service_url",
        profile.stream_service_url.as_deref(),
        DEFAULT_STREAM_SERVICE_URL,
    )?;
    let socket_url = parse_url(
        "stream_socket_url",
        profile.stream_socket_url.as_deref(),
        DEFAULT_STREAM_SOCKET_URL,
    )?;

    let mut config = SessionConfig::new(device_url, stream_url, socket_url);
    config.session_name = profile
        .session_name
        .clone()
        .unwrap_or_else(|| profile_name.to_owned());

    config.tls = if profile.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    if let Some(secs) = profile.timeout {
        config.http_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_interval_secs {
        config.poll_interval = Duration::from_secs(non_zero("poll_interval_secs", secs)?);
    }
    if let Some(secs) = profile.device_poll_interval_secs {
        config.device_poll_interval =
            Duration::from_secs(non_zero("device_poll_interval_secs", secs)?);
    }
    if let Some(secs) = profile.ack_timeout_secs {
        config.default_ack_timeout_secs = secs;
    }
    if let Some(ms) = profile.network_timeout_ms {
        config.network_timeout = Duration::from_millis(ms);
    }
    if let Some(ref names) = profile.subscription_types {
        let types = parse_subscription_types(names)?;
        if types.is_empty() {
            return Err(ConfigError::Validation {
                field: "subscription_types".into(),
                reason: "at least one event type is required".into(),
            });
        }
        config.subscription_types = types;
    }

    config.allow_offline_use = profile.allow_offline_use;
    config.allow_dss = profile.allow_dss;
    config.allow_lan_for_shared_devices = profile.allow_lan_for_shared_devices;

    Ok(config)
}

fn non_zero(field: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"

[profiles.home]
device_service_url = "https://ads-dev.aylanetworks.com/"
access_token = "plain-token"
allow_offline_use = true
poll_interval_secs = 60
subscription_types = ["datapoint", "connectivity"]

[profiles.eu]
device_service_url = "https://ads-field-eu.aylanetworks.com/"
allow_dss = false
insecure = true
"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.output, "table");
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn loads_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();

        assert_eq!(cfg.active_profile_name(None), "home");
        assert_eq!(cfg.active_profile_name(Some("eu")), "eu");
        assert_eq!(cfg.defaults.output, "json");

        let home = cfg.profile("home").unwrap();
        assert!(home.allow_offline_use);
        assert!(home.allow_dss);
        assert_eq!(home.poll_interval_secs, Some(60));

        assert!(matches!(
            cfg.profile("work"),
            Err(ConfigError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn session_config_applies_profile_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&write_sample(&dir)).unwrap();

        let session = profile_to_session_config(cfg.profile("home").unwrap(), "home").unwrap();
        assert_eq!(session.session_name, "home");
        assert_eq!(
            session.device_service_url.as_str(),
            "https://ads-dev.aylanetworks.com/"
        );
        assert_eq!(
            session.stream_service_url.as_str(),
            DEFAULT_STREAM_SERVICE_URL
        );
        assert_eq!(session.poll_interval, Duration::from_secs(60));
        assert!(session.allow_offline_use);
        assert_eq!(
            session.subscription_types,
            vec![EventType::Datapoint, EventType::Connectivity]
        );
        assert_eq!(session.tls, TlsVerification::SystemDefaults);

        let eu = profile_to_session_config(cfg.profile("eu").unwrap(), "eu").unwrap();
        assert!(!eu.allow_dss);
        assert_eq!(eu.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn rejects_bad_urls_and_event_types() {
        let profile = Profile {
            device_service_url: Some("not a url".into()),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "p").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "device_service_url"));

        let profile = Profile {
            subscription_types: Some(vec!["datapoint".into(), "bogus".into()]),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "p").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "subscription_types"));
    }

    #[test]
    fn rejects_zero_poll_intervals() {
        let profile = Profile {
            device_poll_interval_secs: Some(0),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "p").unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "device_poll_interval_secs")
        );

        let profile = Profile {
            poll_interval_secs: Some(0),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "p").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "poll_interval_secs"));
    }

    #[test]
    fn token_from_profile_env_var_wins_over_plaintext() {
        // PATH is set in every test environment.
        let expected = std::env::var("PATH").unwrap();
        let profile = Profile {
            access_token_env: Some("PATH".into()),
            access_token: Some("plain".into()),
            ..Profile::default()
        };
        let token = resolve_token(&profile, "ayla-config-test-profile").unwrap();
        assert_eq!(secrecy::ExposeSecret::expose_secret(&token), expected);
    }

    #[test]
    fn missing_token_is_no_credentials() {
        let profile = Profile::default();
        let err = resolve_token(&profile, "ayla-config-test-empty-profile").unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "lab".into(),
            Profile {
                allow_offline_use: true,
                cache_dir: Some(dir.path().join("cache")),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let lab = loaded.profile("lab").unwrap();
        assert!(lab.allow_offline_use);
        assert!(lab.allow_dss);
        assert_eq!(cache_dir(lab, "lab"), dir.path().join("cache"));
    }
}
