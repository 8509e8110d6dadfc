//! Flag-aware session setup.
//!
//! Layers `GlobalOpts` over the selected `ayla_config` profile and builds
//! the `SessionContext` the commands run against.

use std::sync::Arc;
use std::time::Duration;

use ayla_api::StaticToken;
use ayla_config::{Config, Profile};
use ayla_core::{FileCache, SessionConfig, SessionContext};
use secrecy::SecretString;
use tracing::debug;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything resolved from config + flags, before any network I/O.
pub struct ResolvedSession {
    pub profile_name: String,
    pub profile: Profile,
    pub config: SessionConfig,
    pub token: SecretString,
}

/// Pick the profile and apply CLI overrides.
///
/// An explicitly named profile must exist. Without one, a missing default
/// profile falls back to built-in defaults so `--token` alone is enough.
pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<ResolvedSession, CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(p) => p.clone(),
        None if global.profile.is_some() => {
            let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            names.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
                path: ayla_config::config_path().display().to_string(),
            });
        }
        None => Profile::default(),
    };

    if let Some(ref url) = global.device_service_url {
        profile.device_service_url = Some(url.clone());
    }
    if let Some(ref url) = global.stream_service_url {
        profile.stream_service_url = Some(url.clone());
    }
    if let Some(ref url) = global.stream_socket_url {
        profile.stream_socket_url = Some(url.clone());
    }
    if global.insecure {
        profile.insecure = true;
    }
    if global.offline {
        profile.allow_offline_use = true;
    }

    let mut config = ayla_config::profile_to_session_config(&profile, &profile_name)?;
    if profile.timeout.is_none() {
        config.http_timeout = Duration::from_secs(global.timeout);
    }

    let token = match global.token {
        Some(ref t) => SecretString::from(t.clone()),
        None => ayla_config::resolve_token(&profile, &profile_name)?,
    };

    debug!(
        profile = %profile_name,
        device_service = %config.device_service_url,
        offline = config.allow_offline_use,
        "resolved session"
    );

    Ok(ResolvedSession {
        profile_name,
        profile,
        config,
        token,
    })
}

/// Build the session context; attaches the file cache when offline use
/// is on.
pub fn connect(resolved: ResolvedSession) -> Result<Arc<SessionContext>, CliError> {
    let ResolvedSession {
        profile_name,
        profile,
        config,
        token,
    } = resolved;

    let use_cache = config.allow_offline_use;
    let mut builder = SessionContext::builder(config, Arc::new(StaticToken::new(token)));
    if use_cache {
        let dir = ayla_config::cache_dir(&profile, &profile_name);
        debug!(dir = %dir.display(), "using offline cache");
        builder = builder.cache(Arc::new(FileCache::new(dir)?));
    }
    Ok(builder.build()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["ayla"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["completions", "bash"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn token_flag_is_enough_without_a_profile() {
        let resolved = resolve(&global(&["--token", "t-1", "--timeout", "7"]), &Config::default()).unwrap();
        assert_eq!(resolved.profile_name, "default");
        assert_eq!(resolved.config.http_timeout, Duration::from_secs(7));
        assert_eq!(
            secrecy::ExposeSecret::expose_secret(&resolved.token),
            "t-1"
        );
    }

    #[test]
    fn named_profile_must_exist() {
        let err = resolve(&global(&["--profile", "work", "--token", "t"]), &Config::default())
            .err()
            .unwrap();
        assert!(matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "(none)"));
    }

    #[test]
    fn flags_override_profile_urls() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                access_token: Some("from-file".into()),
                ..Profile::default()
            },
        );
        let resolved = resolve(
            &global(&["--device-service-url", "http://127.0.0.1:8080/", "--offline"]),
            &cfg,
        )
        .unwrap();
        assert_eq!(
            resolved.config.device_service_url.as_str(),
            "http://127.0.0.1:8080/"
        );
        assert!(resolved.config.allow_offline_use);
    }
}
