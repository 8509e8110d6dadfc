//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ayla_config::ConfigError;
use ayla_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Ayla service: {reason}")]
    #[diagnostic(
        code(ayla::connection_failed),
        help(
            "Check your network connection and the service URLs of the profile.\n\
             Use --offline to fall back to the last cached device state."
        )
    )]
    ConnectionFailed { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(ayla::auth_failed),
        help("The access token was rejected. Sign in again and update AYLA_TOKEN or the keyring entry.")
    )]
    AuthFailed { message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(ayla::no_credentials),
        help(
            "Pass --token, set AYLA_TOKEN, or add access_token_env to the profile.\n\
             Config file: {path}"
        )
    )]
    NoCredentials { profile: String, path: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ayla::not_found),
        help("Run: ayla {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Service ──────────────────────────────────────────────────────
    #[error("Service error (HTTP {status}): {message}")]
    #[diagnostic(code(ayla::service_error))]
    Service { status: u16, message: String },

    #[error("{message}")]
    #[diagnostic(code(ayla::rejected))]
    Rejected { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ayla::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ayla::profile_not_found),
        help("Available profiles: {available}\nConfig file: {path}")
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(ayla::config))]
    Config(String),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(ayla::timeout),
        help("Increase --timeout or --ack-timeout, or check that the device is online.")
    )]
    Timeout { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(ayla::serialization))]
    Serialization(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn device_not_found(dsn: &str) -> Self {
        Self::NotFound {
            resource_type: "device".into(),
            identifier: dsn.into(),
            list_command: "devices".into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network { message } => CliError::ConnectionFailed { reason: message },
            CoreError::Authentication { message } => CliError::AuthFailed { message },
            CoreError::Timeout { .. } | CoreError::AckTimeout { .. } => CliError::Timeout {
                message: err.to_string(),
            },
            CoreError::Server { status: 404, message } => CliError::NotFound {
                resource_type: "resource".into(),
                identifier: message,
                list_command: "devices".into(),
            },
            CoreError::Server { status, message } => CliError::Service { status, message },
            CoreError::InvalidArgument { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Precondition { .. } | CoreError::Cancelled => CliError::Rejected {
                message: err.to_string(),
            },
            CoreError::Json { message } => CliError::Serialization(message),
            CoreError::Cache { message } => CliError::Config(format!("offline cache: {message}")),
            CoreError::Internal(message) => CliError::Rejected { message },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials {
                profile,
                path: ayla_config::config_path().display().to_string(),
            },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
                path: ayla_config::config_path().display().to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let auth = CliError::from(CoreError::Authentication {
            message: "expired".into(),
        });
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let ack = CliError::from(CoreError::AckTimeout {
            property: "cmd".into(),
            timeout_secs: 5,
        });
        assert_eq!(ack.exit_code(), exit_code::TIMEOUT);

        let net = CliError::from(CoreError::Network {
            message: "refused".into(),
        });
        assert_eq!(net.exit_code(), exit_code::CONNECTION);

        let bad = CliError::from(CoreError::InvalidArgument {
            message: "no such property".into(),
        });
        assert_eq!(bad.exit_code(), exit_code::USAGE);
    }
}
