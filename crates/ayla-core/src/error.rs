// ── Core error types ──
//
// Every public fetch and write in ayla-core returns `CoreError`. The
// `From<ayla_api::Error>` impl folds wire failures into this taxonomy so
// consumers never branch on reqwest or tungstenite types.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Caller errors ────────────────────────────────────────────────
    /// The operation is not valid in the current state (e.g. a LAN write
    /// to a device that is not in LAN mode).
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// An ack-enabled write was not acknowledged in time.
    #[error("No acknowledgement for property {property} within {timeout_secs}s")]
    AckTimeout { property: String, timeout_secs: u64 },

    // ── Service errors ───────────────────────────────────────────────
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("JSON error: {message}")]
    Json { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Network and timeout failures make the offline cache eligible.
    pub fn is_network_or_timeout(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ayla_api::Error> for CoreError {
    fn from(err: ayla_api::Error) -> Self {
        match err {
            ayla_api::Error::Authentication { message } => CoreError::Authentication { message },
            ayla_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else if let Some(status) = e.status() {
                    CoreError::Server {
                        status: status.as_u16(),
                        message: e.to_string(),
                    }
                } else {
                    CoreError::Network {
                        message: e.to_string(),
                    }
                }
            }
            ayla_api::Error::InvalidUrl(e) => CoreError::InvalidArgument {
                message: format!("Invalid URL: {e}"),
            },
            ayla_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            ayla_api::Error::Tls(msg) => CoreError::Network {
                message: format!("TLS error: {msg}"),
            },
            ayla_api::Error::Service { status: 401, message } => {
                CoreError::Authentication { message }
            }
            ayla_api::Error::Service { status, message } => CoreError::Server { status, message },
            ayla_api::Error::WebSocketConnect(reason) => CoreError::Network {
                message: format!("WebSocket connection failed: {reason}"),
            },
            ayla_api::Error::WebSocketClosed { code, reason } => CoreError::Network {
                message: format!("WebSocket closed (code {code}): {reason}"),
            },
            ayla_api::Error::Lan { message } => CoreError::Network { message },
            ayla_api::Error::LanInactive => CoreError::precondition("Device is not in LAN mode"),
            ayla_api::Error::Deserialization { message, body: _ } => CoreError::Json { message },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Json {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_service_response_is_authentication() {
        let err = CoreError::from(ayla_api::Error::Service {
            status: 401,
            message: "token expired".into(),
        });
        assert!(err.is_authentication());
    }

    #[test]
    fn explicit_timeouts_qualify_for_offline_fallback() {
        let err = CoreError::from(ayla_api::Error::Timeout { timeout_ms: 5000 });
        assert!(err.is_network_or_timeout());

        let err = CoreError::from(ayla_api::Error::Service {
            status: 500,
            message: "boom".into(),
        });
        assert!(!err.is_network_or_timeout());
    }

    #[test]
    fn lan_inactive_is_a_precondition() {
        let err = CoreError::from(ayla_api::Error::LanInactive);
        assert!(matches!(err, CoreError::Precondition { .. }));
    }
}
