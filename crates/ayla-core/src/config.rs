// ── Runtime session configuration ──
//
// These types describe *how* a session talks to the Ayla services and how
// aggressively it polls. They never touch disk; `ayla-config` builds a
// `SessionConfig` from profiles and hands it in.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ayla_api::stream_service::types::EventType;
use url::Url;

use crate::error::CoreError;
use crate::model::DeviceInfo;

/// US field region device service.
pub const DEFAULT_DEVICE_SERVICE_URL: &str = "https://ads-field.aylanetworks.com/";
/// US field region subscription service.
pub const DEFAULT_STREAM_SERVICE_URL: &str = "https://mdss-field.aylanetworks.com/";
/// US field region push socket host.
pub const DEFAULT_STREAM_SOCKET_URL: &str = "https://mstream-field.aylanetworks.com/";

/// Per-property share of a LAN batch timeout.
pub const LAN_TIMEOUT_PER_PROPERTY: Duration = Duration::from_millis(1500);

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification.
    DangerAcceptInvalid,
}

/// Chooses which properties to keep in sync for a device. `None` means
/// all of them.
pub trait PropertyNameFilter: Send + Sync + fmt::Debug {
    fn managed_property_names(&self, device: &DeviceInfo) -> Option<Vec<String>>;
}

/// Configuration for one signed-in session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Names the session in cache keys.
    pub session_name: String,
    pub device_service_url: Url,
    /// Subscription host (mdss).
    pub stream_service_url: Url,
    /// Push socket host (mstream).
    pub stream_socket_url: Url,
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub http_timeout: Duration,
    /// Floor for LAN batch timeouts.
    pub network_timeout: Duration,
    /// Device list poll interval once ready.
    pub poll_interval: Duration,
    /// Per-device property poll interval.
    pub device_poll_interval: Duration,
    pub allow_offline_use: bool,
    /// Keep a push socket open to the device stream service.
    pub allow_dss: bool,
    pub allow_lan_for_shared_devices: bool,
    pub subscription_types: Vec<EventType>,
    pub ack_poll_interval: Duration,
    /// Seconds to wait for an ack when the caller does not say.
    pub default_ack_timeout_secs: u64,
    pub stream_retry_interval: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_count: i32,
    pub property_filter: Option<Arc<dyn PropertyNameFilter>>,
}

impl SessionConfig {
    pub fn new(device_service_url: Url, stream_service_url: Url, stream_socket_url: Url) -> Self {
        Self {
            session_name: "default".into(),
            device_service_url,
            stream_service_url,
            stream_socket_url,
            tls: TlsVerification::default(),
            http_timeout: Duration::from_secs(30),
            network_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(15),
            device_poll_interval: Duration::from_secs(5),
            allow_offline_use: false,
            allow_dss: true,
            allow_lan_for_shared_devices: false,
            subscription_types: vec![EventType::Datapoint, EventType::DatapointAck],
            ack_poll_interval: Duration::from_secs(1),
            default_ack_timeout_secs: 10,
            stream_retry_interval: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_count: 3,
            property_filter: None,
        }
    }

    /// Names to fetch for `device`, per the configured filter.
    pub fn managed_property_names(&self, device: &DeviceInfo) -> Option<Vec<String>> {
        self.property_filter
            .as_ref()
            .and_then(|f| f.managed_property_names(device))
    }

    /// Reject settings the background timers cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("poll_interval", self.poll_interval),
            ("device_poll_interval", self.device_poll_interval),
            ("heartbeat_interval", self.heartbeat_interval),
        ] {
            if value.is_zero() {
                return Err(CoreError::invalid_argument(format!("{field} must be non-zero")));
            }
        }
        Ok(())
    }

    /// `max(network_timeout, 1.5 s × count)`.
    pub fn lan_batch_timeout(&self, count: usize) -> Duration {
        let per_batch = LAN_TIMEOUT_PER_PROPERTY.saturating_mul(u32::try_from(count).unwrap_or(u32::MAX));
        per_batch.max(self.network_timeout)
    }
}
