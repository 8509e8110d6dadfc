use std::time::Duration;

use secrecy::SecretString;

/// LAN-mode parameters for one device, as issued by the device service.
#[derive(Debug, Clone, Default)]
pub struct LanConfig {
    pub lanip_key_id: Option<u64>,
    pub lanip_key: Option<SecretString>,
    pub keep_alive: Option<Duration>,
    pub auto_sync: Option<u64>,
    pub status: Option<String>,
}

impl LanConfig {
    /// The service marks LAN mode per device as `enable` / `disable`.
    pub fn is_enabled(&self) -> bool {
        self.status
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case("enable"))
    }
}
