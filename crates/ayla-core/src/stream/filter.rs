// ── Filter predicates for device streams ──

use crate::device::Device;
use crate::model::{ConnectionStatus, DeviceType};

/// Predicate over devices, applied to snapshots without re-querying.
pub enum DeviceFilter {
    All,
    ByType(DeviceType),
    Online,
    Offline,
    /// Devices currently reachable over LAN.
    LanActive,
    Custom(Box<dyn Fn(&Device) -> bool + Send + Sync>),
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        match self {
            Self::All => true,
            Self::ByType(dt) => device.info().device_type == *dt,
            Self::Online => device.info().connection_status == ConnectionStatus::Online,
            Self::Offline => device.info().connection_status == ConnectionStatus::Offline,
            Self::LanActive => device.is_lan_active(),
            Self::Custom(f) => f(device),
        }
    }
}
