use serde::{Deserialize, Serialize};

/// Where an update came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
    /// Direct LAN session with the device.
    Lan,
    /// Cloud REST (fetch, poll or datapoint echo).
    Cloud,
    /// Device stream service push socket.
    Dss,
    /// Restored from the offline cache.
    Cached,
    /// Produced locally without a round-trip.
    Local,
}
