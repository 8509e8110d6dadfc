// ── Domain model ──
//
// Canonical types for devices, properties and datapoints. Wire records
// from `ayla_api` convert into these in `convert`.

pub mod datapoint;
pub mod device;
pub mod lan_config;
pub mod property;
pub mod source;

pub use datapoint::Datapoint;
pub use device::{ConnectionStatus, DeviceField, DeviceInfo, DeviceType, Grant, RegistrationType};
pub use lan_config::LanConfig;
pub use property::{BaseType, Property, PropertyField, PropertyValue};
pub use source::DataSource;
