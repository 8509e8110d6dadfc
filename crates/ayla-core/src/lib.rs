//! Device state synchronization for the Ayla Networks IoT cloud.
//!
//! This crate keeps a local, observable model of an account's devices and
//! their properties, fed by three transports:
//!
//! - **LAN**: a direct session with the device, preferred whenever it is
//!   active and every property involved can travel over it.
//! - **Cloud REST**: the device service, used for everything else and for
//!   polling when nothing pushes updates.
//! - **Device stream service (DSS)**: a push socket delivering datapoint,
//!   ack and connectivity events.
//!
//! The main pieces:
//!
//! - **[`SessionContext`]**: service clients, cache, LAN session factory
//!   and the root cancellation token for one signed-in session.
//!
//! - **[`DeviceManager`]**: owns the [`DeviceCollection`] and drives
//!   initialization (device list, properties, LAN config), then list and
//!   property polling. Falls back to the offline cache when the network
//!   is unavailable.
//!
//! - **[`Device`]**: per-device property store, transport selection for
//!   reads and writes, ack tracking, polling and LAN session lifecycle.
//!   Every mutation is published on the device's broadcast channel as a
//!   [`DeviceEvent`].
//!
//! - **[`StreamManager`]**: subscription, push socket, heartbeat and
//!   reconnection.

pub mod cache;
pub mod change;
pub mod config;
pub mod context;
pub mod convert;
pub mod device;
pub mod dss;
pub mod error;
pub mod manager;
pub mod model;
pub mod selector;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{Cache, CacheKind, FileCache, MemoryCache};
pub use change::{Change, DeviceEvent, FieldChange, ListChange, PropertyChange};
pub use config::{PropertyNameFilter, SessionConfig, TlsVerification};
pub use context::{SessionContext, SessionContextBuilder};
pub use device::Device;
pub use dss::{StreamManager, StreamState};
pub use error::CoreError;
pub use manager::{DeviceManager, DeviceManagerState, InitErrors, ManagerEvent};
pub use selector::Transport;
pub use store::{DeviceCollection, PropertyStore};
pub use stream::{DeviceFilter, DeviceStream};

pub use model::{
    BaseType, ConnectionStatus, DataSource, Datapoint, DeviceField, DeviceInfo, DeviceType, Grant,
    LanConfig, Property, PropertyField, PropertyValue, RegistrationType,
};
