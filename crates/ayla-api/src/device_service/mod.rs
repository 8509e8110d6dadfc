// Device service: device list, properties, datapoints and LAN config.

pub mod client;
pub mod types;

pub use client::DeviceServiceClient;
