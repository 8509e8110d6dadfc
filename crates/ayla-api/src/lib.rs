// ayla-api: Async Rust client for the Ayla Networks device and stream services

pub mod auth;
pub mod device_service;
pub mod error;
pub mod lan;
pub mod stream_service;
pub mod transport;
pub mod websocket;

pub use auth::{SharedTokenProvider, StaticToken, TokenProvider};
pub use device_service::DeviceServiceClient;
pub use error::Error;
pub use stream_service::StreamServiceClient;
pub use transport::{TlsMode, TransportConfig};
