// Device stream service: subscriptions, push socket framing and events.

pub mod client;
pub mod frame;
pub mod types;

pub use client::StreamServiceClient;
pub use frame::{StreamFrame, parse_frame};
