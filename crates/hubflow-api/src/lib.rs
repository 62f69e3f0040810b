// hubflow-api: Async Rust client for a home-automation gateway (REST + event stream)

pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::GatewayClient;
pub use error::Error;
pub use models::{DeviceRecord, EventKind, FullState, GatewayConfig, GatewayEvent, MessageType};
pub use websocket::{EventSocket, ReconnectConfig, SocketConfig, SocketSignal};
