//! Domain types for the explorer gateway.
//!
//! Configuration, the lifecycle error type and the wire envelopes shared by
//! the WebSocket and Socket.IO transports.

pub mod config;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, ExplorerConfig, GatewayConfig, LimitsConfig, LoggingConfig};
pub use error::GatewayError;
pub use types::{error_data, Transport, WsRequest, WsResponse};
