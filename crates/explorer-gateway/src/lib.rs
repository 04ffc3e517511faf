//! Explorer gateway - the public face of a blockchain indexer.
//!
//! One HTTP endpoint serves four front-ends over the same backing
//! operations:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        EXPLORER GATEWAY                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  /api/v1 /api/v2   /, /tx, /address   /websocket   /socket.io/   │
//! │       REST          HTML explorer      WS RPC       Socket.IO    │
//! │         └───────────────┬─────────────────┴────────────┘         │
//! │                    Dispatcher                                    │
//! │     (panic recovery, error mapping, metrics per method)          │
//! │                         │                                        │
//! │   AccountService  ChainBackend  Mempool  AddressCodec  Rates     │
//! └──────────────────────────────────────────────────────────────────┘
//!          ▲
//!    EventBroker ◄── indexer: new block / mempool tx / fiat ticker
//!          │
//!    SubscriptionRegistry ──► connection outboxes
//! ```
//!
//! A second, internal endpoint serves `/health` and `/metrics`.
//!
//! # Usage
//!
//! ```ignore
//! use explorer_gateway::{Backends, GatewayConfig, GatewayService};
//!
//! let config = GatewayConfig::load(path)?;
//! let service = GatewayService::new(config, Backends::from_shared(backend))?;
//! let broker = service.broker();
//! // hand `broker` to the indexer, then:
//! service.run(shutdown_signal).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod broker;
pub mod connection;
pub mod dispatch;
pub mod domain;
pub mod html;
pub mod middleware;
pub mod rest;
pub mod service;
pub mod sio;
pub mod state;
pub mod subscriptions;
pub mod telemetry;
pub mod ws;

pub use broker::EventBroker;
pub use domain::{ConfigError, GatewayConfig, GatewayError, Transport};
pub use middleware::GatewayMetrics;
pub use service::GatewayService;
pub use state::{AppState, Backends, SharedState};
pub use subscriptions::SubscriptionRegistry;
pub use telemetry::init_tracing;

/// Crate version, reported on explorer pages.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
