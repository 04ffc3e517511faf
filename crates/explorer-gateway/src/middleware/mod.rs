//! Cross-cutting layers: CORS, request spans and metrics.
//!
//! Layer order on the public endpoint: Request → CORS → Tracing → Router.

pub mod cors;
pub mod metrics;
pub mod tracing;

pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, RequestTimer};
pub use self::tracing::TracingLayer;
