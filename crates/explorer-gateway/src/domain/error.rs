//! Gateway error types.
//!
//! Request-level failures are `explorer_types::ApiError`; this module holds
//! the process-level errors raised while configuring and running the
//! gateway.

use super::config::ConfigError;
use thiserror::Error;

/// Gateway lifecycle errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// I/O failure while serving or reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTML template could not be loaded or parsed
    #[error("template error: {0}")]
    Template(String),

    /// Logging subscriber could not be installed
    #[error("logging initialisation failed: {0}")]
    Logging(String),

    /// Metric family registration failed
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Connection-level transport failure
    #[error("transport error: {0}")]
    Transport(String),
}
