//! # Error Types
//!
//! The error value every collaborator and handler returns. Only public
//! errors may carry their message to a client; the gateway's dispatcher is
//! the single place that decides what leaks.

use thiserror::Error;

/// Classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input or a user-addressable condition.
    PublicClient,
    /// The operation is disabled for this chain or build configuration.
    UnsupportedFeature,
    /// Anything else: backend failures, encode failures, panics.
    Internal,
}

/// Tagged error `(message, public)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Human readable text. Shown to clients only when the error is public.
    pub message: String,
    /// Taxonomy bucket.
    pub kind: ErrorKind,
}

impl ApiError {
    /// Create an error with an explicit visibility flag.
    pub fn new(message: impl Into<String>, public: bool) -> Self {
        let kind = if public {
            ErrorKind::PublicClient
        } else {
            ErrorKind::Internal
        };
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Invalid input; message is shown to the client.
    pub fn public(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::PublicClient,
        }
    }

    /// Disabled feature; same wire shape as a public error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::UnsupportedFeature,
        }
    }

    /// Internal failure; message is only logged.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Internal,
        }
    }

    /// Whether the message may be shown to a client.
    pub fn is_public(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::PublicClient | ErrorKind::UnsupportedFeature
        )
    }

    /// `"Transaction '<txid>' not found"`
    pub fn tx_not_found(txid: &str) -> Self {
        Self::public(format!("Transaction '{}' not found", txid))
    }

    /// Returned by xpub-capable operations on chains without xpub support.
    pub fn xpub_unsupported() -> Self {
        Self::unsupported("XPUB functionality is not supported")
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        // Malformed params are the caller's fault.
        ApiError::public(e.to_string())
    }
}

/// Result type for collaborator and handler operations.
pub type ApiResult<T> = Result<T, ApiError>;
