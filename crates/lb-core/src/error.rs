//! Error types for LuffyBlocker
//!
//! Every fallible operation returns [`Result<T>`]. None of these errors is
//! fatal: surfaces log them at their entry points and carry on.

use std::result::Result as StdResult;

use thiserror::Error;

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A store read or write failed (I/O, unavailable area).
    #[error("Store error: {message}")]
    Store { message: String },

    /// The store rejected a write for exceeding its quota.
    #[error("Store quota exceeded")]
    QuotaExceeded,

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A message could not be delivered or its reply never arrived.
    #[error("Message delivery failed: {message}")]
    Delivery { message: String },

    /// A configuration value is out of range.
    #[error("Invalid config: {message}")]
    InvalidConfig { message: String },
}

impl Error {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the failure came from the store rather than the caller.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::QuotaExceeded)
    }
}
