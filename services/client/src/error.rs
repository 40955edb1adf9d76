//! services/client/src/error.rs
//!
//! Defines the primary error type for the entire client.

use crate::config::ConfigError;
use crate::validation::ValidationError;
use docunexus_core::ports::PortError;

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input rejected locally; no request was sent.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Represents an error that propagated up from one of the service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The operation needs a signed-in user and the session is empty.
    #[error("Not signed in")]
    NotSignedIn,

    /// Represents a standard Input/Output error (e.g., reading a file to upload).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether the server rejected the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Port(PortError::Unauthorized))
    }
}
