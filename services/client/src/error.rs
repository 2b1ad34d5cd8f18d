//! services/client/src/error.rs
//!
//! Defines the primary error type for the `docchat` client.

use crate::adapters::storage::StorageError;
use crate::config::ConfigError;
use docchat_core::ports::PortError;

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a failure to open or write the persisted state file.
    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),

    /// Represents a failure to build the underlying HTTP client.
    #[error("HTTP client Error: {0}")]
    Http(#[from] reqwest::Error),

    /// Represents a failure reading a line from the terminal.
    #[error("Terminal input error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}
