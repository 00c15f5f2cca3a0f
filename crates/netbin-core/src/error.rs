//! Error types for the `netbin` core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `netbin` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No command was given to run per connection.
    #[error("no command given")]
    MissingCommand,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
