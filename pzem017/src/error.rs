//! Errors raised while setting up a session.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using the driver [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur before a session exists.
///
/// Once bound, a session reports failures through
/// [`Status`](crate::Status) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The serial port could not be opened.
    #[error("Failed to open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },
}
