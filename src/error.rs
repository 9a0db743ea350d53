//! Error types for Streamium

use thiserror::Error;

/// Main error type for Streamium
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("{0}")]
    Method(String),

    #[error("{0}")]
    Remote(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// The message transmitted to the peer when this error terminates an
    /// outbound sequence.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}

/// Result type alias for Streamium
pub type Result<T> = std::result::Result<T, Error>;
