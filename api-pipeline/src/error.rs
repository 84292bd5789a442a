//! Infrastructure error types
//!
//! These errors cover configuration loading, server start-up and pipeline
//! assembly. Failures raised while serving a call live in [`crate::failure`]
//! and are translated into envelopes by [`crate::boundary`].

use thiserror::Error;

/// Result type alias using the crate [`enum@Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or starting the service
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A second handler was registered for a request type
    #[error("Handler already registered for request type {request_type}")]
    DuplicateHandler {
        /// Type name of the request
        request_type: &'static str,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
