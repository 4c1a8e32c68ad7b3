//! Error types for the consumption supervisor

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error for stream {stream}: {source}")]
    Registration {
        stream: String,
        #[source]
        source: zenoh::Error,
    },

    #[error("error closing stream {stream}: {source}")]
    Close {
        stream: String,
        #[source]
        source: zenoh::Error,
    },

    #[error("closing stream {stream} did not finish within {timeout:?}")]
    CloseTimeout { stream: String, timeout: Duration },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Stream the error is attributed to, if any.
    pub fn stream(&self) -> Option<&str> {
        match self {
            Error::Registration { stream, .. }
            | Error::Close { stream, .. }
            | Error::CloseTimeout { stream, .. } => Some(stream),
            Error::InvalidConfig(_) | Error::InvalidState(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
