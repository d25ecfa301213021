//! Error types for eldercare-core

use thiserror::Error;

/// Main error type for the eldercare-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP request never produced a response (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with something other than 200
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Wireless transport error (adapter, scan, connect, subscribe)
    #[error("transport error: {0}")]
    Transport(String),

    /// Session store or authentication error
    #[error("session error: {0}")]
    Session(String),
}

impl Error {
    /// Text shown to a user for a failed request.
    ///
    /// For API errors this is the response body, which is where the backend
    /// puts its diagnostic.
    pub fn diagnostic(&self) -> String {
        match self {
            Error::Api { body, .. } if !body.is_empty() => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Result type alias for eldercare-core
pub type Result<T> = std::result::Result<T, Error>;
