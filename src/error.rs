//! Error types for capdriver

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapdriverError {
    /// Bad credentials, suspended account, or insufficient funds.
    /// Unrecoverable for the current credential set.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Malformed or unsupported input; retrying with the same bytes is futile.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transient capacity rejection from the solving service.
    #[error("service overloaded, try again later")]
    ServiceOverloaded,

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// A bounded retry budget ran out. Fatal for the current challenge.
    #[error("too many retries: {what} exhausted after {attempts} attempts")]
    TooManyRetries { what: &'static str, attempts: u32 },

    /// UI automation server failure.
    #[error("driver error: {0}")]
    Driver(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CapdriverError>;
