use std::time::Duration;
use thiserror::Error;

/// Failures talking to the upstream tool API.
///
/// Every variant names the operation (`fetch_tools`, `purchase`,
/// `stream_purchase`) so the message that reaches the client or the log says
/// which call failed and where.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{operation} request to {endpoint} failed: {source}")]
    Request {
        operation: &'static str,
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: {endpoint} returned status {status}: {body}")]
    Status {
        operation: &'static str,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to parse {operation} response from {endpoint}: {source}")]
    Decode {
        operation: &'static str,
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Headers, or the next chunk of a stream, did not arrive in time
    #[error("{operation} request to {endpoint} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        endpoint: String,
        after: Duration,
    },

    #[error("{operation} failed: {message}")]
    Upstream {
        operation: &'static str,
        message: String,
    },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled { .. })
    }
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
