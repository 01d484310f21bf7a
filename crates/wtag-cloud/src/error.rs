//! Error types for wtag-cloud

use thiserror::Error;
use wtag_core::TagError;

/// Errors that can occur talking to the wireless tag cloud
#[derive(Debug, Error)]
pub enum CloudError {
    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Bearer token rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Session no longer valid for this account
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Server error
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The cloud has no monitoring config for this sensor kind
    #[error("No cloud config for {0} sensors")]
    UnsupportedSensor(String),

    /// Response body did not have the expected shape
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),
}

impl CloudError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudError::Network(_) | CloudError::Server { .. })
    }

    /// Create a server error from status and message
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        CloudError::Server {
            status,
            message: message.into(),
        }
    }
}

impl From<CloudError> for TagError {
    fn from(err: CloudError) -> Self {
        TagError::transport(err)
    }
}

/// Result type for cloud operations
pub type CloudResult<T> = Result<T, CloudError>;
