//! Error types for wtag-core

use thiserror::Error;

/// Errors produced by the tag, sensor and monitoring-config model
#[derive(Debug, Error)]
pub enum TagError {
    /// A write did not match the field's accepted values
    #[error("Value {value} is out of range for '{path}'")]
    Validation { path: String, value: String },

    /// The tag hardware has no sensor of the requested kind
    #[error("Tag {tag} does not support {kind} sensor")]
    UnsupportedSensor { tag: String, kind: String },

    /// Sensor kind name not known to this library
    #[error("Unknown sensor kind: {0}")]
    UnknownSensorKind(String),

    /// Temperature unit name not known to this library
    #[error("Invalid temperature unit: {0}")]
    InvalidUnit(String),

    /// Tag payload is missing or has malformed identity fields
    #[error("Invalid tag data: {0}")]
    InvalidTagData(String),

    /// The owning tag no longer exists
    #[error("Owning tag has been dropped")]
    TagDropped,

    /// Failure reported by the cloud transport
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TagError {
    /// Wrap a transport failure
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TagError::Transport(Box::new(err))
    }

    /// Create a validation error for a rejected write
    pub fn validation(path: impl Into<String>, value: impl std::fmt::Display) -> Self {
        TagError::Validation {
            path: path.into(),
            value: value.to_string(),
        }
    }

    /// Check if this is a rejected write (the caller may retry with an accepted value)
    pub fn is_validation(&self) -> bool {
        matches!(self, TagError::Validation { .. })
    }

    /// Check if retrying the same call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, TagError::Transport(_))
    }
}

/// Result type for tag operations
pub type TagResult<T> = Result<T, TagError>;
