//! Error types for geospatial index operations.
//!
//! Errors fall into three groups: validation failures raised before any store
//! call, transient store failures that the retrying adapter layer may retry,
//! and permanent store failures that are surfaced immediately.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeoError>;

#[derive(Debug, Error)]
pub enum GeoError {
    /// Caller input failed validation. Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The store rejected the request because provisioned throughput was exceeded.
    #[error("Request throttled by store: {0}")]
    Throttled(String),

    /// Transient network or service failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conditional check failed: {0}")]
    ConditionalCheckFailed(String),

    #[error("Malformed store request: {0}")]
    MalformedRequest(String),

    /// The adapter layer gave up on a transient failure.
    #[error("Store retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<GeoError>,
    },

    #[error("Serialization error: {0}")]
    SerializationErrorWithContext(String),

    #[error("{0}")]
    Other(String),
}

impl GeoError {
    /// Whether the adapter layer may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeoError::Throttled(_) | GeoError::Unavailable(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GeoError::InvalidInput(_) | GeoError::InvalidConfig(_))
    }
}

impl From<serde_json::Error> for GeoError {
    fn from(e: serde_json::Error) -> Self {
        GeoError::SerializationErrorWithContext(e.to_string())
    }
}
