//! Error types for gateway operations

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur during gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Store refused access to the object
    #[error("Access denied to object: {0}")]
    PermissionDenied(String),

    /// Upstream service error (5xx from S3)
    #[error("Upstream service error: {0}")]
    UpstreamError(String),

    /// S3 service error
    #[error("S3 service error: {0}")]
    S3Error(String),

    /// Object body could not be read
    #[error("Failed to read object body: {0}")]
    BodyError(String),
}
