use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use super::MediaType;
use crate::signing::{DelegationError, SigningError};
use crate::types::ConfigurationError;

/// Rejection of an upload request before any credentials are involved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A numeric or length limit was violated
    #[error("{field} {detail}")]
    OutOfRange {
        /// Offending field
        field: String,
        /// What the limit is
        detail: String,
    },

    /// The content type does not belong to the declared media type
    #[error("Content type {content_type} is not allowed for {media_type} uploads")]
    ContentTypeMismatch {
        /// Declared media type
        media_type: MediaType,
        /// Rejected content type
        content_type: String,
    },

    /// A relative path segment would make the signed key differ from the returned path
    #[error("{field} must not contain '.' or '..' path segments: {value}")]
    InvalidPath {
        /// Offending field
        field: &'static str,
        /// Rejected value
        value: String,
    },
}

impl From<ValidationErrors> for PolicyError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));

        fields.into_iter().next().map_or_else(
            || Self::OutOfRange {
                field: "request".to_string(),
                detail: errors.to_string(),
            },
            |(field, field_errors)| Self::OutOfRange {
                field: field.to_string(),
                detail: field_errors
                    .first()
                    .map_or_else(|| "is invalid".to_string(), describe),
            },
        )
    }
}

fn describe(error: &ValidationError) -> String {
    let (min, max) = (error.params.get("min"), error.params.get("max"));
    match (&*error.code, min, max) {
        ("range", Some(min), Some(max)) => format!("must be between {min} and {max}"),
        ("length", Some(min), Some(max)) => {
            format!("length must be between {min} and {max} characters")
        }
        _ => "is invalid".to_string(),
    }
}

/// Failure of an issuance
#[derive(Error, Debug)]
pub enum UploadError {
    /// The request was rejected
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Delegation or signing failed
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The service is misconfigured
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<DelegationError> for UploadError {
    fn from(error: DelegationError) -> Self {
        match error {
            DelegationError::Configuration(e) => Self::Configuration(e),
            DelegationError::Signing(e) => Self::Signing(e),
        }
    }
}
