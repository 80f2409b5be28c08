use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::ConfigurationError;

/// Errors raised while obtaining a delegated identity or producing a signature
#[derive(Error, Debug)]
pub enum SigningError {
    /// The delegated identity passed its expiry before the URL could be signed
    #[error("Delegated signing identity expired at {0}")]
    IdentityExpired(DateTime<Utc>),

    /// The store's identity service refused or failed the credential exchange
    #[error("Credential exchange failed: {0}")]
    CredentialExchange(String),

    /// The ambient principal is not allowed to act as the signing principal
    #[error("Principal is not allowed to sign on behalf of {0}")]
    MissingScope(String),

    /// The delegated identity stops working before the requested window ends
    #[error(
        "Requested window of {requested_minutes} minutes exceeds the {available_minutes} minutes the delegated identity is valid for"
    )]
    WindowExceedsIdentity {
        /// Validity the caller asked for
        requested_minutes: i64,
        /// Validity the identity can still back
        available_minutes: i64,
    },

    /// Inputs that cannot be expressed in a signed request
    #[error("Invalid signing input: {0}")]
    InvalidInput(String),

    /// The SDK failed to presign the request
    #[error("Failed to presign request: {0}")]
    Presign(String),
}

/// Failure of a credential delegator
#[derive(Error, Debug)]
pub enum DelegationError {
    /// The process has no usable ambient identity or the target cannot be resolved
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The exchange itself failed
    #[error(transparent)]
    Signing(#[from] SigningError),
}
