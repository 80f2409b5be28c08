//! Delegated credentials and URL signing
//!
//! The service never holds long-lived signing keys. A [`CredentialDelegator`] turns the
//! process' ambient identity into a short-lived [`SigningIdentity`] for a narrowly
//! scoped principal, and a [`UrlSigner`] uses that identity to sign single-object
//! upload policies and download URLs locally. Nothing is signed for longer than the
//! identity backing it stays valid.

mod cache;
mod delegator;
mod error;
mod identity;
mod signer;

pub use cache::{CachedDelegator, DEFAULT_REFRESH_MARGIN_MINUTES};
pub use delegator::{
    derive_role_arn, session_duration_secs, signing_session_policy, CredentialDelegator,
    StsCredentialDelegator, TargetPrincipal, MAX_SESSION_DURATION_SECS, SESSION_DURATION_SECS,
};
pub use error::{DelegationError, SigningError};
pub use identity::SigningIdentity;
pub use signer::{
    StoreEndpoint, UrlSigner, CONTENT_TYPE_FIELD, MAX_EXPIRES_IN_MINUTES, POLICY_FIELD,
    SIGNATURE_FIELD,
};
