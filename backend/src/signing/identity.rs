use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Short-lived credentials for the signing principal
///
/// The secret never leaves the process: it only derives signing keys and is redacted
/// from `Debug` output. A signature made with the identity stops working at
/// [`SigningIdentity::expires_at`], whatever expiry the signed request itself declares.
#[derive(Clone)]
pub struct SigningIdentity {
    principal: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl SigningIdentity {
    /// Creates a new signing identity
    #[must_use]
    pub fn new(
        principal: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            principal: principal.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expires_at,
        }
    }

    /// Principal the credentials act as
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Access key id, embedded in the signed URL's credential scope
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub(crate) fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Session token of temporary credentials
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Instant after which signatures made with this identity stop working
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the identity is expired at `at`
    #[must_use]
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at <= at
    }

    /// Whether the identity is still valid for at least `margin` after `at`
    #[must_use]
    pub fn is_fresh_at(&self, at: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > at
    }

    /// Time left before expiry, zero once expired
    #[must_use]
    pub fn remaining_at(&self, at: DateTime<Utc>) -> Duration {
        (self.expires_at - at).max(Duration::zero())
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("principal", &self.principal)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
