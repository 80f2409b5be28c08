use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Duration};
use tokio::sync::OnceCell;

use super::{DelegationError, SigningError, SigningIdentity};
use crate::types::ConfigurationError;

/// Name of the STS session, visible in the store's audit logs
const SESSION_NAME: &str = "upload-url-signer";

/// Shortest session requested for delegated identities (one hour)
pub const SESSION_DURATION_SECS: i32 = 3600;

/// Longest session IAM lets a role be configured for (twelve hours)
pub const MAX_SESSION_DURATION_SECS: i32 = 43_200;

/// Obtains a short-lived identity that can sign URLs for the store
#[async_trait]
pub trait CredentialDelegator: Send + Sync {
    /// Acquires a signing identity that stays valid for at least `min_lifetime`
    ///
    /// # Errors
    ///
    /// Returns `DelegationError::Configuration` if the process has no ambient
    /// identity and `DelegationError::Signing` if the exchange fails or no identity
    /// can live that long
    async fn acquire_signing_identity_for(
        &self,
        min_lifetime: Duration,
    ) -> Result<SigningIdentity, DelegationError>;

    /// Acquires a signing identity for the configured principal
    ///
    /// # Errors
    ///
    /// See [`CredentialDelegator::acquire_signing_identity_for`]
    async fn acquire_signing_identity(&self) -> Result<SigningIdentity, DelegationError> {
        self.acquire_signing_identity_for(Duration::zero()).await
    }
}

/// Session length to request so the identity outlives `min_lifetime`
///
/// Never asks for less than [`SESSION_DURATION_SECS`] or more than `max_session`.
///
/// # Errors
///
/// Returns `SigningError::WindowExceedsIdentity` if `min_lifetime` is longer than
/// `max_session`
pub fn session_duration_secs(
    min_lifetime: Duration,
    max_session: Duration,
) -> Result<i32, SigningError> {
    if min_lifetime > max_session {
        return Err(SigningError::WindowExceedsIdentity {
            requested_minutes: min_lifetime.num_minutes(),
            available_minutes: max_session.num_minutes(),
        });
    }

    let secs = min_lifetime
        .num_seconds()
        .max(i64::from(SESSION_DURATION_SECS))
        .min(max_session.num_seconds());

    i32::try_from(secs)
        .map_err(|_| SigningError::InvalidInput(format!("session of {secs}s is too long")))
}

/// Principal the delegated identity acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPrincipal {
    /// Role ARN given explicitly
    Explicit(String),
    /// Role in the ambient principal's own account
    DerivedFromAccount {
        /// Role name within the account
        role_name: String,
    },
}

/// Builds the ARN of a role in the given account
#[must_use]
pub fn derive_role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role_name}")
}

/// Session policy narrowing the delegated identity to what signing needs
///
/// Uploads may only be signed for `input_bucket`; downloads for the input bucket and
/// the optional `output_bucket`.
#[must_use]
pub fn signing_session_policy(input_bucket: &str, output_bucket: Option<&str>) -> String {
    let readable: Vec<String> = std::iter::once(input_bucket)
        .chain(output_bucket)
        .map(|bucket| format!("arn:aws:s3:::{bucket}/*"))
        .collect();

    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "SignUploads",
                "Effect": "Allow",
                "Action": ["s3:PutObject"],
                "Resource": [format!("arn:aws:s3:::{input_bucket}/*")],
            },
            {
                "Sid": "SignDownloads",
                "Effect": "Allow",
                "Action": ["s3:GetObject"],
                "Resource": readable,
            },
        ],
    })
    .to_string()
}

/// Delegates through STS `AssumeRole` using the process' ambient identity
pub struct StsCredentialDelegator {
    sts_client: StsClient,
    ambient_credentials: Option<SharedCredentialsProvider>,
    target: TargetPrincipal,
    resolved_principal: OnceCell<String>,
    session_policy: String,
    max_session: Duration,
}

impl StsCredentialDelegator {
    /// Creates a delegator from the shared AWS configuration
    #[must_use]
    pub fn new(aws_config: &SdkConfig, target: TargetPrincipal, session_policy: String) -> Self {
        Self {
            sts_client: StsClient::new(aws_config),
            ambient_credentials: aws_config.credentials_provider(),
            target,
            resolved_principal: OnceCell::new(),
            session_policy,
            max_session: Duration::seconds(i64::from(MAX_SESSION_DURATION_SECS)),
        }
    }

    /// Caps requested sessions at the role's `MaxSessionDuration`
    #[must_use]
    pub fn with_max_session(mut self, max_session: Duration) -> Self {
        self.max_session = max_session;
        self
    }

    async fn check_ambient_identity(&self) -> Result<(), ConfigurationError> {
        let provider = self.ambient_credentials.as_ref().ok_or_else(|| {
            ConfigurationError("No ambient AWS credentials provider is configured".to_string())
        })?;

        provider
            .provide_credentials()
            .await
            .map_err(|e| ConfigurationError(format!("Ambient AWS identity unavailable: {e}")))?;

        Ok(())
    }

    /// Resolves the signing principal once; the account id does not change at runtime
    async fn target_principal(&self) -> Result<&str, DelegationError> {
        self.resolved_principal
            .get_or_try_init(|| self.resolve_principal())
            .await
            .map(String::as_str)
    }

    async fn resolve_principal(&self) -> Result<String, DelegationError> {
        let role_name = match &self.target {
            TargetPrincipal::Explicit(arn) => return Ok(arn.clone()),
            TargetPrincipal::DerivedFromAccount { role_name } => role_name,
        };

        let caller = self
            .sts_client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                SigningError::CredentialExchange(format!(
                    "GetCallerIdentity failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        let account = caller.account().ok_or_else(|| {
            SigningError::CredentialExchange("Caller identity has no account id".to_string())
        })?;

        let principal = derive_role_arn(account, role_name);
        tracing::info!(%principal, "Derived signing principal from caller account");
        Ok(principal)
    }
}

#[async_trait]
impl CredentialDelegator for StsCredentialDelegator {
    #[tracing::instrument(skip(self))]
    async fn acquire_signing_identity_for(
        &self,
        min_lifetime: Duration,
    ) -> Result<SigningIdentity, DelegationError> {
        let duration_secs = session_duration_secs(min_lifetime, self.max_session)?;
        self.check_ambient_identity().await?;
        let principal = self.target_principal().await?.to_string();

        let output = self
            .sts_client
            .assume_role()
            .role_arn(&principal)
            .role_session_name(SESSION_NAME)
            .policy(&self.session_policy)
            .duration_seconds(duration_secs)
            .send()
            .await
            .map_err(|e| map_sts_error(&principal, &e))?;

        let credentials = output.credentials().ok_or_else(|| {
            SigningError::CredentialExchange("AssumeRole returned no credentials".to_string())
        })?;

        let expiration = credentials.expiration();
        let expires_at = DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| {
                SigningError::CredentialExchange(format!(
                    "AssumeRole returned an invalid expiration: {expiration:?}"
                ))
            })?;

        tracing::debug!(%principal, %expires_at, duration_secs, "Assumed signing role");

        Ok(SigningIdentity::new(
            principal,
            credentials.access_key_id(),
            credentials.secret_access_key(),
            Some(credentials.session_token().to_string()),
            expires_at,
        ))
    }
}

fn map_sts_error<E, R>(principal: &str, error: &SdkError<E, R>) -> SigningError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if error.code() == Some("AccessDenied") {
        return SigningError::MissingScope(principal.to_string());
    }

    SigningError::CredentialExchange(format!(
        "AssumeRole {principal} failed: {}",
        DisplayErrorContext(error)
    ))
}
