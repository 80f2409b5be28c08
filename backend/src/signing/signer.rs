use std::collections::BTreeMap;
use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{BehaviorVersion, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    Client as S3Client,
};
use aws_sigv4::sign::v4::{calculate_signature, generate_signing_key};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::{json, Value};
use url::Url;

use super::{SigningError, SigningIdentity};
use crate::types::ConfigurationError;
use crate::upload::{SignedDownloadUrl, SignedUploadHandle};

/// Form field carrying the exact content type the upload must declare
pub const CONTENT_TYPE_FIELD: &str = "Content-Type";

/// Form field carrying the base64 policy document
pub const POLICY_FIELD: &str = "policy";

/// Form field carrying the policy signature
pub const SIGNATURE_FIELD: &str = "x-amz-signature";

/// Longest validity a SigV4 signature accepts (seven days)
pub const MAX_EXPIRES_IN_MINUTES: i64 = 7 * 24 * 60;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const BYTES_PER_MB: i64 = 1024 * 1024;
const SERVICE: &str = "s3";
const CREDENTIALS_PROVIDER: &str = "delegated-signer";

/// Where the object store lives and how buckets are addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    region: String,
    endpoint: Option<Url>,
    force_path_style: bool,
}

impl StoreEndpoint {
    /// AWS public endpoint with virtual-hosted addressing
    #[must_use]
    pub const fn aws(region: String) -> Self {
        Self {
            region,
            endpoint: None,
            force_path_style: false,
        }
    }

    /// Custom endpoint (e.g. `LocalStack`) addressed as `{endpoint}/{bucket}/{key}`
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `endpoint_url` is not an absolute URL with a host
    pub fn path_style(region: String, endpoint_url: &str) -> Result<Self, ConfigurationError> {
        Self::custom(region, endpoint_url, true)
    }

    /// Custom endpoint addressed as `{bucket}.{endpoint host}/{key}`
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `endpoint_url` is not an absolute URL with a host
    pub fn virtual_hosted(region: String, endpoint_url: &str) -> Result<Self, ConfigurationError> {
        Self::custom(region, endpoint_url, false)
    }

    fn custom(
        region: String,
        endpoint_url: &str,
        force_path_style: bool,
    ) -> Result<Self, ConfigurationError> {
        let url = Url::parse(endpoint_url)
            .map_err(|e| ConfigurationError(format!("Invalid store endpoint {endpoint_url}: {e}")))?;
        if url.host_str().is_none() {
            return Err(ConfigurationError(format!(
                "Store endpoint {endpoint_url} has no host"
            )));
        }

        Ok(Self {
            region,
            endpoint: Some(url),
            force_path_style,
        })
    }

    /// Region used in the credential scope
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// URL a browser-style form upload into `bucket` is posted to
    #[must_use]
    pub fn bucket_url(&self, bucket: &str) -> String {
        let Some(url) = &self.endpoint else {
            return format!("https://{bucket}.s3.{}.amazonaws.com/", self.region);
        };

        let host = url.host_str().unwrap_or_default();
        let authority = url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));

        if self.force_path_style {
            format!("{}://{authority}/{bucket}/", url.scheme())
        } else {
            format!("{}://{bucket}.{authority}/", url.scheme())
        }
    }

    /// S3 client configuration that signs with `credentials`
    fn s3_config(&self, credentials: Credentials) -> aws_sdk_s3::Config {
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(self.force_path_style);

        if let Some(url) = &self.endpoint {
            builder = builder.endpoint_url(url.as_str().trim_end_matches('/'));
        }

        builder.build()
    }
}

/// Produces time-bounded, single-purpose upload forms and download URLs for one bucket
#[derive(Debug, Clone)]
pub struct UrlSigner {
    bucket: String,
    endpoint: StoreEndpoint,
}

impl UrlSigner {
    /// Creates a signer for `bucket`
    #[must_use]
    pub const fn new(bucket: String, endpoint: StoreEndpoint) -> Self {
        Self { bucket, endpoint }
    }

    /// Bucket the signed requests point at
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Signs a form upload of `path` bound to `content_type` and a size ceiling
    ///
    /// The store evaluates the signed policy on every upload: a different key, a
    /// different `Content-Type`, a body larger than `max_file_size_mb` or a request
    /// after `expires_at` is refused by the store itself.
    ///
    /// # Errors
    ///
    /// - `SigningError::IdentityExpired` if the identity is no longer valid
    /// - `SigningError::WindowExceedsIdentity` if the identity expires before the window ends
    /// - `SigningError::InvalidInput` if the request cannot be signed
    pub fn sign(
        &self,
        path: &str,
        content_type: &str,
        expires_in_minutes: i64,
        max_file_size_mb: i64,
        identity: &SigningIdentity,
    ) -> Result<SignedUploadHandle, SigningError> {
        self.sign_at(
            path,
            content_type,
            expires_in_minutes,
            max_file_size_mb,
            identity,
            Utc::now(),
        )
    }

    /// [`UrlSigner::sign`] at a fixed instant
    ///
    /// # Errors
    ///
    /// See [`UrlSigner::sign`]
    pub fn sign_at(
        &self,
        path: &str,
        content_type: &str,
        expires_in_minutes: i64,
        max_file_size_mb: i64,
        identity: &SigningIdentity,
        now: DateTime<Utc>,
    ) -> Result<SignedUploadHandle, SigningError> {
        if max_file_size_mb <= 0 {
            return Err(SigningError::InvalidInput(format!(
                "size ceiling must be positive, got {max_file_size_mb}MB"
            )));
        }
        let max_bytes = max_file_size_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            SigningError::InvalidInput(format!("size ceiling {max_file_size_mb}MB overflows"))
        })?;

        let now = now.trunc_subsecs(0);
        let expires_at = checked_window(expires_in_minutes, identity, now)?;

        let credential = format!(
            "{}/{}/{}/{SERVICE}/aws4_request",
            identity.access_key_id(),
            now.format("%Y%m%d"),
            self.endpoint.region()
        );

        let mut form_fields = BTreeMap::from([
            ("key".to_string(), path.to_string()),
            (CONTENT_TYPE_FIELD.to_string(), content_type.to_string()),
            ("x-amz-algorithm".to_string(), ALGORITHM.to_string()),
            ("x-amz-credential".to_string(), credential),
            ("x-amz-date".to_string(), now.format("%Y%m%dT%H%M%SZ").to_string()),
        ]);
        if let Some(token) = identity.session_token() {
            form_fields.insert("x-amz-security-token".to_string(), token.to_string());
        }

        let mut conditions = vec![exact_match("bucket", &self.bucket)];
        conditions.extend(
            form_fields
                .iter()
                .map(|(name, value)| exact_match(name, value)),
        );
        conditions.push(json!(["content-length-range", 0, max_bytes]));

        let policy = json!({
            "expiration": expires_at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            "conditions": conditions,
        });
        let encoded_policy = BASE64.encode(policy.to_string());

        let signing_key = generate_signing_key(
            identity.secret_access_key(),
            SystemTime::from(now),
            self.endpoint.region(),
            SERVICE,
        );
        let signature = calculate_signature(signing_key, encoded_policy.as_bytes());

        form_fields.insert(POLICY_FIELD.to_string(), encoded_policy);
        form_fields.insert(SIGNATURE_FIELD.to_string(), signature);

        tracing::debug!(bucket = %self.bucket, max_bytes, %expires_at, "Signed upload policy");

        Ok(SignedUploadHandle {
            upload_url: self.endpoint.bucket_url(&self.bucket),
            file_path: path.to_string(),
            expires_at,
            max_file_size_mb,
            form_fields,
        })
    }

    /// Presigns a GET of `path`
    ///
    /// # Errors
    ///
    /// See [`UrlSigner::sign`]; `SigningError::Presign` if the SDK cannot presign
    pub async fn sign_download(
        &self,
        path: &str,
        expires_in_minutes: i64,
        identity: &SigningIdentity,
    ) -> Result<SignedDownloadUrl, SigningError> {
        self.sign_download_at(path, expires_in_minutes, identity, Utc::now())
            .await
    }

    /// [`UrlSigner::sign_download`] at a fixed instant
    ///
    /// # Errors
    ///
    /// See [`UrlSigner::sign_download`]
    pub async fn sign_download_at(
        &self,
        path: &str,
        expires_in_minutes: i64,
        identity: &SigningIdentity,
        now: DateTime<Utc>,
    ) -> Result<SignedDownloadUrl, SigningError> {
        let now = now.trunc_subsecs(0);
        let expires_at = checked_window(expires_in_minutes, identity, now)?;

        let presigned = self
            .client(identity)
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presigning_config(expires_in_minutes, now)?)
            .await
            .map_err(|e| SigningError::Presign(DisplayErrorContext(&e).to_string()))?;

        tracing::debug!(bucket = %self.bucket, %expires_at, "Presigned download URL");

        Ok(SignedDownloadUrl {
            download_url: presigned.uri().to_string(),
            file_path: path.to_string(),
            bucket: self.bucket.clone(),
            expires_at,
        })
    }

    /// S3 client acting as `identity`; building it performs no network calls
    pub(crate) fn client(&self, identity: &SigningIdentity) -> S3Client {
        let credentials = Credentials::new(
            identity.access_key_id(),
            identity.secret_access_key(),
            identity.session_token().map(ToString::to_string),
            Some(SystemTime::from(identity.expires_at())),
            CREDENTIALS_PROVIDER,
        );
        S3Client::from_conf(self.endpoint.s3_config(credentials))
    }
}

/// End of a `expires_in_minutes` window starting at `now`, if `identity` can back it
fn checked_window(
    expires_in_minutes: i64,
    identity: &SigningIdentity,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, SigningError> {
    if identity.is_expired_at(now) {
        return Err(SigningError::IdentityExpired(identity.expires_at()));
    }
    if !(1..=MAX_EXPIRES_IN_MINUTES).contains(&expires_in_minutes) {
        return Err(SigningError::InvalidInput(format!(
            "expiry must be between 1 and {MAX_EXPIRES_IN_MINUTES} minutes, got {expires_in_minutes}"
        )));
    }

    let expires_at = now + Duration::minutes(expires_in_minutes);
    if expires_at > identity.expires_at() {
        return Err(SigningError::WindowExceedsIdentity {
            requested_minutes: expires_in_minutes,
            available_minutes: identity.remaining_at(now).num_minutes(),
        });
    }

    Ok(expires_at)
}

fn presigning_config(
    expires_in_minutes: i64,
    now: DateTime<Utc>,
) -> Result<PresigningConfig, SigningError> {
    PresigningConfig::builder()
        .start_time(SystemTime::from(now))
        .expires_in(std::time::Duration::from_secs(
            expires_in_minutes.unsigned_abs() * 60,
        ))
        .build()
        .map_err(|e| SigningError::InvalidInput(format!("Invalid presigning window: {e}")))
}

fn exact_match(field: &str, value: &str) -> Value {
    let mut condition = serde_json::Map::new();
    condition.insert(field.to_string(), Value::String(value.to_string()));
    Value::Object(condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_valid_until(expires_at: DateTime<Utc>) -> SigningIdentity {
        SigningIdentity::new(
            "arn:aws:iam::123456789012:role/upload-url-signer-development",
            "ASIAEXAMPLE",
            "secret",
            Some("session".to_string()),
            expires_at,
        )
    }

    fn signer() -> UrlSigner {
        UrlSigner::new(
            "media-input".to_string(),
            StoreEndpoint::aws("us-east-1".to_string()),
        )
    }

    fn decoded_policy(handle: &SignedUploadHandle) -> Value {
        let encoded = &handle.form_fields[POLICY_FIELD];
        serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap()
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    #[test]
    fn test_upload_policy_binds_key_content_type_and_size() {
        let now = Utc::now().trunc_subsecs(0);
        let identity = identity_valid_until(now + Duration::hours(1));

        let handle = signer()
            .sign_at("images/f/20250102_030405_a.jpg", "image/jpeg", 30, 5, &identity, now)
            .unwrap();

        let policy = decoded_policy(&handle);
        let conditions = policy["conditions"].as_array().unwrap();
        assert!(conditions.contains(&json!(["content-length-range", 0, 5_242_880])));
        assert!(conditions.contains(&json!({ "Content-Type": "image/jpeg" })));
        assert!(conditions.contains(&json!({ "key": "images/f/20250102_030405_a.jpg" })));
        assert!(conditions.contains(&json!({ "bucket": "media-input" })));
        assert!(conditions.contains(&json!({ "x-amz-security-token": "session" })));
        assert_eq!(
            policy["expiration"],
            (now + Duration::minutes(30))
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string()
        );

        assert_eq!(handle.expires_at, now + Duration::minutes(30));
        assert_eq!(handle.max_file_size_mb, 5);
        assert_eq!(handle.form_fields["key"], "images/f/20250102_030405_a.jpg");
        assert_eq!(handle.form_fields["x-amz-algorithm"], ALGORITHM);
        assert!(handle.form_fields["x-amz-credential"].starts_with(&format!(
            "ASIAEXAMPLE/{}/us-east-1/s3/aws4_request",
            now.format("%Y%m%d")
        )));
        assert_eq!(handle.form_fields[SIGNATURE_FIELD].len(), 64);
    }

    #[test]
    fn test_every_form_field_is_covered_by_the_policy() {
        let now = Utc::now();
        let identity = identity_valid_until(now + Duration::hours(1));

        let handle = signer()
            .sign_at("audios/f/x_clip.mp4", "video/mp4", 10, 1, &identity, now)
            .unwrap();
        let policy = decoded_policy(&handle);
        let conditions = policy["conditions"].as_array().unwrap();

        for (name, value) in &handle.form_fields {
            if name == POLICY_FIELD || name == SIGNATURE_FIELD {
                continue;
            }
            assert!(
                conditions.contains(&exact_match(name, value)),
                "{name} is not bound by the policy"
            );
        }
    }

    #[test]
    fn test_upload_url_carries_no_signature() {
        let now = Utc::now();
        let identity = identity_valid_until(now + Duration::hours(1));

        let handle = signer()
            .sign_at("images/f/a.jpg", "image/jpeg", 30, 5, &identity, now)
            .unwrap();

        // Authority lives in the policy form fields, which the store only accepts on POST
        assert_eq!(
            handle.upload_url,
            "https://media-input.s3.us-east-1.amazonaws.com/"
        );
    }

    #[test]
    fn test_different_constraints_produce_different_signatures() {
        let now = Utc::now();
        let identity = identity_valid_until(now + Duration::hours(1));
        let sign = |content_type: &str, size: i64| {
            signer()
                .sign_at("images/f/a", content_type, 30, size, &identity, now)
                .unwrap()
                .form_fields[SIGNATURE_FIELD]
                .clone()
        };

        assert_ne!(sign("image/png", 5), sign("image/jpeg", 5));
        assert_ne!(sign("image/png", 5), sign("image/png", 6));
        assert_eq!(sign("image/png", 5), sign("image/png", 5));
    }

    #[test]
    fn test_expired_identity_is_rejected() {
        let now = Utc::now();
        let identity = identity_valid_until(now - Duration::seconds(1));

        let result = signer().sign_at("images/f/a.jpg", "image/jpeg", 30, 5, &identity, now);
        assert!(matches!(result, Err(SigningError::IdentityExpired(_))));
    }

    #[test]
    fn test_non_positive_inputs_are_rejected() {
        let now = Utc::now();
        let identity = identity_valid_until(now + Duration::hours(1));

        assert!(signer()
            .sign_at("images/f/a.jpg", "image/jpeg", 0, 5, &identity, now)
            .is_err());
        assert!(signer()
            .sign_at("images/f/a.jpg", "image/jpeg", 30, 0, &identity, now)
            .is_err());
    }

    #[test]
    fn test_window_longer_than_identity_is_refused() {
        let now = Utc::now().trunc_subsecs(0);
        let identity = identity_valid_until(now + Duration::minutes(6));

        let result = signer().sign_at("images/f/a.jpg", "image/jpeg", 30, 5, &identity, now);
        assert!(matches!(
            result,
            Err(SigningError::WindowExceedsIdentity {
                requested_minutes: 30,
                available_minutes: 6,
            })
        ));

        let handle = signer()
            .sign_at("images/f/a.jpg", "image/jpeg", 6, 5, &identity, now)
            .unwrap();
        assert!(handle.expires_at <= identity.expires_at());
    }

    #[tokio::test]
    async fn test_download_window_longer_than_identity_is_refused() {
        let identity = identity_valid_until(Utc::now() + Duration::minutes(10));

        assert!(matches!(
            signer().sign_download("images/f/a.jpg", 1440, &identity).await,
            Err(SigningError::WindowExceedsIdentity { requested_minutes: 1440, .. })
        ));
    }

    #[tokio::test]
    async fn test_download_url_is_bound_to_get() {
        let now = Utc::now().trunc_subsecs(0);
        let identity = identity_valid_until(now + Duration::hours(1));
        let signer = signer();

        let download = signer
            .sign_download_at("images/f/a.jpg", 15, &identity, now)
            .await
            .unwrap();

        let client = signer.client(&identity);
        let put = client
            .put_object()
            .bucket("media-input")
            .key("images/f/a.jpg")
            .presigned(presigning_config(15, now).unwrap())
            .await
            .unwrap();
        let delete = client
            .delete_object()
            .bucket("media-input")
            .key("images/f/a.jpg")
            .presigned(presigning_config(15, now).unwrap())
            .await
            .unwrap();

        let get_signature = query_param(&download.download_url, "X-Amz-Signature").unwrap();
        assert_eq!(put.method(), "PUT");
        assert_eq!(delete.method(), "DELETE");
        assert_ne!(Some(&get_signature), query_param(put.uri(), "X-Amz-Signature").as_ref());
        assert_ne!(Some(&get_signature), query_param(delete.uri(), "X-Amz-Signature").as_ref());
    }

    #[tokio::test]
    async fn test_download_url_expiry_and_session_token() {
        let now = Utc::now().trunc_subsecs(0);
        let identity = identity_valid_until(now + Duration::hours(1));

        let download = signer()
            .sign_download_at("images/f/a.jpg", 15, &identity, now)
            .await
            .unwrap();

        assert_eq!(download.expires_at, now + Duration::minutes(15));
        assert_eq!(
            query_param(&download.download_url, "X-Amz-Expires").as_deref(),
            Some("900")
        );
        assert_eq!(
            query_param(&download.download_url, "X-Amz-Security-Token").as_deref(),
            Some("session")
        );
        assert_eq!(
            query_param(&download.download_url, "X-Amz-Date"),
            Some(now.format("%Y%m%dT%H%M%SZ").to_string())
        );
    }

    #[tokio::test]
    async fn test_path_style_endpoint() {
        let endpoint =
            StoreEndpoint::path_style("us-east-1".to_string(), "http://localhost:4566").unwrap();
        assert_eq!(
            endpoint.bucket_url("media-input"),
            "http://localhost:4566/media-input/"
        );

        let signer = UrlSigner::new("media-input".to_string(), endpoint);
        let identity = identity_valid_until(Utc::now() + Duration::hours(1));

        let download = signer
            .sign_download("images/f/a b.jpg", 15, &identity)
            .await
            .unwrap();

        assert!(download
            .download_url
            .starts_with("http://localhost:4566/media-input/images/f/a%20b.jpg?"));
        assert_eq!(download.bucket, "media-input");
        assert_eq!(download.file_path, "images/f/a b.jpg");
    }

    #[test]
    fn test_virtual_hosted_custom_endpoint() {
        let endpoint =
            StoreEndpoint::virtual_hosted("us-east-1".to_string(), "https://r2.example.com:8443")
                .unwrap();
        assert_eq!(
            endpoint.bucket_url("pale"),
            "https://pale.r2.example.com:8443/"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_a_configuration_error() {
        assert!(StoreEndpoint::path_style("us-east-1".to_string(), "not a url").is_err());
    }
}
