//! Issuance of signed upload and download URLs
//!
//! An issuance validates the request, allocates a fresh object key, obtains a
//! delegated identity that outlives the requested window and signs an upload policy
//! for exactly that key. No bytes of the upload ever pass through the service.

mod error;
mod model;
pub mod path;
pub mod policy;

use std::sync::Arc;

use chrono::Duration;
use tracing::instrument;

use crate::signing::{CredentialDelegator, UrlSigner};
use crate::types::ConfigurationError;

pub use error::{PolicyError, UploadError};
pub use model::{
    BucketKind, DownloadRequest, DownloadResponse, MediaType, SignedDownloadUrl,
    SignedUploadHandle, StatusQuery, UploadInstructions, UploadRequest, UploadResponse,
    AUDIO_EXTRACTION_VIDEO_TYPES, DEFAULT_EXPIRES_IN_MINUTES, DEFAULT_FOLDER,
    DEFAULT_MAX_FILE_SIZE_MB, FILE_PART,
};

const MAX_DOWNLOAD_EXPIRES_IN_MINUTES: i64 = 1440;

/// Issues signed URLs against the input bucket and, when configured, the output bucket
pub struct UploadIssuer {
    delegator: Arc<dyn CredentialDelegator>,
    input_signer: UrlSigner,
    output_signer: Option<UrlSigner>,
}

impl UploadIssuer {
    /// Creates an issuer
    #[must_use]
    pub fn new(
        delegator: Arc<dyn CredentialDelegator>,
        input_signer: UrlSigner,
        output_signer: Option<UrlSigner>,
    ) -> Self {
        Self {
            delegator,
            input_signer,
            output_signer,
        }
    }

    /// Issues a signed upload for a new object in the input bucket
    ///
    /// Every successful call allocates a new path; nothing is reused between calls.
    /// The returned `expires_at` never lies beyond the expiry of the identity that
    /// signed the upload.
    ///
    /// # Errors
    ///
    /// - `UploadError::Policy` if the request is rejected; no credentials are requested
    /// - `UploadError::Configuration` if no ambient identity is available
    /// - `UploadError::Signing` if delegation or signing fails, or if no identity can
    ///   stay valid for the whole window
    #[instrument(skip_all, fields(media_type = %request.media_type, folder = %request.folder))]
    pub async fn issue(&self, request: &UploadRequest) -> Result<SignedUploadHandle, UploadError> {
        policy::validate(request)?;

        let file_path = path::allocate_path(&request.folder, request.media_type, &request.file_name);
        let identity = self
            .delegator
            .acquire_signing_identity_for(Duration::minutes(request.expires_in_minutes))
            .await?;

        let handle = self.input_signer.sign(
            &file_path,
            &request.content_type,
            request.expires_in_minutes,
            request.max_file_size_mb,
            &identity,
        )?;

        tracing::info!(
            file_path = %handle.file_path,
            expires_at = %handle.expires_at,
            "Issued signed upload"
        );

        Ok(handle)
    }

    /// Issues a signed download URL for an existing object
    ///
    /// # Errors
    ///
    /// - `UploadError::Policy` if the path or expiry is rejected
    /// - `UploadError::Configuration` if the output bucket is requested but not configured
    /// - `UploadError::Signing` if delegation or signing fails
    #[instrument(skip(self))]
    pub async fn issue_download(
        &self,
        file_path: &str,
        expires_in_minutes: i64,
        bucket: BucketKind,
    ) -> Result<SignedDownloadUrl, UploadError> {
        if !(1..=MAX_DOWNLOAD_EXPIRES_IN_MINUTES).contains(&expires_in_minutes) {
            return Err(PolicyError::OutOfRange {
                field: "expires_in_minutes".to_string(),
                detail: format!("must be between 1 and {MAX_DOWNLOAD_EXPIRES_IN_MINUTES}"),
            }
            .into());
        }
        if file_path.is_empty() {
            return Err(PolicyError::InvalidPath {
                field: "file_path",
                value: String::new(),
            }
            .into());
        }
        policy::check_path_segments("file_path", file_path)?;

        let signer = match bucket {
            BucketKind::Input => &self.input_signer,
            BucketKind::Output => self.output_signer.as_ref().ok_or_else(|| {
                ConfigurationError("S3_OUTPUT_BUCKET is not configured".to_string())
            })?,
        };

        let identity = self
            .delegator
            .acquire_signing_identity_for(Duration::minutes(expires_in_minutes))
            .await?;
        let signed = signer
            .sign_download(file_path, expires_in_minutes, &identity)
            .await?;

        tracing::info!(bucket = %signed.bucket, file_path, "Issued signed download URL");
        Ok(signed)
    }
}
