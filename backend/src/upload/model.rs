use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;
use validator::Validate;

use crate::signing::CONTENT_TYPE_FIELD;

/// Container types accepted as audio because audio is extracted from them later
pub const AUDIO_EXTRACTION_VIDEO_TYPES: [&str; 2] = ["video/mp4", "video/quicktime"];

/// Folder used when the client does not name one
pub const DEFAULT_FOLDER: &str = "uploads";

/// Default validity of an upload URL in minutes
pub const DEFAULT_EXPIRES_IN_MINUTES: i64 = 60;

/// Default size ceiling in megabytes
pub const DEFAULT_MAX_FILE_SIZE_MB: i64 = 10;

/// Category of an uploaded object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaType {
    /// Still images
    Image,
    /// Audio, including video containers audio is extracted from
    Audio,
}

impl MediaType {
    /// Leading path segment for objects of this type (`images`, `audios`)
    #[must_use]
    pub fn path_prefix(self) -> String {
        format!("{self}s")
    }

    /// Whether `content_type` is acceptable for this media type
    ///
    /// Matching is on the raw, case-sensitive value the upload will declare. `image/*`
    /// and `audio/*` need a subtype; anything after it, parameters included, is left
    /// to the store's exact match on the signed value. The video containers must match
    /// [`AUDIO_EXTRACTION_VIDEO_TYPES`] exactly, without parameters.
    #[must_use]
    pub fn accepts(self, content_type: &str) -> bool {
        match self {
            Self::Image => has_subtype(content_type, "image/"),
            Self::Audio => {
                has_subtype(content_type, "audio/")
                    || AUDIO_EXTRACTION_VIDEO_TYPES.contains(&content_type)
            }
        }
    }

    /// Media type a content type belongs to, if any
    #[must_use]
    pub fn classify(content_type: &str) -> Option<Self> {
        [Self::Image, Self::Audio]
            .into_iter()
            .find(|media_type| media_type.accepts(content_type))
    }
}

fn has_subtype(content_type: &str, top_level: &str) -> bool {
    content_type
        .strip_prefix(top_level)
        .and_then(|subtype| subtype.chars().next())
        .is_some_and(|first| first.is_ascii_alphanumeric())
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

const fn default_expires_in_minutes() -> i64 {
    DEFAULT_EXPIRES_IN_MINUTES
}

const fn default_max_file_size_mb() -> i64 {
    DEFAULT_MAX_FILE_SIZE_MB
}

/// Request for a signed upload URL
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct UploadRequest {
    /// Original file name, appended to the allocated path
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// Exact `Content-Type` the upload will declare
    pub content_type: String,
    /// Declared media category
    pub media_type: MediaType,
    /// Folder grouping the upload
    #[serde(default = "default_folder")]
    #[validate(length(min = 1, max = 512))]
    pub folder: String,
    /// Validity of the URL in minutes
    #[serde(default = "default_expires_in_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub expires_in_minutes: i64,
    /// Largest accepted upload in megabytes
    #[serde(default = "default_max_file_size_mb")]
    #[validate(range(min = 1, max = 100))]
    pub max_file_size_mb: i64,
}

/// Name of the multipart part carrying the file bytes; it must come last
pub const FILE_PART: &str = "file";

/// A signed upload form together with the metadata the client needs to use it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUploadHandle {
    /// URL the upload form is posted to
    pub upload_url: String,
    /// Store-relative key the upload writes to
    pub file_path: String,
    /// Instant after which the store refuses the upload
    pub expires_at: DateTime<Utc>,
    /// Size ceiling bound into the signed policy
    pub max_file_size_mb: i64,
    /// Form fields, including the signed policy, to send verbatim
    pub form_fields: BTreeMap<String, String>,
}

/// How to perform the upload
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadInstructions {
    /// HTTP method to use
    pub method: String,
    /// Body encoding of the request
    pub encoding: String,
    /// Form fields to send with exactly these values, before the file part
    pub fields: BTreeMap<String, String>,
    /// Name of the part carrying the file
    pub file_field: String,
    /// Human-readable notes
    pub notes: Vec<String>,
}

/// Response body of `POST /upload/presigned-url`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadResponse {
    /// URL the upload form is posted to
    pub upload_url: String,
    /// Store-relative key the upload lands at
    pub file_path: String,
    /// Expiry of the URL (RFC 3339)
    pub expires_at: String,
    /// Size ceiling in megabytes
    pub max_file_size_mb: i64,
    /// Instructions for performing the upload
    pub upload_instructions: UploadInstructions,
}

impl From<SignedUploadHandle> for UploadResponse {
    fn from(handle: SignedUploadHandle) -> Self {
        let content_type = handle
            .form_fields
            .get(CONTENT_TYPE_FIELD)
            .cloned()
            .unwrap_or_default();

        Self {
            upload_instructions: UploadInstructions {
                method: "POST".to_string(),
                encoding: "multipart/form-data".to_string(),
                fields: handle.form_fields,
                file_field: FILE_PART.to_string(),
                notes: vec![
                    format!(
                        "Send every field as a form part, then the file bytes in the '{FILE_PART}' part"
                    ),
                    format!("The file must be declared as Content-Type: {content_type}"),
                    format!("Maximum file size: {}MB", handle.max_file_size_mb),
                    format!("Upload expires at: {}", handle.expires_at.to_rfc3339()),
                ],
            },
            upload_url: handle.upload_url,
            file_path: handle.file_path,
            expires_at: handle.expires_at.to_rfc3339(),
            max_file_size_mb: handle.max_file_size_mb,
        }
    }
}

/// Bucket a download URL is issued for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BucketKind {
    /// Bucket receiving client uploads
    Input,
    /// Bucket receiving processing results
    #[default]
    Output,
}

/// Request for a signed download URL
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct DownloadRequest {
    /// Store-relative key to read
    #[validate(length(min = 1, max = 1024))]
    pub file_path: String,
    /// Validity of the URL in minutes
    #[serde(default = "default_expires_in_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub expires_in_minutes: i64,
    /// Bucket holding the object
    #[serde(default)]
    pub bucket: BucketKind,
}

/// A signed download URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDownloadUrl {
    /// Presigned GET URL
    pub download_url: String,
    /// Store-relative key
    pub file_path: String,
    /// Bucket the URL points at
    pub bucket: String,
    /// Instant after which the URL is refused
    pub expires_at: DateTime<Utc>,
}

/// Response body of `POST /upload/presigned-download-url`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadResponse {
    /// Presigned GET URL
    pub download_url: String,
    /// Store-relative key
    pub file_path: String,
    /// Bucket the URL points at
    pub bucket: String,
    /// Expiry of the URL (RFC 3339)
    pub expires_at: String,
}

impl From<SignedDownloadUrl> for DownloadResponse {
    fn from(signed: SignedDownloadUrl) -> Self {
        Self {
            download_url: signed.download_url,
            file_path: signed.file_path,
            bucket: signed.bucket,
            expires_at: signed.expires_at.to_rfc3339(),
        }
    }
}

/// Query of `GET /upload/status`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StatusQuery {
    /// Store-relative key returned at issuance
    pub file_path: String,
}
