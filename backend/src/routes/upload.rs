use std::sync::Arc;

use axum::{extract::Query, Extension, Json};
use object_gateway::{ObjectGateway, ObjectMetadata};
use tracing::instrument;

use crate::types::{AppError, ValidatedJson};
use crate::upload::{
    DownloadRequest, DownloadResponse, StatusQuery, UploadIssuer, UploadRequest, UploadResponse,
};

/// Issue a signed upload
///
/// Allocates a fresh object path and returns a signed form the client posts the file
/// to directly: a `multipart/form-data` POST to `upload_url` carrying every field in
/// `upload_instructions.fields`, then the file. The store itself rejects a different
/// content type, an oversized body or a late upload.
///
/// # Errors
///
/// - 400 `out_of_range`, `content_type_mismatch`, `invalid_path`, `invalid_json`
/// - 500 `signing_error` or `configuration_error`; `allowRetry` is false when the
///   requested window is longer than a delegated identity can live
#[instrument(skip(issuer, payload))]
pub async fn create_presigned_upload_url(
    Extension(issuer): Extension<Arc<UploadIssuer>>,
    ValidatedJson(payload): ValidatedJson<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let handle = issuer.issue(&payload).await?;
    Ok(Json(UploadResponse::from(handle)))
}

/// Issue a signed download URL
///
/// Signs a `GET` for an existing object in the input or output bucket.
///
/// # Errors
///
/// Same codes as the upload endpoint; `configuration_error` when the output bucket is
/// requested but not configured
#[instrument(skip(issuer, payload))]
pub async fn create_presigned_download_url(
    Extension(issuer): Extension<Arc<UploadIssuer>>,
    ValidatedJson(payload): ValidatedJson<DownloadRequest>,
) -> Result<Json<DownloadResponse>, AppError> {
    let signed = issuer
        .issue_download(&payload.file_path, payload.expires_in_minutes, payload.bucket)
        .await?;
    Ok(Json(DownloadResponse::from(signed)))
}

/// Upload status
///
/// Reports the stored metadata of an uploaded object, or 404 while the upload has not
/// landed yet.
#[instrument(skip(gateway))]
pub async fn get_upload_status(
    Extension(gateway): Extension<Arc<dyn ObjectGateway>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ObjectMetadata>, AppError> {
    let metadata = gateway.stat(&query.file_path).await?;
    Ok(Json(metadata))
}
