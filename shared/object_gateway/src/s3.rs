//! S3-backed gateway

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::{
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, DateTime as S3DateTime},
    types::ChecksumMode,
    Client as S3Client,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, error, info};

use crate::{
    GatewayError, GatewayResult, ObjectGateway, ObjectKeyStream, ObjectMetadata, StorageObjectRef,
};

/// Largest page S3 returns from a single `ListObjectsV2` call
const MAX_KEYS_PER_PAGE: usize = 1000;

/// Gateway for a single S3 bucket
pub struct S3ObjectGateway {
    s3_client: Arc<S3Client>,
    bucket_name: String,
}

impl S3ObjectGateway {
    /// Creates a new S3 gateway
    ///
    /// # Arguments
    ///
    /// * `s3_client` - Pre-configured S3 client
    /// * `bucket_name` - Bucket every operation targets
    #[must_use]
    pub const fn new(s3_client: Arc<S3Client>, bucket_name: String) -> Self {
        Self {
            s3_client,
            bucket_name,
        }
    }
}

/// Maps an SDK failure onto the gateway taxonomy using the raw HTTP status
fn map_sdk_error<E>(key: &str, err: SdkError<E>) -> GatewayError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err.raw_response().map(|response| response.status().as_u16()) {
        Some(404) => GatewayError::NotFound(key.to_string()),
        Some(403) => GatewayError::PermissionDenied(key.to_string()),
        Some(status) if status >= 500 => {
            GatewayError::UpstreamError(DisplayErrorContext(&err).to_string())
        }
        _ => GatewayError::S3Error(DisplayErrorContext(&err).to_string()),
    }
}

fn to_chrono(timestamp: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// Stored SHA-256 checksum when the object has one, otherwise the MD5 carried
/// by the `ETag` of a single-part upload
///
/// Multipart `ETag`s (`"<md5-of-md5s>-<parts>"`) are not content digests and
/// yield `None`.
fn content_hash(checksum_sha256: Option<&str>, etag: Option<&str>) -> Option<String> {
    if let Some(checksum) = checksum_sha256.filter(|checksum| !checksum.is_empty()) {
        return Some(checksum.to_string());
    }

    let etag = etag?.trim_matches('"');
    let is_md5 = etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit());
    is_md5.then(|| etag.to_ascii_lowercase())
}

struct ListState {
    s3_client: Arc<S3Client>,
    bucket_name: String,
    prefix: String,
    remaining: usize,
    continuation_token: Option<String>,
    buffered: VecDeque<String>,
    exhausted: bool,
}

#[async_trait]
impl ObjectGateway for S3ObjectGateway {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn read(&self, key: &str) -> GatewayResult<Vec<u8>> {
        let output = self
            .s3_client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| GatewayError::BodyError(e.to_string()))?
            .into_bytes();

        debug!(bucket = %self.bucket_name, key, size_bytes = data.len(), "Read object");
        Ok(data.to_vec())
    }

    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<StorageObjectRef> {
        let size = bytes.len();

        self.s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                error!(bucket = %self.bucket_name, key, "S3 write failed");
                map_sdk_error(key, e)
            })?;

        info!(bucket = %self.bucket_name, key, size_bytes = size, "Wrote object");
        Ok(StorageObjectRef::new(self.bucket_name.clone(), key))
    }

    fn list(&self, prefix: &str, max_results: usize) -> ObjectKeyStream {
        let state = ListState {
            s3_client: self.s3_client.clone(),
            bucket_name: self.bucket_name.clone(),
            prefix: prefix.to_string(),
            remaining: max_results,
            continuation_token: None,
            buffered: VecDeque::new(),
            exhausted: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            loop {
                if state.remaining == 0 {
                    return None;
                }
                if let Some(key) = state.buffered.pop_front() {
                    state.remaining -= 1;
                    return Some((Ok(key), state));
                }
                if state.exhausted {
                    return None;
                }

                let page_size = i32::try_from(state.remaining.min(MAX_KEYS_PER_PAGE))
                    .unwrap_or(i32::MAX);
                let result = state
                    .s3_client
                    .list_objects_v2()
                    .bucket(&state.bucket_name)
                    .prefix(&state.prefix)
                    .max_keys(page_size)
                    .set_continuation_token(state.continuation_token.take())
                    .send()
                    .await;

                match result {
                    Ok(output) => {
                        state.buffered.extend(
                            output
                                .contents()
                                .iter()
                                .filter_map(|object| object.key().map(ToString::to_string)),
                        );
                        state.continuation_token =
                            output.next_continuation_token().map(ToString::to_string);
                        state.exhausted = state.continuation_token.is_none();
                    }
                    Err(e) => {
                        let err = map_sdk_error(&state.prefix, e);
                        state.remaining = 0;
                        return Some((Err(err), state));
                    }
                }
            }
        })
        .boxed()
    }

    async fn delete(&self, key: &str) -> GatewayResult<bool> {
        // S3 acknowledges deletes of missing keys, so check first
        if !self.exists(key).await? {
            debug!(bucket = %self.bucket_name, key, "Delete skipped, object absent");
            return Ok(false);
        }

        self.s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        info!(bucket = %self.bucket_name, key, "Deleted object");
        Ok(true)
    }

    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        let result = self
            .s3_client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => match map_sdk_error(key, e) {
                GatewayError::NotFound(_) => Ok(false),
                other => {
                    error!(bucket = %self.bucket_name, key, "Failed to check object existence: {other}");
                    Err(other)
                }
            },
        }
    }

    async fn stat(&self, key: &str) -> GatewayResult<ObjectMetadata> {
        let output = self
            .s3_client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .checksum_mode(ChecksumMode::Enabled)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        // S3 objects are replaced wholesale, so the last write is also the creation
        let modified = output.last_modified().and_then(to_chrono);

        Ok(ObjectMetadata {
            name: key.to_string(),
            size: output
                .content_length()
                .and_then(|length| u64::try_from(length).ok())
                .unwrap_or_default(),
            content_type: output.content_type().map(ToString::to_string),
            created_at: modified,
            updated_at: modified,
            content_hash: content_hash(output.checksum_sha256(), output.e_tag()),
            etag: output.e_tag().map(ToString::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_prefers_stored_checksum() {
        assert_eq!(
            content_hash(
                Some("n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg="),
                Some("\"0cc175b9c0f1b6a831c399e269772661\"")
            )
            .as_deref(),
            Some("n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg=")
        );
    }

    #[test]
    fn test_content_hash_falls_back_to_single_part_etag() {
        assert_eq!(
            content_hash(None, Some("\"0CC175B9C0F1B6A831C399E269772661\"")).as_deref(),
            Some("0cc175b9c0f1b6a831c399e269772661")
        );
        assert_eq!(
            content_hash(Some(""), Some("0cc175b9c0f1b6a831c399e269772661")).as_deref(),
            Some("0cc175b9c0f1b6a831c399e269772661")
        );
    }

    #[test]
    fn test_multipart_etag_is_not_a_content_hash() {
        assert_eq!(
            content_hash(None, Some("\"9b2cf535f27731c974343645a3985328-2\"")),
            None
        );
        assert_eq!(content_hash(None, None), None);
    }
}
