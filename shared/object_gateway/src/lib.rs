//! Object storage gateway shared by the upload backend and downstream processing
//!
//! The gateway is the read/write side of the object store: once a client has
//! finished a direct upload through a signed URL, everything else that touches the
//! object goes through an [`ObjectGateway`]. Two adapters are provided, one backed by
//! S3 and one kept entirely in memory.

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs, dead_code)]

mod error;
mod memory;
mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::{GatewayError, GatewayResult};
pub use memory::InMemoryObjectGateway;
pub use s3::S3ObjectGateway;

/// Default page size used when listing objects
pub const DEFAULT_LIST_MAX_RESULTS: usize = 1000;

/// Logical locator of an object; the bytes are owned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageObjectRef {
    /// Bucket holding the object
    pub bucket: String,
    /// Store-relative key
    pub key: String,
}

impl StorageObjectRef {
    /// Creates a new object locator
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Returns the `s3://bucket/key` form of the locator
    #[must_use]
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Read-only projection of an object's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectMetadata {
    /// Object key
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Stored `Content-Type`
    pub content_type: Option<String>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated_at: Option<DateTime<Utc>>,
    /// Content digest: the stored SHA-256 checksum (base64) when the object was
    /// written with one, else the hex MD5 of a single-part upload. `None` for
    /// multipart uploads without a checksum.
    pub content_hash: Option<String>,
    /// Entity tag
    pub etag: Option<String>,
}

/// Lazy stream of object keys returned by [`ObjectGateway::list`]
pub type ObjectKeyStream = BoxStream<'static, GatewayResult<String>>;

/// Operations against a single bucket of the object store
///
/// Every call goes to the store; nothing is cached between calls. Operations on
/// different keys are independent and carry no transactional guarantees.
#[async_trait]
pub trait ObjectGateway: Send + Sync {
    /// Bucket this gateway operates on
    fn bucket(&self) -> &str;

    /// Reads the full content of an object
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the key does not exist and
    /// `GatewayError::PermissionDenied` if the store refuses access
    async fn read(&self, key: &str) -> GatewayResult<Vec<u8>>;

    /// Writes an object, silently overwriting any previous content
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the store rejects the write
    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> GatewayResult<StorageObjectRef>;

    /// Lists keys under `prefix`, yielding at most `max_results` entries
    ///
    /// The stream fetches pages lazily. It is finite and cannot be resumed from
    /// another gateway instance.
    fn list(&self, prefix: &str, max_results: usize) -> ObjectKeyStream;

    /// Deletes an object
    ///
    /// Returns `false` when the object was already absent.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the store rejects the delete
    async fn delete(&self, key: &str) -> GatewayResult<bool>;

    /// Checks whether an object exists
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` for failures other than a missing object
    async fn exists(&self, key: &str) -> GatewayResult<bool>;

    /// Fetches the current metadata of an object
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the key does not exist
    async fn stat(&self, key: &str) -> GatewayResult<ObjectMetadata>;
}
