use chrono::{DateTime, Utc};

use super::MediaType;

/// Second-resolution UTC timestamp embedded in every allocated path
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Allocates the store-relative key for a new upload
///
/// Layout is `{media_type}s/{folder}/{YYYYMMDD_HHMMSS}_{file_name}`. The timestamp is
/// the only source of uniqueness: two uploads of the same name into the same folder
/// within one second get the same key.
#[must_use]
pub fn allocate_path(folder: &str, media_type: MediaType, file_name: &str) -> String {
    allocate_path_at(folder, media_type, file_name, Utc::now())
}

/// [`allocate_path`] at a fixed instant
#[must_use]
pub fn allocate_path_at(
    folder: &str,
    media_type: MediaType,
    file_name: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}/{folder}/{}_{file_name}",
        media_type.path_prefix(),
        at.format(TIMESTAMP_FORMAT)
    )
}
