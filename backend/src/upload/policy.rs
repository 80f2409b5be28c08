use validator::Validate;

use super::{PolicyError, UploadRequest};

/// Checks an upload request against the upload policy
///
/// Checks run in a fixed order so a request with several problems is always reported
/// the same way: numeric and length limits first, then the content type against the
/// declared media type, then path segments.
///
/// Two kinds of rejection go beyond the expiry, size and content-type rules:
/// `file_name` (1..=255) and `folder` (1..=512) length limits, reported as
/// `OutOfRange`, and `.`/`..` path segments, reported as `InvalidPath` because a
/// client or proxy may normalize them so the key written differs from the one
/// returned. Separators and every other character still pass through unchanged.
///
/// # Errors
///
/// Returns the first `PolicyError` found
pub fn validate(request: &UploadRequest) -> Result<(), PolicyError> {
    request.validate()?;

    if !request.media_type.accepts(&request.content_type) {
        return Err(PolicyError::ContentTypeMismatch {
            media_type: request.media_type,
            content_type: request.content_type.clone(),
        });
    }

    check_path_segments("folder", &request.folder)?;
    check_path_segments("file_name", &request.file_name)?;

    Ok(())
}

/// Rejects `.` and `..` segments; every other character is kept as-is
///
/// # Errors
///
/// Returns `PolicyError::InvalidPath` naming `field`
pub fn check_path_segments(field: &'static str, value: &str) -> Result<(), PolicyError> {
    if value.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(PolicyError::InvalidPath {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::MediaType;

    fn request(media_type: MediaType, content_type: &str) -> UploadRequest {
        UploadRequest {
            file_name: "sample.bin".to_string(),
            content_type: content_type.to_string(),
            media_type,
            folder: "uploads".to_string(),
            expires_in_minutes: 60,
            max_file_size_mb: 10,
        }
    }

    #[test]
    fn test_expiry_bounds() {
        for (minutes, ok) in [(0, false), (1, true), (1440, true), (1441, false), (-5, false)] {
            let mut req = request(MediaType::Image, "image/png");
            req.expires_in_minutes = minutes;
            assert_eq!(validate(&req).is_ok(), ok, "expires_in_minutes = {minutes}");
        }
    }

    #[test]
    fn test_size_bounds() {
        for (size, ok) in [(0, false), (1, true), (100, true), (101, false)] {
            let mut req = request(MediaType::Image, "image/png");
            req.max_file_size_mb = size;
            assert_eq!(validate(&req).is_ok(), ok, "max_file_size_mb = {size}");
        }
    }

    #[test]
    fn test_out_of_range_names_the_field() {
        let mut req = request(MediaType::Image, "image/png");
        req.max_file_size_mb = 101;

        match validate(&req) {
            Err(PolicyError::OutOfRange { field, detail }) => {
                assert_eq!(field, "max_file_size_mb");
                assert_eq!(detail, "must be between 1 and 100");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_image_content_types() {
        assert!(validate(&request(MediaType::Image, "image/png")).is_ok());
        assert!(validate(&request(MediaType::Image, "image/jpeg")).is_ok());
        assert!(matches!(
            validate(&request(MediaType::Image, "audio/mpeg")),
            Err(PolicyError::ContentTypeMismatch { .. })
        ));
        assert!(matches!(
            validate(&request(MediaType::Image, "application/pdf")),
            Err(PolicyError::ContentTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_audio_content_types() {
        assert!(validate(&request(MediaType::Audio, "audio/mpeg")).is_ok());
        assert!(validate(&request(MediaType::Audio, "audio/wav")).is_ok());
        assert!(validate(&request(MediaType::Audio, "video/mp4")).is_ok());
        assert!(validate(&request(MediaType::Audio, "video/quicktime")).is_ok());
        assert!(validate(&request(MediaType::Audio, "video/webm")).is_err());
        assert!(validate(&request(MediaType::Audio, "image/png")).is_err());
    }

    #[test]
    fn test_content_types_are_not_normalized() {
        for (media_type, content_type) in [
            (MediaType::Audio, "video/mp4; codecs=avc1"),
            (MediaType::Audio, "VIDEO/QUICKTIME"),
            (MediaType::Audio, "video/mp4;foo=bar"),
            (MediaType::Image, "IMAGE/PNG"),
            (MediaType::Image, "image/"),
        ] {
            assert!(
                matches!(
                    validate(&request(media_type, content_type)),
                    Err(PolicyError::ContentTypeMismatch { .. })
                ),
                "{media_type} accepted {content_type}"
            );
        }
    }

    #[test]
    fn test_ranges_are_checked_before_content_type() {
        let mut req = request(MediaType::Image, "application/pdf");
        req.expires_in_minutes = 0;

        assert!(matches!(
            validate(&req),
            Err(PolicyError::OutOfRange { field, .. }) if field == "expires_in_minutes"
        ));
    }

    #[test]
    fn test_name_lengths() {
        let mut req = request(MediaType::Image, "image/png");
        req.file_name = String::new();
        assert!(matches!(
            validate(&req),
            Err(PolicyError::OutOfRange { field, .. }) if field == "file_name"
        ));

        req.file_name = "a".repeat(256);
        assert!(validate(&req).is_err());

        req.file_name = "a".repeat(255);
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn test_path_segments() {
        let mut req = request(MediaType::Image, "image/png");
        req.folder = "farm/2024".to_string();
        assert!(validate(&req).is_ok());

        req.folder = "../secrets".to_string();
        assert!(matches!(
            validate(&req),
            Err(PolicyError::InvalidPath { field: "folder", .. })
        ));

        req.folder = "uploads".to_string();
        req.file_name = "nested/a.png".to_string();
        assert!(validate(&req).is_ok());

        req.file_name = "x/./a.png".to_string();
        assert!(matches!(
            validate(&req),
            Err(PolicyError::InvalidPath { field: "file_name", .. })
        ));

        req.file_name = "..hidden.png".to_string();
        assert!(validate(&req).is_ok());
    }
}
