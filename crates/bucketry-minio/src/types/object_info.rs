//! Object metadata as reported by the backend.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::content_type::OCTET_STREAM;

/// Size, integrity tag and content type of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Integrity tag (ETag) assigned by the backend.
    pub etag: String,
    /// MIME type recorded with the object.
    pub content_type: String,
    /// Last modification time, when the backend reports one.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
}

impl ObjectMetadata {
    /// Creates metadata with the given size and etag and no content type.
    pub fn new(size: u64, etag: impl Into<String>) -> Self {
        Self {
            size,
            etag: etag.into(),
            content_type: OCTET_STREAM.to_string(),
            last_modified: None,
        }
    }

    /// Sets the content type; blank values keep `application/octet-stream`.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        if !content_type.trim().is_empty() {
            self.content_type = content_type;
        }
        self
    }

    /// Sets the last modification time.
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: OffsetDateTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_blank_content_type_defaults() {
        let metadata = ObjectMetadata::new(10, "abc").with_content_type("  ");
        assert_eq!(metadata.content_type, "application/octet-stream");

        let metadata = metadata.with_content_type("image/png");
        assert_eq!(metadata.content_type, "image/png");
    }

    #[test]
    fn test_serializes_rfc3339() {
        let metadata = ObjectMetadata::new(3, "etag")
            .with_last_modified(datetime!(2024-01-15 10:30:00 UTC));
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("2024-01-15T10:30:00Z"));
    }
}
