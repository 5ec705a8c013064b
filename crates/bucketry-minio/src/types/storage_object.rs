//! Uniform result of an upload or download.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::ser::{Serialize, Serializer};
use serde::{Deserialize, Serialize as DeriveSerialize};
use strum::{Display, EnumString, IntoStaticStr};
use time::OffsetDateTime;

use crate::backend::ObjectStream;
use crate::format::{readable_elapsed, readable_size};
use crate::naming::{derive_access_locator, derive_display_name};
use crate::types::{ObjectKey, ObjectMetadata};

/// Which facade operation produced a [`StorageObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeriveSerialize, Deserialize)]
#[derive(Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OperationKind {
    Upload,
    Download,
}

/// What a download hands back besides the descriptor itself.
pub(crate) enum Payload {
    /// Uploads carry no payload.
    None,
    /// Open read stream owned by the caller.
    Stream(ObjectStream),
    /// File written by a download.
    File(PathBuf),
}

/// Descriptor of one completed upload or download.
///
/// Uploads carry neither a stream nor a local path. Downloads carry exactly
/// one of them, depending on the entry point used. A stream handed out by
/// [`StorageObject::into_stream`] belongs to the caller; dropping it closes
/// the underlying connection.
pub struct StorageObject {
    kind: OperationKind,
    bucket: String,
    key: ObjectKey,
    metadata: ObjectMetadata,
    access_locator: String,
    size_label: String,
    elapsed: Duration,
    elapsed_label: String,
    payload: Payload,
}

impl StorageObject {
    pub(crate) fn new(
        kind: OperationKind,
        bucket: impl Into<String>,
        key: ObjectKey,
        metadata: ObjectMetadata,
        elapsed: Duration,
        payload: Payload,
    ) -> Self {
        let bucket = bucket.into();
        Self {
            kind,
            access_locator: derive_access_locator(&bucket, key.as_str()),
            size_label: readable_size(metadata.size),
            elapsed_label: readable_elapsed(elapsed),
            bucket,
            key,
            metadata,
            elapsed,
            payload,
        }
    }

    /// Operation that produced this descriptor.
    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Integrity tag returned by the backend.
    #[inline]
    pub fn etag(&self) -> &str {
        &self.metadata.etag
    }

    #[inline]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[inline]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    #[inline]
    pub fn content_type(&self) -> &str {
        &self.metadata.content_type
    }

    /// Bucket-qualified key, `bucket/key`.
    ///
    /// This is a logical locator, not a URL; prefix it with a scheme and
    /// host to obtain a resolvable address.
    #[inline]
    pub fn access_locator(&self) -> &str {
        &self.access_locator
    }

    /// Final path segment of the key.
    #[inline]
    pub fn display_name(&self) -> &str {
        derive_display_name(self.key.as_str())
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    /// Size in human-readable form, such as `1.2 MB`.
    #[inline]
    pub fn size_label(&self) -> &str {
        &self.size_label
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Elapsed time in human-readable form, such as `1.25s`.
    #[inline]
    pub fn elapsed_label(&self) -> &str {
        &self.elapsed_label
    }

    /// Last modification time reported by the backend, for downloads.
    #[inline]
    pub fn last_modified(&self) -> Option<OffsetDateTime> {
        self.metadata.last_modified
    }

    /// Path of the downloaded file, for file downloads.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.payload {
            Payload::File(path) => Some(path),
            _ => None,
        }
    }

    /// Returns whether this descriptor still holds an unclaimed stream.
    pub fn has_stream(&self) -> bool {
        matches!(self.payload, Payload::Stream(_))
    }

    /// Takes ownership of the download stream, leaving the descriptor without one.
    pub fn take_stream(&mut self) -> Option<ObjectStream> {
        match std::mem::replace(&mut self.payload, Payload::None) {
            Payload::Stream(stream) => Some(stream),
            other => {
                self.payload = other;
                None
            }
        }
    }

    /// Consumes the descriptor and returns the download stream, if any.
    pub fn into_stream(mut self) -> Option<ObjectStream> {
        self.take_stream()
    }
}

impl fmt::Debug for StorageObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageObject")
            .field("kind", &self.kind)
            .field("bucket", &self.bucket)
            .field("key", &self.key.as_str())
            .field("etag", &self.metadata.etag)
            .field("content_type", &self.metadata.content_type)
            .field("size", &self.metadata.size)
            .field("elapsed", &self.elapsed)
            .field("local_path", &self.local_path())
            .field("has_stream", &self.has_stream())
            .finish()
    }
}

#[derive(DeriveSerialize)]
struct Report<'a> {
    kind: OperationKind,
    etag: &'a str,
    bucket: &'a str,
    key: &'a str,
    content_type: &'a str,
    access_locator: &'a str,
    display_name: &'a str,
    size: u64,
    size_label: &'a str,
    elapsed_label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_path: Option<&'a Path>,
}

impl Serialize for StorageObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Report {
            kind: self.kind,
            etag: self.etag(),
            bucket: &self.bucket,
            key: self.key.as_str(),
            content_type: self.content_type(),
            access_locator: &self.access_locator,
            display_name: self.display_name(),
            size: self.size(),
            size_label: &self.size_label,
            elapsed_label: &self.elapsed_label,
            local_path: self.local_path(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn metadata(size: u64) -> ObjectMetadata {
        ObjectMetadata::new(size, "0123abcd").with_content_type("application/pdf")
    }

    fn key() -> ObjectKey {
        ObjectKey::new("202401/report-0190f3a1.pdf").unwrap()
    }

    #[test]
    fn test_upload_descriptor() {
        let object = StorageObject::new(
            OperationKind::Upload,
            "media",
            key(),
            metadata(0),
            Duration::from_millis(12),
            Payload::None,
        );

        assert_eq!(object.kind(), OperationKind::Upload);
        assert_eq!(object.access_locator(), "media/202401/report-0190f3a1.pdf");
        assert_eq!(object.display_name(), "report-0190f3a1.pdf");
        assert_eq!(object.size_label(), "0 B");
        assert_eq!(object.elapsed_label(), "12ms");
        assert!(object.local_path().is_none());
        assert!(!object.has_stream());
    }

    #[test]
    fn test_stream_ownership_moves_out() {
        let stream: ObjectStream = Box::pin(futures::stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(b"x"),
        )]));
        let mut object = StorageObject::new(
            OperationKind::Download,
            "media",
            key(),
            metadata(1),
            Duration::ZERO,
            Payload::Stream(stream),
        );

        assert!(object.has_stream());
        assert!(object.take_stream().is_some());
        assert!(object.take_stream().is_none());
        assert!(!object.has_stream());
    }

    #[test]
    fn test_file_descriptor_serializes_path() {
        let object = StorageObject::new(
            OperationKind::Download,
            "media",
            key(),
            metadata(2048),
            Duration::from_secs(2),
            Payload::File(PathBuf::from("/tmp/report-0190f3a1.pdf")),
        );

        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["kind"], "download");
        assert_eq!(json["size_label"], "2 kB");
        assert_eq!(json["local_path"], "/tmp/report-0190f3a1.pdf");
        assert_eq!(object.kind().to_string(), "download");
    }
}
