//! Payload sources accepted by the upload operation.

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncRead;

/// Where the bytes of an upload come from.
pub enum UploadSource {
    /// An arbitrary byte stream.
    ///
    /// `size` is optional; when absent the stream is read until exhaustion.
    /// The content type is always `application/octet-stream`.
    Stream {
        reader: Pin<Box<dyn AsyncRead + Send>>,
        size: Option<u64>,
        file_name: String,
    },

    /// A file on the local filesystem.
    ///
    /// The object key is derived from the file's base name and the content
    /// type is sniffed from its leading bytes and extension.
    LocalFile(PathBuf),

    /// An upload already buffered by the host application.
    Managed(ManagedUpload),
}

impl UploadSource {
    /// Creates a stream source from any owned reader.
    pub fn stream(
        reader: impl AsyncRead + Send + 'static,
        size: Option<u64>,
        file_name: impl Into<String>,
    ) -> Self {
        Self::Stream {
            reader: Box::pin(reader),
            size,
            file_name: file_name.into(),
        }
    }

    /// Creates a local file source.
    pub fn local_file(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile(path.into())
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::LocalFile(_) => "local_file",
            Self::Managed(_) => "managed",
        }
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream {
                size, file_name, ..
            } => f
                .debug_struct("Stream")
                .field("size", size)
                .field("file_name", file_name)
                .finish_non_exhaustive(),
            Self::LocalFile(path) => f.debug_tuple("LocalFile").field(path).finish(),
            Self::Managed(upload) => f.debug_tuple("Managed").field(upload).finish(),
        }
    }
}

impl From<ManagedUpload> for UploadSource {
    fn from(upload: ManagedUpload) -> Self {
        Self::Managed(upload)
    }
}

/// An upload part received and buffered by the host application, for
/// example one field of an HTTP multipart request.
#[derive(Clone)]
pub struct ManagedUpload {
    /// Original file name as sent by the client.
    pub file_name: String,
    /// Declared content type, if the client sent one.
    pub content_type: Option<String>,
    /// Buffered payload.
    pub data: Bytes,
}

impl ManagedUpload {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Payload length in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl fmt::Debug for ManagedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}
