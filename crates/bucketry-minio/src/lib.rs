#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]
#![allow(clippy::result_large_err)]

use std::path::PathBuf;
use std::time::Duration;

// Tracing target constants for consistent logging
pub const TRACING_TARGET_CLIENT: &str = "bucketry_minio::client";
pub const TRACING_TARGET_OPERATIONS: &str = "bucketry_minio::operations";
pub const TRACING_TARGET_BUCKETS: &str = "bucketry_minio::buckets";
pub const TRACING_TARGET_OBJECTS: &str = "bucketry_minio::objects";

pub mod backend;
pub mod client;
pub mod content_type;
pub mod format;
pub mod naming;
pub mod operations;
pub mod types;

// Re-export for convenience
pub use crate::backend::{BackendError, ObjectBackend, ObjectStream, PutReceipt};
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub use crate::backend::MemoryBackend;
pub use crate::client::{MinioBackend, StorageConfig, StorageCredentials};
pub use crate::operations::StorageClient;
pub use crate::types::{
    ManagedUpload, ObjectKey, ObjectMetadata, OperationKind, StorageObject, UploadSource,
};

/// Error type for the storage facade.
///
/// Every variant that originates from a backend call keeps the backend error
/// as its [`source`](std::error::Error::source) together with the bucket and
/// object key the call was made for.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller-supplied object key is not usable.
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },

    /// Checking for or creating the bucket failed.
    #[error("Failed to provision bucket '{bucket}'")]
    BucketProvision {
        bucket: String,
        #[source]
        source: BackendError,
    },

    /// The backend refused or failed the put.
    #[error("Upload of '{key}' to bucket '{bucket}' failed")]
    UploadFailed {
        bucket: String,
        key: String,
        #[source]
        source: BackendError,
    },

    /// Reading the object from the backend failed.
    #[error("Download of '{key}' from bucket '{bucket}' failed")]
    DownloadFailed {
        bucket: String,
        key: String,
        #[source]
        source: BackendError,
    },

    /// The object (or its bucket) does not exist.
    #[error("Object '{key}' not found in bucket '{bucket}'")]
    ObjectNotFound {
        bucket: String,
        key: String,
        #[source]
        source: BackendError,
    },

    /// The metadata query failed for a reason other than a missing object.
    #[error("Metadata query for '{key}' in bucket '{bucket}' failed")]
    MetadataQueryFailed {
        bucket: String,
        key: String,
        #[source]
        source: BackendError,
    },

    /// The object key would resolve to a path outside the target directory.
    #[error("Object key '{key}' does not resolve to a file inside '{}'", .directory.display())]
    InvalidPath {
        directory: PathBuf,
        key: String,
    },

    /// Reading or writing a local file failed.
    #[error("Local file operation on '{}' failed", .path.display())]
    LocalWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend failed its health check.
    #[error("Storage backend is unavailable")]
    Unavailable {
        #[source]
        source: BackendError,
    },

    /// The caller cancelled the operation.
    #[error("Operation '{operation}' on bucket '{bucket}' was cancelled")]
    OperationCancelled {
        operation: &'static str,
        bucket: String,
    },

    /// The operation did not finish before its deadline.
    #[error("Operation '{operation}' on bucket '{bucket}' exceeded its deadline of {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        bucket: String,
        timeout: Duration,
    },
}

/// Stable, matchable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Config,
    InvalidKey,
    BucketProvision,
    UploadFailed,
    DownloadFailed,
    ObjectNotFound,
    MetadataQueryFailed,
    InvalidPath,
    LocalWriteFailed,
    Unavailable,
    OperationCancelled,
    DeadlineExceeded,
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::InvalidKey { .. } => ErrorKind::InvalidKey,
            Error::BucketProvision { .. } => ErrorKind::BucketProvision,
            Error::UploadFailed { .. } => ErrorKind::UploadFailed,
            Error::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Error::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            Error::MetadataQueryFailed { .. } => ErrorKind::MetadataQueryFailed,
            Error::InvalidPath { .. } => ErrorKind::InvalidPath,
            Error::LocalWriteFailed { .. } => ErrorKind::LocalWriteFailed,
            Error::Unavailable { .. } => ErrorKind::Unavailable,
            Error::OperationCancelled { .. } => ErrorKind::OperationCancelled,
            Error::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        }
    }

    /// Returns whether this error indicates a missing object or bucket.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ObjectNotFound { .. })
    }

    /// Returns whether this error indicates a configuration issue.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Returns whether repeating the same call may succeed.
    ///
    /// Nothing is retried internally. A failed upload should be repeated by
    /// the caller with the same object key so no duplicate object is left
    /// behind.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::DeadlineExceeded { .. } => true,
            Error::BucketProvision { source, .. }
            | Error::UploadFailed { source, .. }
            | Error::DownloadFailed { source, .. }
            | Error::MetadataQueryFailed { source, .. }
            | Error::Unavailable { source } => source.is_transient(),
            Error::Config(_)
            | Error::InvalidKey { .. }
            | Error::ObjectNotFound { .. }
            | Error::InvalidPath { .. }
            | Error::LocalWriteFailed { .. }
            | Error::OperationCancelled { .. } => false,
        }
    }

    /// Returns the bucket the failed operation targeted, if any.
    pub fn bucket(&self) -> Option<&str> {
        match self {
            Error::BucketProvision { bucket, .. }
            | Error::UploadFailed { bucket, .. }
            | Error::DownloadFailed { bucket, .. }
            | Error::ObjectNotFound { bucket, .. }
            | Error::MetadataQueryFailed { bucket, .. }
            | Error::OperationCancelled { bucket, .. }
            | Error::DeadlineExceeded { bucket, .. } => Some(bucket),
            Error::Config(_)
            | Error::InvalidKey { .. }
            | Error::InvalidPath { .. }
            | Error::LocalWriteFailed { .. }
            | Error::Unavailable { .. } => None,
        }
    }
}

/// Specialized [`Result`] type for storage operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
