//! Object storage backend abstraction.
//!
//! [`ObjectBackend`] is the narrow set of calls the storage facade makes on
//! an object store: bucket existence and creation, put, stat and get, plus
//! file-based upload and download built on top of them. The MinIO-backed
//! implementation lives in [`crate::client`]; an in-memory implementation is
//! available for tests behind the `test-utils` feature.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::types::ObjectMetadata;

#[cfg(any(test, feature = "test-utils"))]
mod memory;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub use memory::MemoryBackend;

/// Owned stream of object payload chunks.
pub type ObjectStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Result alias for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors reported by an [`ObjectBackend`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The bucket or object does not exist.
    #[error("Bucket or object does not exist")]
    NotFound,

    /// The bucket already exists, usually created by a concurrent caller.
    #[error("Bucket already exists")]
    AlreadyExists,

    /// Reading the payload stream failed mid-transfer.
    #[error("Payload transfer failed: {0}")]
    Transfer(#[source] io::Error),

    /// A local filesystem operation failed.
    #[error("Local I/O error: {0}")]
    Io(#[from] io::Error),

    /// Underlying MinIO client error.
    #[error("MinIO client error: {0}")]
    Client(#[from] minio::s3::error::Error),

    /// The backend refused the request for another reason.
    #[error("Backend rejected the request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Returns whether repeating the call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transfer(_) | BackendError::Client(_))
    }
}

/// Receipt returned by a successful put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Integrity tag assigned by the backend.
    pub etag: String,
    /// Bucket the object was written to.
    pub bucket: String,
    /// Key the object was written under.
    pub key: String,
}

/// Object storage operations used by the storage facade.
///
/// Implementations must be safe for concurrent use; the facade shares one
/// backend between all clones of a [`StorageClient`](crate::StorageClient).
#[async_trait]
pub trait ObjectBackend: Send + Sync + 'static {
    /// Returns whether `bucket` exists.
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool>;

    /// Creates `bucket`.
    ///
    /// Returns [`BackendError::AlreadyExists`] when the bucket is already there.
    async fn make_bucket(&self, bucket: &str) -> BackendResult<()>;

    /// Stores `body` under `bucket`/`key`.
    ///
    /// `size` is the payload length when known in advance.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectStream,
        size: Option<u64>,
        content_type: &str,
    ) -> BackendResult<PutReceipt>;

    /// Stores the file at `path` under `bucket`/`key`.
    ///
    /// The file is opened read-only and closed before this returns, whether
    /// the put succeeded or not.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> BackendResult<PutReceipt> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let body: ObjectStream = Box::pin(ReaderStream::new(file));

        self.put_object(bucket, key, body, Some(size), content_type)
            .await
    }

    /// Returns size, integrity tag and content type of an object.
    async fn stat_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata>;

    /// Opens a read stream over an object's payload.
    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectStream>;

    /// Writes an object's payload to `dest`, returning the number of bytes written.
    ///
    /// The payload goes to a temporary sibling of `dest` first and is renamed
    /// into place once complete, so a failed transfer leaves no partial file.
    /// With `overwrite = false` an existing `dest` is an error.
    async fn download_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        overwrite: bool,
    ) -> BackendResult<u64> {
        if !overwrite && tokio::fs::try_exists(dest).await? {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            )));
        }

        let mut stream = self.get_object(bucket, key).await?;
        let mut partial = PartialFile::new(dest);

        let mut file = tokio::fs::File::create(partial.path()).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(BackendError::Transfer)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(partial.path(), dest).await?;
        partial.disarm();
        Ok(written)
    }

    /// Verifies the backend is reachable.
    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}

/// Temporary sibling of a download destination.
///
/// Removed on drop unless disarmed, so an aborted or cancelled download
/// leaves nothing behind.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(dest: &Path) -> Self {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = dest.with_file_name(format!(".{name}.{}.part", Uuid::new_v4().simple()));
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
