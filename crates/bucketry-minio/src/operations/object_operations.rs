//! Upload, stat and download operations.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, instrument};

use super::StorageClient;
use crate::backend::{BackendError, ObjectStream};
use crate::content_type::{self, OCTET_STREAM};
use crate::naming::{derive_local_path, derive_object_key};
use crate::types::{ObjectKey, ObjectMetadata, OperationKind, Payload, StorageObject, UploadSource};
use crate::{Error, Result, TRACING_TARGET_OBJECTS};

/// Wraps `stream` so every chunk that passes through is added to `counter`.
fn counted<S>(stream: S, counter: Arc<AtomicU64>) -> ObjectStream
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    Box::pin(stream.inspect(move |chunk| {
        if let Ok(bytes) = chunk {
            counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
    }))
}

/// Maps a failed object lookup onto the caller-facing taxonomy.
fn lookup_error(
    bucket: &str,
    key: &ObjectKey,
    source: BackendError,
    other: fn(String, String, BackendError) -> Error,
) -> Error {
    match source {
        BackendError::NotFound => Error::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        },
        source => other(bucket.to_string(), key.to_string(), source),
    }
}

fn metadata_query_failed(bucket: String, key: String, source: BackendError) -> Error {
    Error::MetadataQueryFailed {
        bucket,
        key,
        source,
    }
}

fn download_failed(bucket: String, key: String, source: BackendError) -> Error {
    Error::DownloadFailed {
        bucket,
        key,
        source,
    }
}

impl StorageClient {
    /// Uploads `source` to `bucket`, or to the default bucket when `None`.
    ///
    /// The bucket is created if missing and a fresh object key is derived
    /// from the source's file name. The returned descriptor carries the
    /// backend's etag and the number of bytes actually sent.
    ///
    /// A failed upload leaves no object behind and is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketProvision`] if the bucket cannot be ensured and
    /// [`Error::UploadFailed`] if reading the source or the put fails.
    #[instrument(
        skip(self, bucket, source),
        target = TRACING_TARGET_OBJECTS,
        fields(bucket = %self.resolve_bucket(bucket), source = source.label())
    )]
    pub async fn upload(&self, bucket: Option<&str>, source: UploadSource) -> Result<StorageObject> {
        self.upload_keyed(bucket, None, source).await
    }

    /// Uploads `source` under an explicit `key` instead of a derived one.
    ///
    /// Retrying a failed [`upload`](Self::upload) with the key reported by
    /// [`Error::UploadFailed`] replaces any partial result instead of
    /// leaving a second object behind.
    #[instrument(
        skip(self, bucket, source),
        target = TRACING_TARGET_OBJECTS,
        fields(bucket = %self.resolve_bucket(bucket), key = %key, source = source.label())
    )]
    pub async fn upload_as(
        &self,
        bucket: Option<&str>,
        key: ObjectKey,
        source: UploadSource,
    ) -> Result<StorageObject> {
        self.upload_keyed(bucket, Some(key), source).await
    }

    /// Uploads `source` to the default bucket.
    pub async fn upload_default(&self, source: UploadSource) -> Result<StorageObject> {
        self.upload(None, source).await
    }

    async fn upload_keyed(
        &self,
        bucket: Option<&str>,
        key: Option<ObjectKey>,
        source: UploadSource,
    ) -> Result<StorageObject> {
        let bucket = self.resolve_bucket(bucket);
        debug!(
            target: TRACING_TARGET_OBJECTS,
            bucket = %bucket,
            source = source.label(),
            "Uploading object"
        );

        let start = Instant::now();
        let result = self
            .guarded("upload", bucket, self.upload_unguarded(bucket, key, source))
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok((key, metadata)) => {
                info!(
                    target: TRACING_TARGET_OBJECTS,
                    bucket = %bucket,
                    key = %key,
                    size = metadata.size,
                    etag = %metadata.etag,
                    elapsed = ?elapsed,
                    "Object uploaded successfully"
                );
                Ok(StorageObject::new(
                    OperationKind::Upload,
                    bucket,
                    key,
                    metadata,
                    elapsed,
                    Payload::None,
                ))
            }
            Err(e) => {
                error!(
                    target: TRACING_TARGET_OBJECTS,
                    bucket = %bucket,
                    error = %e,
                    elapsed = ?elapsed,
                    "Failed to upload object"
                );
                Err(e)
            }
        }
    }

    async fn upload_unguarded(
        &self,
        bucket: &str,
        key: Option<ObjectKey>,
        source: UploadSource,
    ) -> Result<(ObjectKey, ObjectMetadata)> {
        let key_for = |file_name: &str| match &key {
            Some(key) => Ok(key.clone()),
            None => derive_object_key(file_name),
        };

        self.provision(bucket).await?;

        match source {
            UploadSource::Stream {
                reader,
                size,
                file_name,
            } => {
                let key = key_for(&*file_name)?;
                let sent = Arc::new(AtomicU64::new(0));
                let body = counted(ReaderStream::new(reader), sent.clone());

                let receipt = self
                    .backend
                    .put_object(bucket, key.as_str(), body, size, OCTET_STREAM)
                    .await
                    .map_err(|source| upload_failed(bucket, &key, source))?;

                let metadata = ObjectMetadata::new(sent.load(Ordering::Relaxed), receipt.etag);
                Ok((key, metadata))
            }
            UploadSource::LocalFile(path) => {
                let file_name = path.to_string_lossy();
                let key = key_for(&*file_name)?;

                let (content_type, size) = local_file_details(&path)
                    .await
                    .map_err(|source| upload_failed(bucket, &key, BackendError::Io(source)))?;

                let receipt = self
                    .backend
                    .upload_file(bucket, key.as_str(), &path, content_type)
                    .await
                    .map_err(|source| upload_failed(bucket, &key, source))?;

                let metadata =
                    ObjectMetadata::new(size, receipt.etag).with_content_type(content_type);
                Ok((key, metadata))
            }
            UploadSource::Managed(upload) => {
                let key = key_for(upload.file_name.as_str())?;
                let content_type = content_type::normalize_declared(upload.content_type.as_deref());
                let size = upload.size();

                let sent = Arc::new(AtomicU64::new(0));
                let data = upload.data;
                let body = counted(
                    futures::stream::once(async move { Ok::<_, io::Error>(data) }),
                    sent.clone(),
                );

                let receipt = self
                    .backend
                    .put_object(bucket, key.as_str(), body, Some(size), &content_type)
                    .await
                    .map_err(|source| upload_failed(bucket, &key, source))?;

                let metadata = ObjectMetadata::new(sent.load(Ordering::Relaxed), receipt.etag)
                    .with_content_type(content_type);
                Ok((key, metadata))
            }
        }
    }

    /// Returns size, etag and content type of an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for an unusable key,
    /// [`Error::ObjectNotFound`] if the object does not exist and
    /// [`Error::MetadataQueryFailed`] for any other backend failure.
    #[instrument(skip(self, bucket), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.resolve_bucket(bucket)))]
    pub async fn stat_object(&self, bucket: Option<&str>, key: &str) -> Result<ObjectMetadata> {
        let bucket = self.resolve_bucket(bucket);
        let key = ObjectKey::new(key)?;
        debug!(target: TRACING_TARGET_OBJECTS, bucket = %bucket, key = %key, "Getting object info");

        self.guarded("stat_object", bucket, async {
            self.backend
                .stat_object(bucket, key.as_str())
                .await
                .map_err(|source| lookup_error(bucket, &key, source, metadata_query_failed))
        })
        .await
    }

    /// Opens a read stream over an object.
    ///
    /// The stream in the returned descriptor belongs to the caller, who
    /// releases it by dropping it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectNotFound`] if the object does not exist and
    /// [`Error::DownloadFailed`] for any other backend failure.
    #[instrument(skip(self, bucket), target = TRACING_TARGET_OBJECTS, fields(bucket = %self.resolve_bucket(bucket)))]
    pub async fn download_to_stream(
        &self,
        bucket: Option<&str>,
        key: &str,
    ) -> Result<StorageObject> {
        let bucket = self.resolve_bucket(bucket);
        let key = ObjectKey::new(key)?;
        debug!(target: TRACING_TARGET_OBJECTS, bucket = %bucket, key = %key, "Opening object stream");

        let start = Instant::now();
        let result = self
            .guarded("download_to_stream", bucket, async {
                let metadata = self
                    .backend
                    .stat_object(bucket, key.as_str())
                    .await
                    .map_err(|source| lookup_error(bucket, &key, source, download_failed))?;
                let stream = self
                    .backend
                    .get_object(bucket, key.as_str())
                    .await
                    .map_err(|source| lookup_error(bucket, &key, source, download_failed))?;
                Ok((metadata, stream))
            })
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok((metadata, stream)) => {
                info!(
                    target: TRACING_TARGET_OBJECTS,
                    bucket = %bucket,
                    key = %key,
                    size = metadata.size,
                    elapsed = ?elapsed,
                    "Object stream opened"
                );
                Ok(StorageObject::new(
                    OperationKind::Download,
                    bucket,
                    key,
                    metadata,
                    elapsed,
                    Payload::Stream(stream),
                ))
            }
            Err(e) => {
                error!(
                    target: TRACING_TARGET_OBJECTS,
                    bucket = %bucket,
                    key = %key,
                    error = %e,
                    elapsed = ?elapsed,
                    "Failed to open object stream"
                );
                Err(e)
            }
        }
    }

    /// Downloads an object into `directory`, replacing any file of the same name.
    ///
    /// The file is named after the key's final segment. The target path is
    /// resolved before any network call, so a key that would escape
    /// `directory` fails without touching the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for keys that do not name a file inside
    /// `directory`, [`Error::ObjectNotFound`] if the object does not exist,
    /// [`Error::LocalWriteFailed`] if the file cannot be written and
    /// [`Error::DownloadFailed`] for any other backend failure.
    #[instrument(
        skip(self, bucket, directory),
        target = TRACING_TARGET_OBJECTS,
        fields(bucket = %self.resolve_bucket(bucket), directory = %directory.display())
    )]
    pub async fn download_to_file(
        &self,
        bucket: Option<&str>,
        key: &str,
        directory: &Path,
    ) -> Result<StorageObject> {
        let bucket = self.resolve_bucket(bucket);
        let key = ObjectKey::new(key)?;
        let path = derive_local_path(directory, key.as_str())?;
        debug!(
            target: TRACING_TARGET_OBJECTS,
            bucket = %bucket,
            key = %key,
            path = %path.display(),
            "Downloading object to file"
        );

        let start = Instant::now();
        let result = self
            .guarded("download_to_file", bucket, async {
                let metadata = self
                    .backend
                    .stat_object(bucket, key.as_str())
                    .await
                    .map_err(|source| lookup_error(bucket, &key, source, download_failed))?;

                let written = self
                    .backend
                    .download_to_file(bucket, key.as_str(), &path, true)
                    .await
                    .map_err(|source| match source {
                        BackendError::Io(source) => Error::LocalWriteFailed {
                            path: path.clone(),
                            source,
                        },
                        source => lookup_error(bucket, &key, source, download_failed),
                    })?;

                Ok(ObjectMetadata {
                    size: written,
                    ..metadata
                })
            })
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok(metadata) => {
                info!(
                    target: TRACING_TARGET_OBJECTS,
                    bucket = %bucket,
                    key = %key,
                    size = metadata.size,
                    path = %path.display(),
                    elapsed = ?elapsed,
                    "Object downloaded successfully"
                );
                Ok(StorageObject::new(
                    OperationKind::Download,
                    bucket,
                    key,
                    metadata,
                    elapsed,
                    Payload::File(path),
                ))
            }
            Err(e) => {
                error!(
                    target: TRACING_TARGET_OBJECTS,
                    bucket = %bucket,
                    key = %key,
                    error = %e,
                    elapsed = ?elapsed,
                    "Failed to download object"
                );
                Err(e)
            }
        }
    }
}

fn upload_failed(bucket: &str, key: &ObjectKey, source: BackendError) -> Error {
    Error::UploadFailed {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source,
    }
}

/// Sniffs the content type and reads the size of a local file.
async fn local_file_details(path: &Path) -> io::Result<(&'static str, u64)> {
    let content_type = content_type::detect_file(path).await?;
    let size = tokio::fs::metadata(path).await?.len();
    Ok((content_type, size))
}
