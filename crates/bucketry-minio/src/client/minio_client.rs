//! MinIO-backed implementation of [`ObjectBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use minio::s3::Client;
use minio::s3::builders::ObjectContent;
use minio::s3::creds::StaticProvider;
use minio::s3::error::{Error as MinioError, ErrorCode};
use minio::s3::types::S3Api;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument};

use crate::backend::{BackendError, BackendResult, ObjectBackend, ObjectStream, PutReceipt};
use crate::content_type::OCTET_STREAM;
use crate::types::ObjectMetadata;
use crate::{Error, Result, StorageConfig, TRACING_TARGET_CLIENT, TRACING_TARGET_OPERATIONS};

/// S3 error code without a dedicated [`ErrorCode`] variant.
const BUCKET_ALREADY_EXISTS: &str = "BucketAlreadyExists";

/// Object backend talking to a MinIO (or S3-compatible) server.
///
/// Cloning is cheap; clones share the underlying HTTP client.
#[derive(Clone)]
pub struct MinioBackend {
    inner: Client,
    config: Arc<StorageConfig>,
}

impl MinioBackend {
    /// Creates a backend from `config` without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or the
    /// MinIO client cannot be built from it.
    #[instrument(skip(config), target = TRACING_TARGET_CLIENT, fields(endpoint = %config.endpoint_masked()))]
    pub fn new(config: StorageConfig) -> Result<Self> {
        info!(target: TRACING_TARGET_CLIENT, "Initializing MinIO client");

        config.validate().map_err(|e| {
            error!(target: TRACING_TARGET_CLIENT, error = %e, "Configuration validation failed");
            e
        })?;

        let provider = StaticProvider::from(&config.credentials());
        let endpoint = config.endpoint.to_string().parse().map_err(|e| {
            error!(target: TRACING_TARGET_CLIENT, error = %e, "Invalid endpoint URL");
            Error::Config(format!("Invalid endpoint URL: {e}"))
        })?;

        let inner = Client::new(endpoint, Some(Box::new(provider)), None, None).map_err(|e| {
            error!(target: TRACING_TARGET_CLIENT, error = %e, "Failed to create MinIO client");
            Error::Config(format!("Failed to build MinIO client: {e}"))
        })?;

        info!(
            target: TRACING_TARGET_CLIENT,
            endpoint = %config.endpoint_masked(),
            secure = config.is_secure(),
            bucket = %config.bucket_name,
            "MinIO client initialized"
        );

        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    /// Returns the configuration this backend was built from.
    #[inline]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Lists buckets to verify the server is reachable and the credentials work.
    #[instrument(skip(self), target = TRACING_TARGET_OPERATIONS)]
    pub async fn test_connection(&self) -> BackendResult<()> {
        debug!(target: TRACING_TARGET_OPERATIONS, "Testing MinIO connection");

        let start = std::time::Instant::now();
        let result = self.inner.list_buckets().send().await;
        let elapsed = start.elapsed();

        match result {
            Ok(_) => {
                debug!(
                    target: TRACING_TARGET_OPERATIONS,
                    elapsed = ?elapsed,
                    "Connection test successful"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    target: TRACING_TARGET_OPERATIONS,
                    error = %e,
                    elapsed = ?elapsed,
                    "Connection test failed"
                );
                Err(classify(e))
            }
        }
    }
}

/// Maps a MinIO error onto the backend error taxonomy by its S3 error code.
///
/// Only the typed code of an S3 error response is inspected; bucket and
/// object names never influence the outcome.
fn classify(error: MinioError) -> BackendError {
    let known = match &error {
        MinioError::S3Error(response) => match &response.code {
            ErrorCode::NoSuchKey | ErrorCode::NoSuchBucket | ErrorCode::ResourceNotFound => {
                Some(BackendError::NotFound)
            }
            ErrorCode::BucketAlreadyOwnedByYou => Some(BackendError::AlreadyExists),
            ErrorCode::OtherError(code) if code.eq_ignore_ascii_case(BUCKET_ALREADY_EXISTS) => {
                Some(BackendError::AlreadyExists)
            }
            _ => None,
        },
        _ => None,
    };

    known.unwrap_or(BackendError::Client(error))
}

#[async_trait]
impl ObjectBackend for MinioBackend {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        let response = self
            .inner
            .bucket_exists(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(response.exists)
    }

    async fn make_bucket(&self, bucket: &str) -> BackendResult<()> {
        self.inner
            .create_bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectStream,
        size: Option<u64>,
        content_type: &str,
    ) -> BackendResult<PutReceipt> {
        let content = ObjectContent::new_from_stream(body, size);
        let response = self
            .inner
            .put_object_content(bucket, key, content)
            .content_type(content_type.to_string())
            .send()
            .await
            .map_err(classify)?;

        Ok(PutReceipt {
            etag: response.etag,
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata> {
        let response = self
            .inner
            .stat_object(bucket, key)
            .send()
            .await
            .map_err(classify)?;

        let content_type = response
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(OCTET_STREAM);

        let mut metadata = ObjectMetadata::new(response.size as u64, response.etag.clone())
            .with_content_type(content_type);
        if let Some(last_modified) = response
            .last_modified
            .and_then(|dt| OffsetDateTime::from_unix_timestamp(dt.timestamp()).ok())
        {
            metadata = metadata.with_last_modified(last_modified);
        }

        Ok(metadata)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectStream> {
        let response = self
            .inner
            .get_object(bucket, key)
            .send()
            .await
            .map_err(classify)?;

        let (stream, _size) = response
            .content
            .to_stream()
            .await
            .map_err(BackendError::Transfer)?;
        Ok(stream)
    }

    async fn health_check(&self) -> BackendResult<()> {
        self.test_connection().await
    }
}

impl std::fmt::Debug for MinioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinioBackend")
            .field("endpoint", &self.config.endpoint_masked())
            .field("secure", &self.config.is_secure())
            .field("request_timeout", &self.config.request_timeout())
            .field("access_key", &self.config.credentials().access_key_masked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use minio::s3::error::ErrorResponse;
    use url::Url;

    use super::*;
    use crate::StorageCredentials;

    fn create_test_config() -> StorageConfig {
        let endpoint = Url::parse("https://localhost:9000").unwrap();
        let credentials = StorageCredentials::new("minioadmin", "minioadmin");
        StorageConfig::new(endpoint, credentials, "uploads")
    }

    #[test]
    fn test_backend_creation() {
        let backend = MinioBackend::new(create_test_config());
        assert!(backend.is_ok());
    }

    #[test]
    fn test_backend_invalid_config() {
        let endpoint = Url::parse("https://localhost:9000").unwrap();
        let config = StorageConfig::new(endpoint, StorageCredentials::new("", ""), "uploads");

        let backend = MinioBackend::new(config);
        assert!(matches!(backend, Err(Error::Config(_))));
    }

    fn s3_error(code: ErrorCode, bucket: &str, object: &str) -> MinioError {
        MinioError::S3Error(ErrorResponse {
            code,
            resource: format!("/{bucket}/{object}"),
            bucket_name: bucket.to_string(),
            object_name: object.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_classify_by_error_code() {
        let missing = classify(s3_error(ErrorCode::NoSuchKey, "uploads", "202401/a-1.txt"));
        assert!(matches!(missing, BackendError::NotFound));

        let no_bucket = classify(s3_error(ErrorCode::NoSuchBucket, "uploads", ""));
        assert!(matches!(no_bucket, BackendError::NotFound));

        let owned = classify(s3_error(ErrorCode::BucketAlreadyOwnedByYou, "uploads", ""));
        assert!(matches!(owned, BackendError::AlreadyExists));

        let taken = classify(s3_error(
            ErrorCode::OtherError("BucketAlreadyExists".to_string()),
            "uploads",
            "",
        ));
        assert!(matches!(taken, BackendError::AlreadyExists));
    }

    #[test]
    fn test_classify_ignores_names_that_look_like_codes() {
        let denied = classify(s3_error(
            ErrorCode::AccessDenied,
            "NoSuchBucket",
            "202401/NoSuchKey-notes-1.txt",
        ));
        assert!(matches!(denied, BackendError::Client(_)));

        let conflict = classify(s3_error(
            ErrorCode::ResourceConflict,
            "uploads",
            "BucketAlreadyOwnedByYou.txt",
        ));
        assert!(matches!(conflict, BackendError::Client(_)));
    }

    #[test]
    fn test_classify_non_s3_errors() {
        let error = classify(MinioError::InvalidBucketName("NoSuchBucket".to_string()));
        assert!(matches!(error, BackendError::Client(_)));
    }

    #[test]
    fn test_backend_debug() {
        let backend = MinioBackend::new(create_test_config()).unwrap();
        let debug_str = format!("{backend:?}");

        assert!(debug_str.contains("MinioBackend"));
        assert!(debug_str.contains("localhost:9000"));
        assert!(!debug_str.contains("minioadmin"));
    }
}
