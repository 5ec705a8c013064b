//! Idempotent bucket provisioning.

use tracing::{debug, error, info, instrument};

use super::StorageClient;
use crate::backend::BackendError;
use crate::{Error, Result, TRACING_TARGET_BUCKETS};

impl StorageClient {
    /// Makes sure `bucket` (or the default bucket) exists, creating it if needed.
    ///
    /// Safe to call before every write. A bucket created concurrently by
    /// another caller counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketProvision`] if the existence check or the
    /// creation fails.
    #[instrument(skip(self, bucket), target = TRACING_TARGET_BUCKETS, fields(bucket = %self.resolve_bucket(bucket)))]
    pub async fn ensure_bucket(&self, bucket: Option<&str>) -> Result<()> {
        let bucket = self.resolve_bucket(bucket);
        self.guarded("ensure_bucket", bucket, self.provision(bucket))
            .await
    }

    /// Unguarded provisioning, shared by the write paths.
    pub(crate) async fn provision(&self, bucket: &str) -> Result<()> {
        let start = std::time::Instant::now();

        let exists = self.backend.bucket_exists(bucket).await.map_err(|source| {
            error!(
                target: TRACING_TARGET_BUCKETS,
                bucket = %bucket,
                error = %source,
                "Failed to check bucket existence"
            );
            Error::BucketProvision {
                bucket: bucket.to_string(),
                source,
            }
        })?;

        if exists {
            debug!(target: TRACING_TARGET_BUCKETS, bucket = %bucket, "Bucket already exists");
            return Ok(());
        }

        debug!(target: TRACING_TARGET_BUCKETS, bucket = %bucket, "Creating bucket");
        let result = self.backend.make_bucket(bucket).await;
        let elapsed = start.elapsed();

        match result {
            Ok(()) => {
                info!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket,
                    elapsed = ?elapsed,
                    "Bucket created successfully"
                );
                Ok(())
            }
            Err(BackendError::AlreadyExists) => {
                debug!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket,
                    "Bucket was created concurrently"
                );
                Ok(())
            }
            Err(source) => {
                error!(
                    target: TRACING_TARGET_BUCKETS,
                    bucket = %bucket,
                    error = %source,
                    elapsed = ?elapsed,
                    "Failed to create bucket"
                );
                Err(Error::BucketProvision {
                    bucket: bucket.to_string(),
                    source,
                })
            }
        }
    }
}
