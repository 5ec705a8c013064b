//! The storage facade.
//!
//! [`StorageClient`] provisions buckets on demand, derives object keys,
//! forwards uploads and downloads to an [`ObjectBackend`] and returns a
//! [`StorageObject`](crate::StorageObject) describing each completed call.
//!
//! Every operation is bounded by the configured request timeout and, when
//! set, by a caller-supplied deadline and cancellation token. Nothing is
//! retried internally.

mod bucket_operations;
mod object_operations;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::ObjectBackend;
use crate::client::MinioBackend;
use crate::{Error, Result, StorageConfig, TRACING_TARGET_CLIENT, TRACING_TARGET_OPERATIONS};

/// Default bound applied to each facade operation.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Upload/download facade over an [`ObjectBackend`].
///
/// The backend handle and the default bucket are fixed at construction.
/// Cloning is cheap and clones share the backend, so one client can serve
/// any number of concurrent callers.
#[derive(Clone)]
pub struct StorageClient {
    backend: Arc<dyn ObjectBackend>,
    default_bucket: Arc<str>,
    request_timeout: Duration,
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

impl StorageClient {
    /// Creates a facade over `backend` with `default_bucket` for calls that
    /// do not name a bucket.
    pub fn new(backend: Arc<dyn ObjectBackend>, default_bucket: impl Into<String>) -> Self {
        Self {
            backend,
            default_bucket: Arc::from(default_bucket.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            deadline: None,
            cancellation: None,
        }
    }

    /// Builds a MinIO-backed facade from `config`.
    ///
    /// Returns `Ok(None)` when storage is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    #[instrument(skip(config), target = TRACING_TARGET_CLIENT, fields(enable = config.enable))]
    pub fn from_config(config: StorageConfig) -> Result<Option<Self>> {
        if !config.enable {
            info!(target: TRACING_TARGET_CLIENT, "Object storage is disabled");
            return Ok(None);
        }

        let default_bucket = config.bucket_name.clone();
        let request_timeout = config.request_timeout();
        let backend = MinioBackend::new(config)?;

        Ok(Some(
            Self::new(Arc::new(backend), default_bucket).with_request_timeout(request_timeout),
        ))
    }

    /// Sets the bound applied to each operation.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns a handle whose operations fail with
    /// [`Error::DeadlineExceeded`] once `deadline` passes.
    ///
    /// The per-operation request timeout still applies; whichever expires
    /// first wins. The original handle is unaffected.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut scoped = self.clone();
        scoped.deadline = Some(deadline);
        scoped
    }

    /// Returns a handle whose operations fail with
    /// [`Error::OperationCancelled`] once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut scoped = self.clone();
        scoped.cancellation = Some(token);
        scoped
    }

    /// Bucket used when a call passes `None`.
    #[inline]
    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the backend this facade forwards to.
    #[inline]
    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }

    /// Checks that the backend is reachable.
    #[instrument(skip(self), target = TRACING_TARGET_OPERATIONS)]
    pub async fn health_check(&self) -> Result<()> {
        debug!(target: TRACING_TARGET_OPERATIONS, "Checking storage health");

        let start = std::time::Instant::now();
        let result = self
            .guarded("health_check", self.default_bucket(), async {
                self.backend
                    .health_check()
                    .await
                    .map_err(|source| Error::Unavailable { source })
            })
            .await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => info!(
                target: TRACING_TARGET_OPERATIONS,
                elapsed = ?elapsed,
                "Storage backend is healthy"
            ),
            Err(e) => error!(
                target: TRACING_TARGET_OPERATIONS,
                error = %e,
                elapsed = ?elapsed,
                "Storage health check failed"
            ),
        }

        result
    }

    fn resolve_bucket<'a>(&'a self, bucket: Option<&'a str>) -> &'a str {
        bucket.unwrap_or(&self.default_bucket)
    }

    /// Runs `operation` under the request timeout, the scoped deadline and
    /// the cancellation token of this handle.
    async fn guarded<T>(
        &self,
        operation: &'static str,
        bucket: &str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let deadline = match (self.deadline, started.checked_add(self.request_timeout)) {
            (Some(scoped), Some(timeout)) => Some(scoped.min(timeout)),
            (scoped, timeout) => scoped.or(timeout),
        };
        let bounded = async {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, future)
                    .await
                    .map_err(|_| deadline),
                None => Ok(future.await),
            }
        };

        let outcome = match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    warn!(
                        target: TRACING_TARGET_OPERATIONS,
                        operation,
                        bucket = %bucket,
                        "Operation cancelled"
                    );
                    return Err(Error::OperationCancelled {
                        operation,
                        bucket: bucket.to_string(),
                    });
                }
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };

        outcome.unwrap_or_else(|deadline| {
            let timeout = deadline.saturating_duration_since(started);
            warn!(
                target: TRACING_TARGET_OPERATIONS,
                operation,
                bucket = %bucket,
                timeout = ?timeout,
                "Operation deadline exceeded"
            );
            Err(Error::DeadlineExceeded {
                operation,
                bucket: bucket.to_string(),
                timeout,
            })
        })
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("default_bucket", &self.default_bucket)
            .field("request_timeout", &self.request_timeout)
            .field("deadline", &self.deadline)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::backend::{BackendResult, MemoryBackend, ObjectStream, PutReceipt};
    use crate::types::ObjectMetadata;
    use crate::StorageCredentials;

    /// Backend whose bucket check never finishes on its own.
    pub(crate) struct StalledBackend;

    #[async_trait]
    impl ObjectBackend for StalledBackend {
        async fn bucket_exists(&self, _bucket: &str) -> BackendResult<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }

        async fn make_bucket(&self, _bucket: &str) -> BackendResult<()> {
            Ok(())
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            _body: ObjectStream,
            _size: Option<u64>,
            _content_type: &str,
        ) -> BackendResult<PutReceipt> {
            Ok(PutReceipt {
                etag: String::new(),
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        }

        async fn stat_object(&self, _bucket: &str, _key: &str) -> BackendResult<ObjectMetadata> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ObjectMetadata::new(0, ""))
        }

        async fn get_object(&self, _bucket: &str, _key: &str) -> BackendResult<ObjectStream> {
            Ok(Box::pin(futures::stream::empty::<std::io::Result<bytes::Bytes>>()))
        }
    }

    pub(crate) fn memory_client() -> (Arc<MemoryBackend>, StorageClient) {
        let backend = Arc::new(MemoryBackend::new());
        let client = StorageClient::new(backend.clone(), "uploads");
        (backend, client)
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        let config = StorageConfig::new(
            Url::parse("http://127.0.0.1:9000").unwrap(),
            StorageCredentials::new("minioadmin", "minioadmin"),
            "uploads",
        )
        .with_enable(false);

        assert!(StorageClient::from_config(config).unwrap().is_none());
    }

    #[test]
    fn test_absent_enable_flag_builds_nothing() {
        let json = r#"{
            "endpoint": "http://127.0.0.1:9000",
            "access_key": "minioadmin",
            "secret_key": "minioadmin",
            "bucket_name": "uploads"
        }"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();

        assert!(StorageClient::from_config(config.clone()).unwrap().is_none());
        let enabled = config.with_enable(true);
        assert!(StorageClient::from_config(enabled).unwrap().is_some());
    }

    #[test]
    fn test_enabled_config_builds_client() {
        let config = StorageConfig::new(
            Url::parse("http://127.0.0.1:9000").unwrap(),
            StorageCredentials::new("minioadmin", "minioadmin"),
            "uploads",
        )
        .with_request_timeout(Duration::from_secs(30));

        let client = StorageClient::from_config(config).unwrap().unwrap();
        assert_eq!(client.default_bucket(), "uploads");
        assert_eq!(client.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = StorageConfig::new(
            Url::parse("http://127.0.0.1:9000").unwrap(),
            StorageCredentials::new("minioadmin", "minioadmin"),
            "Not_A_Bucket",
        );

        let result = StorageClient::from_config(config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_expires() {
        let client = StorageClient::new(Arc::new(StalledBackend), "uploads")
            .with_request_timeout(Duration::from_secs(5));

        let error = client.ensure_bucket(None).await.unwrap_err();
        assert!(matches!(
            error,
            Error::DeadlineExceeded { timeout, .. } if timeout == Duration::from_secs(5)
        ));
        assert!(error.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_deadline_wins_when_earlier() {
        let client = StorageClient::new(Arc::new(StalledBackend), "uploads");
        let scoped = client.with_deadline(Instant::now() + Duration::from_secs(2));

        let error = scoped.stat_object(None, "202401/a-1.txt").await.unwrap_err();
        assert!(matches!(
            error,
            Error::DeadlineExceeded { operation: "stat_object", timeout, .. }
                if timeout == Duration::from_secs(2)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_operation() {
        let (backend, client) = memory_client();
        let token = CancellationToken::new();
        token.cancel();

        let error = client
            .with_cancellation(token)
            .ensure_bucket(Some("media"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::OperationCancelled { .. }));
        assert_eq!(backend.make_bucket_calls(), 0);
    }

    #[tokio::test]
    async fn test_scoped_handles_leave_original_untouched() {
        let (_, client) = memory_client();
        let token = CancellationToken::new();
        token.cancel();
        let _scoped = client.with_cancellation(token);

        assert!(client.ensure_bucket(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_, client) = memory_client();
        assert!(client.health_check().await.is_ok());
    }
}
