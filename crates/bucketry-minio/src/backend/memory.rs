//! In-memory object backend for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use super::{BackendError, BackendResult, ObjectBackend, ObjectStream, PutReceipt};
use crate::types::ObjectMetadata;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: String,
    last_modified: OffsetDateTime,
}

/// Object backend that keeps every bucket in process memory.
///
/// Etags are the first 16 bytes of the SHA-256 digest of the payload, hex
/// encoded, so identical content always yields the same tag. Call counters
/// and failure switches let tests observe and steer the facade.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    buckets: Mutex<HashMap<String, HashMap<String, StoredObject>>>,
    make_bucket_calls: AtomicUsize,
    put_calls: AtomicUsize,
    fail_next_put: AtomicBool,
    fail_bucket_checks: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty backend with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the bucket up front without counting it as a `make_bucket` call.
    #[must_use]
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.lock().entry(bucket.into()).or_default();
        self
    }

    /// Number of times `make_bucket` was called.
    pub fn make_bucket_calls(&self) -> usize {
        self.make_bucket_calls.load(Ordering::SeqCst)
    }

    /// Number of times `put_object` was called.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Makes the next `put_object` call fail with [`BackendError::Rejected`].
    pub fn fail_next_put(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }

    /// Makes every `bucket_exists` call fail while `fail` is true.
    pub fn fail_bucket_checks(&self, fail: bool) {
        self.fail_bucket_checks.store(fail, Ordering::SeqCst);
    }

    /// Returns whether `bucket` exists.
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.lock().contains_key(bucket)
    }

    /// Number of objects stored in `bucket`.
    pub fn object_count(&self, bucket: &str) -> usize {
        self.lock().get(bucket).map_or(0, HashMap::len)
    }

    /// Raw payload of an object, if present.
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Computes the etag this backend assigns to `data`.
    pub fn etag_for(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        hex::encode(&digest[..16])
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, StoredObject>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn object(&self, bucket: &str, key: &str) -> BackendResult<StoredObject> {
        self.lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or(BackendError::NotFound)
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        if self.fail_bucket_checks.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("bucket check disabled".to_string()));
        }
        Ok(self.has_bucket(bucket))
    }

    async fn make_bucket(&self, bucket: &str) -> BackendResult<()> {
        self.make_bucket_calls.fetch_add(1, Ordering::SeqCst);

        let mut buckets = self.lock();
        if buckets.contains_key(bucket) {
            return Err(BackendError::AlreadyExists);
        }
        buckets.insert(bucket.to_string(), HashMap::new());
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectStream,
        _size: Option<u64>,
        content_type: &str,
    ) -> BackendResult<PutReceipt> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Rejected("injected put failure".to_string()));
        }
        if !self.has_bucket(bucket) {
            return Err(BackendError::NotFound);
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk.map_err(BackendError::Transfer)?);
        }

        let data = buffer.freeze();
        let etag = Self::etag_for(&data);
        let object = StoredObject {
            data,
            etag: etag.clone(),
            content_type: content_type.to_string(),
            last_modified: OffsetDateTime::now_utc(),
        };

        self.lock()
            .get_mut(bucket)
            .ok_or(BackendError::NotFound)?
            .insert(key.to_string(), object);

        Ok(PutReceipt {
            etag,
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectMetadata> {
        let object = self.object(bucket, key)?;
        Ok(ObjectMetadata {
            size: object.data.len() as u64,
            etag: object.etag,
            content_type: object.content_type,
            last_modified: Some(object.last_modified),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<ObjectStream> {
        let object = self.object(bucket, key)?;
        let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(object.data) });
        Ok(Box::pin(stream))
    }
}
