//! MinIO connection setup.
//!
//! [`StorageConfig`] carries the endpoint, credentials and default bucket a
//! host application supplies; [`MinioBackend`] turns it into an
//! [`ObjectBackend`](crate::ObjectBackend) backed by the `minio` crate.

mod minio_client;
mod storage_config;
mod storage_credentials;

pub use minio_client::MinioBackend;
pub use storage_config::{StorageConfig, validate_bucket_name};
pub use storage_credentials::StorageCredentials;
