//! Value types shared by the facade and the backends.

mod object_info;
mod object_key;
mod storage_object;
mod upload_source;

pub use object_info::ObjectMetadata;
pub use object_key::ObjectKey;
pub(crate) use storage_object::Payload;
pub use storage_object::{OperationKind, StorageObject};
pub use upload_source::{ManagedUpload, UploadSource};
