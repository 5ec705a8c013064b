//! Validated object keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum key length accepted by S3-compatible stores, in bytes.
const MAX_KEY_LEN: usize = 1024;

/// A storage key that is safe to hand to the backend.
///
/// Keys are non-empty, at most 1024 bytes, never start with `/` and never
/// contain a NUL byte. Keys produced by [`crate::naming::derive_object_key`]
/// always satisfy these rules; keys supplied by callers are checked when
/// parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validates and wraps `key`.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        match Self::check(&key) {
            Some(reason) => Err(Error::InvalidKey { key, reason }),
            None => Ok(Self(key)),
        }
    }

    fn check(key: &str) -> Option<&'static str> {
        if key.is_empty() {
            Some("key is empty")
        } else if key.len() > MAX_KEY_LEN {
            Some("key is longer than 1024 bytes")
        } else if key.starts_with('/') {
            Some("key starts with '/'")
        } else if key.contains('\0') {
            Some("key contains a NUL byte")
        } else {
            None
        }
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the final `/`-separated segment of the key.
    pub fn file_name(&self) -> &str {
        crate::naming::derive_display_name(&self.0)
    }

    /// Consumes the key and returns the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}
