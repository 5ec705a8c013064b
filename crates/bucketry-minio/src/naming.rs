//! Object key and path derivation.
//!
//! Keys have the shape `YYYYMM/<base>-<id>.<ext>`: the upload month in UTC,
//! the original base name, a time-ordered UUID v7 in simple form, and the
//! original extension. Names without an extension produce
//! `YYYYMM/<base>-<id>` with no trailing dot. Compound archive suffixes
//! (`tar.gz`, `tar.bz2`, `tar.xz`, `tar.Z`) count as one extension, so
//! `scan.tar.gz` becomes `YYYYMM/scan-<id>.tar.gz`. Everything here is pure
//! and performs no I/O.

use std::path::{Component, Path, PathBuf};

use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::types::ObjectKey;
use crate::{Error, Result};

/// Multi-part extensions kept together when splitting a file name.
const COMPOUND_EXTENSIONS: [&str; 4] = ["tar.gz", "tar.bz2", "tar.xz", "tar.Z"];

/// Derives a fresh object key for `file_name` using the current UTC time.
///
/// `file_name` may be a bare name or a full path with `/` or `\` separators;
/// only the final segment is used. Two calls with the same input always
/// produce different keys.
pub fn derive_object_key(file_name: &str) -> Result<ObjectKey> {
    derive_object_key_at(file_name, OffsetDateTime::now_utc())
}

/// Derives a fresh object key for `file_name`, partitioned by the month of `at`.
pub fn derive_object_key_at(file_name: &str, at: OffsetDateTime) -> Result<ObjectKey> {
    let at = at.to_offset(UtcOffset::UTC);
    let (stem, extension) = split_extension(base_name(file_name));
    let id = Uuid::now_v7().simple();

    let key = match extension {
        Some(extension) => format!(
            "{:04}{:02}/{stem}-{id}.{extension}",
            at.year(),
            u8::from(at.month())
        ),
        None => format!("{:04}{:02}/{stem}-{id}", at.year(), u8::from(at.month())),
    };

    ObjectKey::new(key)
}

/// Returns the final `/`-separated segment of `key`.
pub fn derive_display_name(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, name)| name)
}

/// Returns the logical locator `bucket/key`.
///
/// The locator carries no scheme or host; callers that need a resolvable
/// URL prefix it with their own endpoint.
pub fn derive_access_locator(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

/// Resolves where an object is written inside `directory`.
///
/// Only the base name of `key` is used, so the result is always a direct
/// child of `directory`. Base names that would not name a regular child
/// (empty, `.`, `..`, drive prefixes) are rejected with
/// [`Error::InvalidPath`].
pub fn derive_local_path(directory: &Path, key: &str) -> Result<PathBuf> {
    let invalid = || Error::InvalidPath {
        directory: directory.to_path_buf(),
        key: key.to_string(),
    };

    let name = base_name(key);
    if name.contains('\0') {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) => Ok(directory.join(segment)),
        _ => Err(invalid()),
    }
}

/// Final segment of a name, treating both `/` and `\` as separators.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Splits `name` into stem and extension.
///
/// Compound suffixes from [`COMPOUND_EXTENSIONS`] are matched first;
/// otherwise the split is at the last dot. Leading dots belong to the stem
/// (`.env` has no extension) and a trailing dot yields no extension.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    for extension in COMPOUND_EXTENSIONS {
        if let Some(dot) = name.len().checked_sub(extension.len() + 1)
            && dot > 0
            && name.is_char_boundary(dot)
            && name[dot..].starts_with('.')
            && name[dot + 1..].eq_ignore_ascii_case(extension)
        {
            return (&name[..dot], Some(&name[dot + 1..]));
        }
    }

    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(index) if index + 1 == name.len() => (&name[..index], None),
        Some(index) => (&name[..index], Some(&name[index + 1..])),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;

    fn is_key_shape(key: &str, month: &str, stem: &str, extension: Option<&str>) -> bool {
        let Some(rest) = key.strip_prefix(&format!("{month}/{stem}-")) else {
            return false;
        };
        let id = match extension {
            Some(extension) => match rest.strip_suffix(&format!(".{extension}")) {
                Some(id) => id,
                None => return false,
            },
            None => rest,
        };
        id.len() == 32 && id.chars().all(|c| c.is_ascii_alphanumeric())
    }

    #[test]
    fn test_key_shape() {
        let key = derive_object_key_at("report.pdf", datetime!(2024-01-31 23:59:59 UTC)).unwrap();
        assert!(is_key_shape(key.as_str(), "202401", "report", Some("pdf")), "{key}");
    }

    #[test]
    fn test_key_month_is_utc() {
        let at = datetime!(2024-02-01 01:00:00 +03:00);
        let key = derive_object_key_at("a.txt", at).unwrap();
        assert!(key.as_str().starts_with("202401/"), "{key}");
    }

    #[test]
    fn test_key_without_extension() {
        let key = derive_object_key_at("Makefile", datetime!(2023-11-05 12:00:00 UTC)).unwrap();
        assert!(is_key_shape(key.as_str(), "202311", "Makefile", None), "{key}");
        assert!(!key.as_str().ends_with('.'));

        let key = derive_object_key_at("notes.", datetime!(2023-11-05 12:00:00 UTC)).unwrap();
        assert!(is_key_shape(key.as_str(), "202311", "notes", None), "{key}");

        let key = derive_object_key_at(".env", datetime!(2023-11-05 12:00:00 UTC)).unwrap();
        assert!(is_key_shape(key.as_str(), "202311", ".env", None), "{key}");
    }

    #[test]
    fn test_key_uses_base_name_of_paths() {
        let at = datetime!(2024-06-01 00:00:00 UTC);
        let unix = derive_object_key_at("/home/me/docs/scan.2024.pdf", at).unwrap();
        assert!(is_key_shape(unix.as_str(), "202406", "scan.2024", Some("pdf")), "{unix}");

        let windows = derive_object_key_at(r"C:\Users\me\photo.JPG", at).unwrap();
        assert!(is_key_shape(windows.as_str(), "202406", "photo", Some("JPG")), "{windows}");
    }

    #[test]
    fn test_key_keeps_compound_extension() {
        let at = datetime!(2024-06-01 00:00:00 UTC);
        let key = derive_object_key_at("/home/me/docs/scan.tar.gz", at).unwrap();
        assert!(is_key_shape(key.as_str(), "202406", "scan", Some("tar.gz")), "{key}");

        let key = derive_object_key_at("backup.2024.TAR.BZ2", at).unwrap();
        assert!(is_key_shape(key.as_str(), "202406", "backup.2024", Some("TAR.BZ2")), "{key}");

        let key = derive_object_key_at("notes.gz", at).unwrap();
        assert!(is_key_shape(key.as_str(), "202406", "notes", Some("gz")), "{key}");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("logs.tar.xz"), ("logs", Some("tar.xz")));
        assert_eq!(split_extension("tar.gz"), ("tar", Some("gz")));
        assert_eq!(split_extension(".tar.gz"), (".tar", Some("gz")));
        assert_eq!(split_extension("photo.jpg"), ("photo", Some("jpg")));
        assert_eq!(split_extension(".env"), (".env", None));
        assert_eq!(split_extension("notes."), ("notes", None));
    }

    #[test]
    fn test_keys_are_unique() {
        let at = datetime!(2024-01-01 00:00:00 UTC);
        let keys: HashSet<String> = (0..10_000)
            .map(|_| derive_object_key_at("report.pdf", at).unwrap().into_inner())
            .collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(derive_display_name("202401/report-abc.pdf"), "report-abc.pdf");
        assert_eq!(derive_display_name("plain"), "plain");
    }

    #[test]
    fn test_access_locator() {
        assert_eq!(
            derive_access_locator("media", "202401/report-abc.pdf"),
            "media/202401/report-abc.pdf"
        );
    }

    #[test]
    fn test_local_path_uses_base_name() {
        let dir = Path::new("/srv/downloads");
        assert_eq!(
            derive_local_path(dir, "202401/report-abc.pdf").unwrap(),
            dir.join("report-abc.pdf")
        );
        assert_eq!(
            derive_local_path(dir, "../../etc/passwd").unwrap(),
            dir.join("passwd")
        );
    }

    #[test]
    fn test_local_path_rejects_dot_segments() {
        let dir = Path::new("/srv/downloads");
        for key in ["..", "a/..", "a/.", "a/", "", r"a\.."] {
            assert!(
                matches!(derive_local_path(dir, key), Err(Error::InvalidPath { .. })),
                "{key:?} should be rejected"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_local_path_stays_inside(
            prefix in "[a-z./\\\\]{0,12}",
            name in "[a-zA-Z0-9._-]{0,12}",
        ) {
            let dir = Path::new("/srv/downloads");
            let key = format!("{prefix}../{name}");
            match derive_local_path(dir, &key) {
                Ok(path) => {
                    prop_assert_eq!(path.parent(), Some(dir));
                    let is_normal = matches!(
                        path.components().next_back(),
                        Some(Component::Normal(_))
                    );
                    prop_assert!(is_normal);
                }
                Err(error) => prop_assert!(
                    matches!(error, Error::InvalidPath { .. }),
                    "unexpected error: {:?}",
                    error
                ),
            }
        }

        #[test]
        fn prop_key_keeps_name_parts(stem in "[a-zA-Z0-9_-]{1,16}", ext in "[a-z0-9]{1,5}") {
            let at = datetime!(2025-03-10 08:00:00 UTC);
            let key = derive_object_key_at(&format!("{stem}.{ext}"), at).unwrap();
            prop_assert!(is_key_shape(key.as_str(), "202503", &stem, Some(&ext)));
        }

        #[test]
        fn prop_access_locator_joins_bucket_and_key(
            bucket in "[a-z0-9][a-z0-9.-]{1,30}[a-z0-9]",
            key in "[a-zA-Z0-9/._ -]{1,64}",
        ) {
            let locator = derive_access_locator(&bucket, &key);
            prop_assert_eq!(&locator, &format!("{bucket}/{key}"));
            prop_assert_eq!(locator.strip_prefix(&format!("{bucket}/")), Some(key.as_str()));
        }
    }
}
