//! Content type detection for uploads.
//!
//! Local files are identified by their leading bytes first and by their
//! extension second. Declared content types from managed uploads are parsed
//! with [`mime`] and replaced by `application/octet-stream` when unusable.

use std::io;
use std::path::Path;

use tokio::io::AsyncReadExt;

/// Fallback content type for unknown payloads.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// How many leading bytes are inspected when sniffing.
const SNIFF_LEN: usize = 512;

const ZIP: &str = "application/zip";

const EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ico", "image/vnd.microsoft.icon"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("zip", ZIP),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("7z", "application/x-7z-compressed"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("epub", "application/epub+zip"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
];

/// Looks up the content type registered for the extension of `file_name`.
pub fn from_extension(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map(|(_, content_type)| *content_type)
}

/// Identifies a payload from its leading bytes.
pub fn sniff(head: &[u8]) -> Option<&'static str> {
    match head {
        [b'%', b'P', b'D', b'F', b'-', ..] => Some("application/pdf"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'P', b'K', 0x03, 0x04, ..] => Some(ZIP),
        [0x1F, 0x8B, ..] => Some("application/gzip"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

/// Picks the content type for a file named `file_name` starting with `head`.
///
/// Recognized leading bytes win over the extension, except that a ZIP
/// signature defers to a more specific extension (`docx`, `epub`, ...),
/// since those formats are ZIP containers.
pub fn detect(file_name: &str, head: &[u8]) -> &'static str {
    let by_extension = from_extension(file_name);
    match sniff(head) {
        Some(ZIP) => by_extension.unwrap_or(ZIP),
        Some(sniffed) => sniffed,
        None => by_extension.unwrap_or(OCTET_STREAM),
    }
}

/// Detects the content type of a local file by reading its leading bytes.
pub async fn detect_file(path: &Path) -> io::Result<&'static str> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut head).await?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    Ok(detect(&file_name, &head))
}

/// Validates a declared content type, falling back to `application/octet-stream`.
pub fn normalize_declared(declared: Option<&str>) -> String {
    declared
        .map(str::trim)
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .map_or_else(|| OCTET_STREAM.to_string(), |mime| mime.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(from_extension("report.pdf"), Some("application/pdf"));
        assert_eq!(from_extension("PHOTO.JPG"), Some("image/jpeg"));
        assert_eq!(from_extension("archive.tar.gz"), Some("application/gzip"));
        assert_eq!(from_extension("Makefile"), None);
        assert_eq!(from_extension("data.unknown"), None);
    }

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(sniff(b"%PDF-1.7\n"), Some("application/pdf"));
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n...."), Some("image/png"));
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff(b"GIF89a"), Some("image/gif"));
        assert_eq!(sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff(&[0x1F, 0x8B, 0x08]), Some("application/gzip"));
        assert_eq!(sniff(b""), None);
        assert_eq!(sniff(b"hello"), None);
    }

    #[test]
    fn test_magic_bytes_win() {
        assert_eq!(detect("image.txt", b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(detect("report.pdf", b""), "application/pdf");
        assert_eq!(detect("blob", b"plain text"), OCTET_STREAM);
    }

    #[test]
    fn test_zip_defers_to_extension() {
        let head = b"PK\x03\x04\x14\x00";
        assert_eq!(
            detect("letter.docx", head),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(detect("bundle.bin", head), ZIP);
    }

    #[test]
    fn test_normalize_declared() {
        assert_eq!(normalize_declared(Some("image/png")), "image/png");
        assert_eq!(
            normalize_declared(Some(" text/plain; charset=utf-8 ")),
            "text/plain; charset=utf-8"
        );
        assert_eq!(normalize_declared(Some("not a mime")), OCTET_STREAM);
        assert_eq!(normalize_declared(None), OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_detect_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"%PDF-1.4 fake").unwrap();

        let detected = detect_file(file.path()).await.unwrap();
        assert_eq!(detected, "application/pdf");
    }
}
