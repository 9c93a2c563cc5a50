//! Upload safety checks for embedded images.
//!
//! Two layers:
//! 1. Size limit
//! 2. Content type from magic bytes (extension only as a fallback), which
//!    must be a raster image type

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::uuid_utils::new_v7;

/// Image MIME types accepted for embedding.
static ALLOWED_IMAGE_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "image/png",
        "image/jpeg",
        "image/gif",
        "image/webp",
        "image/bmp",
        "image/avif",
    ]
    .into_iter()
    .collect()
});

/// Result of upload validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub block_reason: Option<String>,
    pub detected_type: Option<String>,
}

impl ValidationResult {
    pub fn allowed(detected: impl Into<String>) -> Self {
        Self {
            allowed: true,
            block_reason: None,
            detected_type: Some(detected.into()),
        }
    }

    pub fn blocked(reason: impl Into<String>, detected: Option<String>) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason.into()),
            detected_type: detected,
        }
    }
}

/// Validate that `data` is an image small enough to upload.
pub fn validate_image(filename: &str, data: &[u8], max_size_bytes: u64) -> ValidationResult {
    if data.is_empty() {
        return ValidationResult::blocked("File is empty", None);
    }

    if data.len() as u64 > max_size_bytes {
        return ValidationResult::blocked(
            format!("File exceeds maximum size of {} bytes", max_size_bytes),
            None,
        );
    }

    match detect_content_type(filename, data) {
        Some(mime) if ALLOWED_IMAGE_TYPES.contains(mime.as_str()) => {
            ValidationResult::allowed(mime)
        }
        Some(mime) => ValidationResult::blocked(format!("{} is not an image", mime), Some(mime)),
        None => ValidationResult::blocked("Unrecognized file type", None),
    }
}

/// Detect content type from magic bytes, falling back to the extension.
pub fn detect_content_type(filename: &str, data: &[u8]) -> Option<String> {
    if let Some(kind) = infer::get(data) {
        return Some(kind.mime_type().to_string());
    }

    extension_of(filename)
        .and_then(|ext| mime_from_extension(&ext))
        .map(str::to_string)
}

/// Generate a collision-free storage filename: `<uuidv7>.<ext>`.
///
/// The extension comes from the original name when it is a known image
/// extension, otherwise from the detected MIME type.
pub fn upload_filename(original: &str, content_type: &str) -> String {
    let ext = extension_of(original)
        .filter(|ext| mime_from_extension(ext).is_some())
        .or_else(|| extension_from_mime(content_type).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", new_v7(), ext)
}

fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

fn extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const EXE_HEADER: &[u8] = &[0x4D, 0x5A, 0x90, 0x00, 0x03, 0x00];

    #[test]
    fn test_png_allowed() {
        let result = validate_image("photo.png", PNG_HEADER, 1024);
        assert!(result.allowed);
        assert_eq!(result.detected_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_magic_bytes_beat_extension() {
        let result = validate_image("innocent.png", EXE_HEADER, 1024);
        assert!(!result.allowed);
    }

    #[test]
    fn test_oversized_blocked() {
        let result = validate_image("photo.png", PNG_HEADER, 4);
        assert!(!result.allowed);
        assert!(result.block_reason.unwrap().contains("maximum size"));
    }

    #[test]
    fn test_empty_blocked() {
        assert!(!validate_image("photo.png", &[], 1024).allowed);
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            detect_content_type("shot.JPG", b"not really magic").as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(detect_content_type("notes.txt", b"plain"), None);
    }

    #[test]
    fn test_upload_filename_keeps_image_extension() {
        let name = upload_filename("Holiday.JPEG", "image/jpeg");
        assert!(name.ends_with(".jpeg"));
        let (stem, _) = name.split_once('.').unwrap();
        assert!(uuid::Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn test_upload_filename_falls_back_to_mime() {
        assert!(upload_filename("clipboard", "image/png").ends_with(".png"));
        assert!(upload_filename("weird.exe", "image/gif").ends_with(".gif"));
    }

    #[test]
    fn test_upload_filenames_do_not_collide() {
        let a = upload_filename("a.png", "image/png");
        let b = upload_filename("a.png", "image/png");
        assert_ne!(a, b);
    }
}
