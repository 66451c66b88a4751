//! Uploaded cover files and the validation applied before ingestion.

use crate::{Error, Result};

pub const COVER_FIELD: &str = "cover_image";

/// Default upload ceiling (6 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 6 * 1024 * 1024;

/// Raw upload as delivered by the transport. Never persisted.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub bytes: Vec<u8>,
    pub original_filename: String,
    pub declared_mime: String,
}

impl UploadedAsset {
    pub fn new(
        bytes: Vec<u8>,
        original_filename: impl Into<String>,
        declared_mime: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            original_filename: original_filename.into(),
            declared_mime: declared_mime.into(),
        }
    }

    /// Build an upload from a file name, guessing the MIME type from the
    /// leading bytes.
    pub fn sniffed(bytes: Vec<u8>, original_filename: impl Into<String>) -> Self {
        let mime = detect_image_mime(&bytes).unwrap_or("application/octet-stream");
        Self::new(bytes, original_filename, mime)
    }
}

pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c' | b'x', ..] => {
            Some("image/heic")
        }
        [_, _, _, _, b'f', b't', b'y', b'p', b'm', b'i', b'f', b'1', ..] => Some("image/heic"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_upload_bytes: usize,
    pub accepted_mime_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            accepted_mime_types: [
                "image/jpeg",
                "image/jpg",
                "image/png",
                "image/gif",
                "image/webp",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

impl UploadLimits {
    fn accepts(&self, mime: &str) -> bool {
        self.accepted_mime_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(mime))
    }

    pub fn validate(&self, upload: &UploadedAsset) -> Result<()> {
        if upload.bytes.is_empty() {
            return Err(Error::validation(COVER_FIELD, "The uploaded file is empty."));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(Error::validation(
                COVER_FIELD,
                format!(
                    "The cover image may not be greater than {} kilobytes.",
                    self.max_upload_bytes / 1024
                ),
            ));
        }

        let declared = upload.declared_mime.trim();
        if !self.accepts(declared) {
            return Err(Error::validation(
                COVER_FIELD,
                format!("Unsupported cover image type '{}'.", declared),
            ));
        }

        match detect_image_mime(&upload.bytes) {
            Some(sniffed) if self.accepts(sniffed) => {
                if !sniffed.eq_ignore_ascii_case(declared) {
                    tracing::debug!(
                        "Upload '{}' declared {} but looks like {}",
                        upload.original_filename,
                        declared,
                        sniffed
                    );
                }
                Ok(())
            }
            Some(sniffed) => Err(Error::validation(
                COVER_FIELD,
                format!("Unsupported cover image type '{}'.", sniffed),
            )),
            None => Err(Error::validation(
                COVER_FIELD,
                "The cover image must be an image.",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_detect_png() {
        assert_eq!(detect_image_mime(&PNG_MAGIC), Some("image/png"));
    }

    #[test]
    fn test_detect_jpeg() {
        assert_eq!(detect_image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
    }

    #[test]
    fn test_detect_gif() {
        assert_eq!(detect_image_mime(b"GIF89a\x01\x00"), Some("image/gif"));
        assert_eq!(detect_image_mime(b"GIF87a\x01\x00"), Some("image/gif"));
    }

    #[test]
    fn test_detect_webp() {
        assert_eq!(
            detect_image_mime(&[
                0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50
            ]),
            Some("image/webp")
        );
    }

    #[test]
    fn test_detect_heic() {
        assert_eq!(
            detect_image_mime(b"\x00\x00\x00\x18ftypheic\x00\x00"),
            Some("image/heic")
        );
    }

    #[test]
    fn test_unknown_and_empty() {
        assert_eq!(detect_image_mime(&[0x00, 0x01, 0x02, 0x03]), None);
        assert_eq!(detect_image_mime(&[]), None);
    }

    #[test]
    fn test_valid_upload_passes() {
        let upload = UploadedAsset::new(PNG_MAGIC.to_vec(), "a.png", "image/png");
        assert!(UploadLimits::default().validate(&upload).is_ok());
    }

    #[test]
    fn test_declared_jpg_alias_accepted() {
        let upload = UploadedAsset::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "a.jpg", "IMAGE/JPG");
        assert!(UploadLimits::default().validate(&upload).is_ok());
    }

    #[test]
    fn test_empty_upload_rejected() {
        let upload = UploadedAsset::new(Vec::new(), "a.png", "image/png");
        let err = UploadLimits::default().validate(&upload).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == COVER_FIELD));
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let limits = UploadLimits {
            max_upload_bytes: 4,
            ..UploadLimits::default()
        };
        let upload = UploadedAsset::new(PNG_MAGIC.to_vec(), "a.png", "image/png");
        let err = limits.validate(&upload).unwrap_err();
        assert!(err.to_string().contains("greater than"));
    }

    #[test]
    fn test_undeclared_type_rejected() {
        let upload = UploadedAsset::new(PNG_MAGIC.to_vec(), "a.pdf", "application/pdf");
        assert!(UploadLimits::default().validate(&upload).is_err());
    }

    #[test]
    fn test_text_disguised_as_png_rejected() {
        let upload = UploadedAsset::new(b"hello world".to_vec(), "a.png", "image/png");
        let err = UploadLimits::default().validate(&upload).unwrap_err();
        assert!(err.to_string().contains("must be an image"));
    }

    #[test]
    fn test_sniffed_upload_mime() {
        let upload = UploadedAsset::sniffed(PNG_MAGIC.to_vec(), "scan");
        assert_eq!(upload.declared_mime, "image/png");

        let unknown = UploadedAsset::sniffed(b"nope".to_vec(), "scan");
        assert_eq!(unknown.declared_mime, "application/octet-stream");
    }

    #[test]
    fn test_heic_rejected_as_unsupported_type() {
        let heic = b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00".to_vec();
        let upload = UploadedAsset::new(heic, "IMG_0001.HEIC", "image/heic");
        let err = UploadLimits::default().validate(&upload).unwrap_err();
        assert!(err.to_string().contains("Unsupported cover image type 'image/heic'"), "{}", err);
    }
}
