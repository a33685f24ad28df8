//! Uploaded documents and format detection.
//!
//! An [`UploadedDocument`] owns the uploaded bytes on disk. Uploads arriving
//! over HTTP are written into a `NamedTempFile`, so the file disappears when
//! the document is dropped, on success, error, or panic alike.

use crate::error::ReceiptError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Image extensions the OCR engine accepts.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "gif"];

/// What the pipeline does with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Raster image; OCR directly.
    Image,
    /// PDF; text layer first, OCR per page as fallback.
    Pdf,
}

impl DocumentKind {
    /// Classify a file by its declared extension (case-insensitive, with or
    /// without the leading dot).
    pub fn from_extension(ext: &str) -> Result<Self, ReceiptError> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        if ext == "pdf" {
            Ok(DocumentKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(DocumentKind::Image)
        } else {
            Err(ReceiptError::UnsupportedFormat { extension: ext })
        }
    }

    /// Classify a file by the extension of `filename`.
    pub fn from_filename(filename: &str) -> Result<Self, ReceiptError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext)
    }
}

enum Backing {
    /// Caller-owned file; left in place.
    Local(PathBuf),
    /// Upload spooled to a temp file; removed on drop.
    Spooled(NamedTempFile),
}

/// An uploaded receipt: its bytes on disk, original name and kind.
pub struct UploadedDocument {
    backing: Backing,
    original_name: String,
    kind: DocumentKind,
}

impl UploadedDocument {
    /// Wrap an existing file without taking ownership of it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReceiptError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ReceiptError::FileNotFound { path });
        }
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = DocumentKind::from_filename(&original_name)?;
        debug!("Resolved local receipt {} as {:?}", path.display(), kind);
        Ok(Self {
            backing: Backing::Local(path),
            original_name,
            kind,
        })
    }

    /// Spool uploaded bytes to a temp file inside `dir` (or the system temp
    /// directory when `None`).
    ///
    /// The extension is checked before anything touches the disk.
    pub fn from_bytes(
        bytes: &[u8],
        original_name: &str,
        dir: Option<&Path>,
    ) -> Result<Self, ReceiptError> {
        let kind = DocumentKind::from_filename(original_name)?;
        if bytes.is_empty() {
            return Err(ReceiptError::EmptyUpload);
        }

        let suffix = Path::new(original_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("receipt-").suffix(&suffix);
        let mut tmp = match dir {
            Some(d) => builder.tempfile_in(d)?,
            None => builder.tempfile()?,
        };
        tmp.write_all(bytes)?;
        tmp.flush()?;
        debug!(
            "Spooled upload '{}' ({} bytes) to {}",
            original_name,
            bytes.len(),
            tmp.path().display()
        );

        Ok(Self {
            backing: Backing::Spooled(tmp),
            original_name: original_name.to_string(),
            kind,
        })
    }

    /// Path of the bytes on disk.
    pub fn path(&self) -> &Path {
        match &self.backing {
            Backing::Local(p) => p,
            Backing::Spooled(tmp) => tmp.path(),
        }
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("pdf").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_extension(".PDF").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_extension("jpeg").unwrap(), DocumentKind::Image);
        assert_eq!(DocumentKind::from_extension("PNG").unwrap(), DocumentKind::Image);
        assert!(matches!(
            DocumentKind::from_extension("docx"),
            Err(ReceiptError::UnsupportedFormat { extension }) if extension == "docx"
        ));
        assert!(DocumentKind::from_extension("").is_err());
    }

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(
            DocumentKind::from_filename("Dinner Bill.JPG").unwrap(),
            DocumentKind::Image
        );
        assert!(DocumentKind::from_filename("statement").is_err());
    }

    #[test]
    fn spooled_upload_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let doc = UploadedDocument::from_bytes(b"fake png", "r.png", Some(dir.path())).unwrap();
        let path = doc.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(doc.original_name(), "r.png");
        drop(doc);
        assert!(!path.exists());
    }

    #[test]
    fn unsupported_upload_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadedDocument::from_bytes(b"x", "notes.txt", Some(dir.path()));
        assert!(matches!(err, Err(ReceiptError::UnsupportedFormat { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_upload_rejected() {
        let err = UploadedDocument::from_bytes(b"", "r.pdf", None);
        assert!(matches!(err, Err(ReceiptError::EmptyUpload)));
    }

    #[test]
    fn local_file_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("scan.pdf");
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        let doc = UploadedDocument::from_path(&p).unwrap();
        assert_eq!(doc.kind(), DocumentKind::Pdf);
        drop(doc);
        assert!(p.exists());

        assert!(matches!(
            UploadedDocument::from_path(dir.path().join("missing.png")),
            Err(ReceiptError::FileNotFound { .. })
        ));
    }
}
