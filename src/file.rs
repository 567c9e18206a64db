//! File handles handed to the document pipeline.

use anyhow::{Context, Result};
use std::path::Path;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// A file as the user supplied it: name, media type, and raw bytes.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, inferring its media type.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = guess_media_type(path, &bytes);
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the declared media type is PDF (parameters and case ignored).
    pub fn is_pdf(&self) -> bool {
        let essence = self.media_type.split(';').next().unwrap_or("").trim();
        essence.eq_ignore_ascii_case(PDF_MEDIA_TYPE)
    }
}

/// Media type from the extension, falling back to content sniffing.
pub fn guess_media_type(path: &Path, bytes: &[u8]) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("pdf") => PDF_MEDIA_TYPE,
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ if bytes.starts_with(PDF_MAGIC) => PDF_MEDIA_TYPE,
        _ => "application/octet-stream",
    }
    .to_string()
}
