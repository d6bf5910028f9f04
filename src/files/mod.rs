//! File-context extraction seam. Plain text passes through; PDF,
//! document, and image formats are delegated to an external extractor
//! behind the `TextExtractor` trait. The extracted text is injected
//! into the outgoing history entry as a delimited FILE CONTEXT block,
//! never into the visible message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentMeta {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Dispatch category, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PlainText,
    Pdf,
    Document,
    Image,
}

impl FileKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_lowercase();
        match ext.as_str() {
            "txt" | "md" | "csv" | "json" => Some(FileKind::PlainText),
            "pdf" => Some(FileKind::Pdf),
            "doc" | "docx" | "odt" | "rtf" => Some(FileKind::Document),
            "png" | "jpg" | "jpeg" | "webp" => Some(FileKind::Image),
            _ => None,
        }
    }
}

/// External collaborator that turns a file into text. OCR and
/// document parsing live behind this seam, out of core scope.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, name: &str, bytes: &[u8]) -> Result<String, OracleError>;
}

/// Extract text for an uploaded file, dispatching on extension.
/// Plain text is decoded inline; everything else goes through the
/// extractor. Unknown extensions fail with `ExtractionFailure`.
pub async fn extract_file_context(
    extractor: &dyn TextExtractor,
    name: &str,
    bytes: &[u8],
) -> Result<String, OracleError> {
    let kind = FileKind::from_name(name).ok_or_else(|| {
        OracleError::ExtractionFailure(format!("unsupported file type: {}", name))
    })?;
    match kind {
        FileKind::PlainText => String::from_utf8(bytes.to_vec())
            .map_err(|_| OracleError::ExtractionFailure("file is not valid UTF-8".to_string())),
        FileKind::Pdf | FileKind::Document | FileKind::Image => {
            extractor.extract_text(name, bytes).await
        }
    }
}

/// Wrap extracted text in the delimited block prepended to the
/// outgoing history entry.
pub fn file_context_block(name: &str, extracted: &str) -> String {
    format!(
        "--- FILE CONTEXT ({}) ---\n{}\n--- END FILE CONTEXT ---",
        name,
        extracted.trim()
    )
}
