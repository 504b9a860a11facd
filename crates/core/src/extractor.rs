use crate::error::RagError;
use lopdf::Document;
use std::path::Path;

/// File formats accepted for upload, recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    PlainText,
}

impl DocumentFormat {
    pub const EXTENSIONS: [&'static str; 3] = ["pdf", "txt", "md"];

    pub fn from_path(path: &Path) -> Result<Self, RagError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt") | Some("md") => Ok(Self::PlainText),
            _ => Err(RagError::InvalidFileType(format!(
                "{} (supported: {})",
                path.display(),
                Self::EXTENSIONS.join(", ")
            ))),
        }
    }

    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_ok()
    }
}

pub trait TextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, RagError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, RagError> {
        let document =
            Document::load(path).map_err(|error| RagError::Extraction(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| RagError::Extraction(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        Ok(pages.join(" "))
    }
}

#[derive(Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, RagError> {
        let bytes = std::fs::read(path)?;
        String::from_utf8(bytes)
            .map_err(|error| RagError::Extraction(format!("{} is not utf-8: {error}", path.display())))
    }
}

/// Extracts text with the extractor matching the file's extension.
pub fn extract_text(path: &Path) -> Result<String, RagError> {
    match DocumentFormat::from_path(path)? {
        DocumentFormat::Pdf => LopdfExtractor.extract_text(path),
        DocumentFormat::PlainText => PlainTextExtractor.extract_text(path),
    }
}
