//! PDF text extraction boundary.
//!
//! Parsing and OCR are a library concern; the orchestrator only sees this
//! trait. Non-PDF uploads are rejected before this layer.

use rg_domain::error::{Error, Result};

#[derive(Debug)]
pub struct ExtractedPdf {
    pub text: String,
    pub page_count: u32,
}

pub trait PdfExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedPdf>;
}

/// lopdf-backed extractor.
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedPdf> {
        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| Error::Other(format!("unreadable PDF: {e}")))?;

        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        let page_count = pages.len() as u32;
        if page_count == 0 {
            return Err(Error::Other("PDF contains no pages".into()));
        }

        let text = doc
            .extract_text(&pages)
            .map_err(|e| Error::Other(format!("PDF text extraction failed: {e}")))?;

        // Normalize whitespace: chunking and reassembly are word-based, so
        // the stored body is the canonical single-spaced form.
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(Error::Other(
                "PDF contains no extractable text (scanned image?)".into(),
            ));
        }

        Ok(ExtractedPdf { text, page_count })
    }
}

/// Cheap magic-byte check used before parsing.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_byte_check() {
        assert!(looks_like_pdf(b"%PDF-1.7 rest"));
        assert!(!looks_like_pdf(b"PK\x03\x04zip"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn garbage_bytes_fail_extraction() {
        let err = LopdfExtractor.extract(b"not a pdf at all").unwrap_err();
        assert!(err.to_string().contains("unreadable PDF"));
    }
}
