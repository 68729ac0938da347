//! Text extraction: raw upload bytes + filename → plain text.
//!
//! Dispatch is on the filename suffix (case-insensitive):
//!
//! | Suffix | Variant |
//! |--------|---------|
//! | `.pdf` | per-page text via pdfium, concatenated in page order |
//! | `.txt`, `.md`, `.markdown` | UTF-8 decode, invalid bytes dropped |
//! | `.html`, `.htm` | decode, drop `<script>`/`<style>` blocks, strip tags, collapse whitespace |
//! | anything else | best-effort UTF-8 decode, never fails |
//!
//! An all-whitespace result is *not* an extraction error. The caller decides
//! whether that is an empty-content rejection.
//!
//! pdfium wraps a C++ library with thread-local state, so PDF extraction must
//! run off the async executor; [`extract_text_async`] moves the work into
//! `spawn_blocking`.

use crate::error::StudyError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use tracing::{debug, info};

/// Input format selected from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    PlainText,
    Html,
    Fallback,
}

impl SourceFormat {
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            SourceFormat::Pdf
        } else if [".txt", ".md", ".markdown"].iter().any(|s| lower.ends_with(s)) {
            SourceFormat::PlainText
        } else if [".html", ".htm"].iter().any(|s| lower.ends_with(s)) {
            SourceFormat::Html
        } else {
            SourceFormat::Fallback
        }
    }
}

/// Extract plain text from an upload. Blocking for PDFs.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, StudyError> {
    let format = SourceFormat::from_filename(filename);
    debug!(filename, ?format, bytes = bytes.len(), "Extracting text");

    match format {
        SourceFormat::Pdf => extract_pdf(bytes, filename),
        SourceFormat::PlainText | SourceFormat::Fallback => Ok(decode_lossy(bytes)),
        SourceFormat::Html => Ok(strip_html(&decode_lossy(bytes))),
    }
}

/// Async wrapper around [`extract_text`] that keeps pdfium off the executor.
pub async fn extract_text_async(bytes: Vec<u8>, filename: String) -> Result<String, StudyError> {
    if SourceFormat::from_filename(&filename) != SourceFormat::Pdf {
        return extract_text(&bytes, &filename);
    }

    tokio::task::spawn_blocking(move || extract_text(&bytes, &filename))
        .await
        .map_err(|e| StudyError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Decode UTF-8, silently dropping undecodable bytes. A U+FFFD already
/// present in valid input is kept.
fn decode_lossy(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

// ── HTML ────────────────────────────────────────────────────────────────────

static RE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static RE_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn strip_html(html: &str) -> String {
    let s = RE_SCRIPT.replace_all(html, "");
    let s = RE_STYLE.replace_all(&s, "");
    let s = RE_TAG.replace_all(&s, " ");
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}

// ── PDF ─────────────────────────────────────────────────────────────────────

fn extract_pdf(bytes: &[u8], filename: &str) -> Result<String, StudyError> {
    // A zero-byte upload is a document with no pages.
    if bytes.is_empty() {
        return Ok(String::new());
    }

    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| StudyError::PdfiumBindingFailed(e.to_string()))?;

    let document =
        pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| StudyError::PdfExtractionFailed {
                filename: filename.to_string(),
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let mut text = String::new();

    for (idx, page) in pages.iter().enumerate() {
        let page_text = page.text().map_err(|e| StudyError::PdfExtractionFailed {
            filename: filename.to_string(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        text.push_str(&page_text.all());
    }

    info!(filename, pages = total_pages, chars = text.len(), "PDF text extracted");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_on_suffix() {
        assert_eq!(SourceFormat::from_filename("Lecture.PDF"), SourceFormat::Pdf);
        assert_eq!(SourceFormat::from_filename("a.md"), SourceFormat::PlainText);
        assert_eq!(
            SourceFormat::from_filename("a.markdown"),
            SourceFormat::PlainText
        );
        assert_eq!(SourceFormat::from_filename("a.txt"), SourceFormat::PlainText);
        assert_eq!(SourceFormat::from_filename("page.HTM"), SourceFormat::Html);
        assert_eq!(SourceFormat::from_filename("page.html"), SourceFormat::Html);
        assert_eq!(SourceFormat::from_filename("notes.rtf"), SourceFormat::Fallback);
        assert_eq!(SourceFormat::from_filename(""), SourceFormat::Fallback);
    }

    #[test]
    fn plain_text_decodes_and_drops_invalid_bytes() {
        let bytes = b"Gradient \xff\xfedescent";
        assert_eq!(extract_text(bytes, "n.txt").unwrap(), "Gradient descent");
    }

    #[test]
    fn fallback_never_fails() {
        assert_eq!(extract_text(&[0xC3, 0x28], "blob.bin").unwrap(), "(");
        assert_eq!(extract_text(b"", "blob.bin").unwrap(), "");
    }

    #[test]
    fn literal_replacement_character_survives() {
        let mut bytes = "Marks: \u{FFFD} means unreadable ".as_bytes().to_vec();
        bytes.extend_from_slice(&[0xE2, 0x82]);
        bytes.extend_from_slice(b"glyph");
        assert_eq!(
            extract_text(&bytes, "legend.md").unwrap(),
            "Marks: \u{FFFD} means unreadable glyph"
        );
    }

    #[test]
    fn html_strips_scripts_styles_and_tags() {
        let html = r#"<html><head><STYLE type="text/css">body { color: red }</STYLE>
<script>alert("x")</script></head>
<body><h1>Week 3</h1>
<p>Exam   on <b>Friday</b></p><Script src="a.js"></Script></body></html>"#;
        let text = extract_text(html.as_bytes(), "notes.html").unwrap();
        assert_eq!(text, "Week 3 Exam on Friday");
        assert!(!text.contains('<'));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
    }

    #[test]
    fn empty_pdf_is_empty_text() {
        assert_eq!(extract_text(b"", "empty.pdf").unwrap(), "");
    }

    #[tokio::test]
    async fn async_extraction_of_text_files() {
        let text = extract_text_async(b"  \n\t ".to_vec(), "blank.md".into())
            .await
            .unwrap();
        assert!(text.trim().is_empty());
    }
}
