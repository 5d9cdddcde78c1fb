use std::io::{Cursor, Read};

use quick_xml::{Reader, events::Event};

use crate::error::{AppError, Result};

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

/// Picks the parser from the MIME type, falling back to the extension.
pub fn detect_kind(content_type: &str, file_name: &str) -> Option<DocumentKind> {
    match content_type.trim().to_lowercase().as_str() {
        PDF_MIME => return Some(DocumentKind::Pdf),
        DOCX_MIME => return Some(DocumentKind::Docx),
        _ => {}
    }
    let extension = file_name.rsplit_once('.')?.1.to_lowercase();
    match extension.as_str() {
        "pdf" => Some(DocumentKind::Pdf),
        "docx" => Some(DocumentKind::Docx),
        _ => None,
    }
}

/// Extracts plain text on the blocking pool.
pub async fn extract_text(kind: DocumentKind, bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || extract_text_blocking(kind, &bytes)).await?
}

pub fn extract_text_blocking(kind: DocumentKind, bytes: &[u8]) -> Result<String> {
    let text = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| AppError::ValidationError(format!("Could not read PDF: {}", e)))?,
        DocumentKind::Docx => docx_text(bytes)?,
    };
    Ok(text.trim().to_string())
}

fn docx_text(bytes: &[u8]) -> Result<String> {
    let unreadable = |e: &dyn std::fmt::Display| {
        AppError::ValidationError(format!("Could not read DOCX: {}", e))
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| unreadable(&e))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| unreadable(&e))?
        .read_to_string(&mut xml)?;

    document_xml_text(&xml).map_err(|e| unreadable(&e))
}

/// Walks WordprocessingML runs: `w:t` text, `w:tab`, `w:br` and paragraph ends.
fn document_xml_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text_run => text.push_str(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}
