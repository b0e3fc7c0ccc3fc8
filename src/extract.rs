//! Cheap local metadata probes and PDF physical splitting.
//!
//! Everything here is best-effort: callers treat a `None` as "no metadata"
//! and keep going. The external extraction service owns real content
//! extraction; this module only reads what the file formats carry for free
//! (PDF Info dictionary, OOXML docProps) and slices oversized PDFs into
//! page-bounded sub-files.

use std::io::Read;

use lopdf::{Document, Object};

use crate::error::IngestError;

/// Decompressed size ceiling for a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Bibliographic fields readable without an extraction service.
#[derive(Debug, Default, Clone)]
pub struct LocalMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub page_count: Option<usize>,
}

/// Probe a PDF's Info dictionary and page count.
pub fn pdf_metadata(bytes: &[u8]) -> Option<LocalMetadata> {
    let doc = Document::load_mem(bytes).ok()?;
    let mut meta = LocalMetadata {
        page_count: Some(doc.get_pages().len()),
        ..Default::default()
    };

    if let Ok(info_ref) = doc.trailer.get(b"Info") {
        let info = match info_ref {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        };
        if let Some(info) = info {
            meta.title = info_string(info, b"Title");
            meta.author = info_string(info, b"Author");
            meta.subject = info_string(info, b"Subject");
            meta.keywords = info_string(info, b"Keywords");
        }
    }

    Some(meta)
}

fn info_string(dict: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        _ => None,
    }
}

/// PDF text strings are either UTF-16BE with a BOM or byte-per-char.
fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    let text = if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Probe an OOXML container's docProps/core.xml.
pub fn ooxml_metadata(bytes: &[u8]) -> Option<LocalMetadata> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).ok()?;
    let xml = {
        let entry = archive.by_name("docProps/core.xml").ok()?;
        let mut out = Vec::new();
        entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out).ok()?;
        out
    };

    let mut meta = LocalMetadata::default();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_field: Option<&'static str> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                current_field = match e.local_name().as_ref() {
                    b"title" => Some("title"),
                    b"creator" => Some("author"),
                    b"subject" => Some("subject"),
                    b"keywords" => Some("keywords"),
                    _ => None,
                };
            }
            Ok(quick_xml::events::Event::Text(te)) => {
                if let Some(field) = current_field.take() {
                    let value = te.unescape().unwrap_or_default().trim().to_string();
                    if value.is_empty() {
                        continue;
                    }
                    match field {
                        "title" => meta.title = Some(value),
                        "author" => meta.author = Some(value),
                        "subject" => meta.subject = Some(value),
                        "keywords" => meta.keywords = Some(value),
                        _ => {}
                    }
                }
            }
            Ok(quick_xml::events::Event::End(_)) => current_field = None,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    Some(meta)
}

/// Split a PDF into sub-files of at most `pages_per_part` pages each,
/// preserving page order across parts.
pub fn split_pdf(bytes: &[u8], pages_per_part: usize) -> Result<Vec<Vec<u8>>, IngestError> {
    if pages_per_part == 0 {
        return Err(IngestError::Validation(
            "pages_per_part must be > 0".to_string(),
        ));
    }
    let doc = Document::load_mem(bytes)
        .map_err(|e| IngestError::Validation(format!("unreadable PDF: {e}")))?;
    let total_pages = doc.get_pages().len();
    if total_pages <= pages_per_part {
        return Ok(vec![bytes.to_vec()]);
    }

    let mut parts = Vec::new();
    let mut start = 1usize;
    while start <= total_pages {
        let end = (start + pages_per_part - 1).min(total_pages);
        // Deleting the complement keeps shared resources intact.
        let delete: Vec<u32> = (1..=total_pages as u32)
            .filter(|p| (*p as usize) < start || (*p as usize) > end)
            .collect();
        let mut part = doc.clone();
        part.delete_pages(&delete);
        part.prune_objects();
        let mut out = Vec::new();
        part.save_to(&mut out)
            .map_err(|e| IngestError::Internal(anyhow::anyhow!("PDF split failed: {e}")))?;
        parts.push(out);
        start = end + 1;
    }

    Ok(parts)
}
