//! Best-effort plain-text recovery from downloaded bytes (PDF, OOXML, text).
//!
//! [`extract`] is total: it never panics or errors. Anything it cannot read
//! becomes [`Placeholder::Binary`]. Dispatch is purely on the filename
//! suffix, case-insensitive; the provider's declared MIME type is ignored.
//! Output is whitespace-collapsed and cut to a character budget before it
//! ever reaches a prompt.

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::config::ExtractConfig;
use crate::models::{Content, Placeholder};

/// Appended when text is cut to its budget.
pub const ELLIPSIS: &str = " ...";

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Slides beyond this are ignored.
const PPTX_MAX_SLIDES: usize = 500;

/// Character and page budgets for one extraction.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Budget for office documents and plain text.
    pub max_chars: usize,
    pub pdf_max_chars: usize,
    pub pdf_max_pages: usize,
    /// Plain text is decoded from at most this many leading bytes.
    pub text_sample_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&ExtractConfig::default())
    }
}

impl From<&ExtractConfig> for Limits {
    fn from(c: &ExtractConfig) -> Self {
        Self {
            max_chars: c.max_chars,
            pdf_max_chars: c.pdf_max_chars,
            pdf_max_pages: c.pdf_max_pages,
            text_sample_bytes: c.text_sample_bytes,
        }
    }
}

impl Limits {
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub content: Content,
    pub truncated: bool,
}

impl Extraction {
    fn binary(len: usize) -> Self {
        Self {
            content: Content::Placeholder(Placeholder::Binary { bytes: len }),
            truncated: false,
        }
    }

    fn text(raw: &str, max_chars: usize) -> Self {
        let (text, truncated) = truncate_chars(&collapse_whitespace(raw), max_chars);
        Self {
            content: Content::Text(text),
            truncated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Text,
}

fn detect_format(filename: &str) -> Format {
    let lower = filename.trim().to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        Format::Pdf
    } else if lower.ends_with(".docx") {
        Format::Docx
    } else if lower.ends_with(".pptx") {
        Format::Pptx
    } else if lower.ends_with(".xlsx") {
        Format::Xlsx
    } else {
        Format::Text
    }
}

/// Extract readable text from `bytes`, dispatching on `filename`.
pub fn extract(filename: &str, bytes: &[u8], limits: &Limits) -> Extraction {
    match detect_format(filename) {
        Format::Pdf => extract_pdf(bytes, limits),
        Format::Docx => office(bytes, limits.max_chars, extract_docx),
        Format::Pptx => office(bytes, limits.max_chars, extract_pptx),
        Format::Xlsx => office(bytes, limits.max_chars, extract_xlsx),
        Format::Text => extract_plain(bytes, limits),
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to `max_chars` characters, appending [`ELLIPSIS`] when anything was
/// dropped. Counts `char`s, never splits a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => (format!("{}{}", &s[..idx], ELLIPSIS), true),
        None => (s.to_string(), false),
    }
}

/// `dh extract`: run the extractor on a local file and print the result.
pub fn run_extract(path: &Path, limits: &Limits) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out = extract(&name, &bytes, limits);
    println!("{}", out.content);
    eprintln!(
        "{} bytes, {}{}",
        bytes.len(),
        if out.content.is_readable() { "text" } else { "placeholder" },
        if out.truncated { ", truncated" } else { "" }
    );
    Ok(())
}

fn extract_plain(bytes: &[u8], limits: &Limits) -> Extraction {
    let sample = &bytes[..bytes.len().min(limits.text_sample_bytes)];
    // Invalid sequences (including a code point cut by the sample boundary)
    // are dropped; everything that decodes is kept verbatim.
    let mut decoded = String::with_capacity(sample.len());
    for chunk in sample.utf8_chunks() {
        decoded.push_str(chunk.valid());
    }
    Extraction::text(&decoded, limits.max_chars)
}

// ============ PDF ============

/// Text of the first `pdf_max_pages` pages. The document is parsed once with
/// `lopdf`; pages past the budget are never decoded by either backend.
fn extract_pdf(bytes: &[u8], limits: &Limits) -> Extraction {
    let Some(mut doc) = guarded("lopdf load", || lopdf::Document::load_mem(bytes)) else {
        return Extraction::binary(bytes.len());
    };
    let keep: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .take(limits.pdf_max_pages.max(1))
        .collect();
    if keep.is_empty() {
        return Extraction::binary(bytes.len());
    }

    let text = guarded("lopdf text", || doc.extract_text(&keep))
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            tracing::debug!("lopdf text layer empty, trying pdf-extract");
            pdf_extract_first_pages(&mut doc, &keep).filter(|t| !t.trim().is_empty())
        });
    match text {
        Some(t) => Extraction::text(&t, limits.pdf_max_chars),
        None => Extraction::binary(bytes.len()),
    }
}

/// Drop every page outside `keep`, re-serialize, and run `pdf-extract` on
/// what is left.
fn pdf_extract_first_pages(doc: &mut lopdf::Document, keep: &[u32]) -> Option<String> {
    let surplus: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .filter(|n| !keep.contains(n))
        .collect();
    if !surplus.is_empty() {
        doc.delete_pages(&surplus);
        doc.prune_objects();
    }
    let mut trimmed = Vec::new();
    guarded("lopdf save", || doc.save_to(&mut trimmed))?;
    guarded("pdf-extract", || pdf_extract::extract_text_from_mem(&trimmed))
}

/// Run one PDF backend call. Malformed input can make either parser error
/// or panic; both become `None`.
fn guarded<T, E: std::fmt::Display>(what: &str, f: impl FnOnce() -> Result<T, E>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "{} failed", what);
            None
        }
        Err(_) => {
            tracing::debug!("{} panicked", what);
            None
        }
    }
}

// ============ OOXML ============

#[derive(Debug)]
struct OoxmlError(String);

impl From<zip::result::ZipError> for OoxmlError {
    fn from(e: zip::result::ZipError) -> Self {
        OoxmlError(e.to_string())
    }
}

impl From<std::io::Error> for OoxmlError {
    fn from(e: std::io::Error) -> Self {
        OoxmlError(e.to_string())
    }
}

impl From<quick_xml::Error> for OoxmlError {
    fn from(e: quick_xml::Error) -> Self {
        OoxmlError(e.to_string())
    }
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn office(
    bytes: &[u8],
    max_chars: usize,
    read: fn(&mut Archive<'_>) -> Result<String, OoxmlError>,
) -> Extraction {
    let text = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(OoxmlError::from)
        .and_then(|mut archive| read(&mut archive));
    match text {
        Ok(t) if !t.trim().is_empty() => Extraction::text(&t, max_chars),
        Ok(_) => Extraction::binary(bytes.len()),
        Err(e) => {
            tracing::debug!(error = %e.0, "OOXML extraction failed");
            Extraction::binary(bytes.len())
        }
    }
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, OoxmlError> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(OoxmlError(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(archive: &mut Archive<'_>) -> Result<String, OoxmlError> {
    let xml = read_zip_entry_bounded(archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    collect_text_runs(&xml, b"t", &[b"p"])
}

fn extract_pptx(archive: &mut Archive<'_>) -> Result<String, OoxmlError> {
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let mut out = String::new();
    for name in slide_names.into_iter().take(PPTX_MAX_SLIDES) {
        let xml = read_zip_entry_bounded(archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = collect_text_runs(&xml, b"t", &[b"p"])?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_xlsx(archive: &mut Archive<'_>) -> Result<String, OoxmlError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    // Rich-text runs inside one cell string are separate tokens.
    collect_text_runs(&xml, b"t", &[b"si", b"r"])
}

/// Concatenate the text of every `<run>` element (matched on local name, so
/// `w:t` and `a:t` both hit `t`), inserting a space whenever one of the
/// `breaks` elements closes. Markup never leaks into the output.
fn collect_text_runs(xml: &[u8], run: &[u8], breaks: &[&[u8]]) -> Result<String, OoxmlError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut depth_in_run = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == run => depth_in_run += 1,
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == run {
                    depth_in_run = depth_in_run.saturating_sub(1);
                } else if breaks.iter().any(|b| *b == name.as_ref())
                    && !out.ends_with(' ')
                    && !out.is_empty()
                {
                    out.push(' ');
                }
            }
            Event::Text(te) if depth_in_run > 0 => {
                out.push_str(te.unescape()?.as_ref());
            }
            Event::CData(cd) if depth_in_run > 0 => {
                out.push_str(&String::from_utf8_lossy(&cd));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
