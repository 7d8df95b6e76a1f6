
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ChatError;

/// A file handed over by the upload surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    #[inline]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its file name
    #[inline]
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, bytes })
    }
}

/// Raw text extracted from one uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name the text came from
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    /// Map a file name to a supported kind by its extension
    #[inline]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to load PDF: {0}")]
    Pdf(String),

    #[error("Failed to read DOCX archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to parse DOCX XML: {0}")]
    Xml(String),

    #[error("Text file is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-file result of an upload batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Loaded { characters: usize },
    Skipped { reason: String },
    Failed { error: String },
}

impl FileOutcome {
    #[inline]
    pub const fn is_loaded(&self) -> bool {
        matches!(self.status, FileStatus::Loaded { .. })
    }
}

/// Extract the text of a single file according to its kind
#[inline]
pub fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String, ExtractionError> {
    match kind {
        DocumentKind::Pdf => extract_pdf_text(bytes),
        DocumentKind::Docx => extract_docx_text(bytes),
        DocumentKind::Text => extract_plain_text(bytes),
    }
}

/// Load one uploaded file into a document
#[inline]
pub fn load_document(file: &UploadedFile) -> Result<Document, ChatError> {
    let kind = DocumentKind::from_file_name(&file.name)
        .ok_or_else(|| ChatError::UnsupportedFileType(file.name.clone()))?;

    let text = extract_text(kind, &file.bytes)
        .map_err(|e| ChatError::Extraction(format!("{}: {}", file.name, e)))?;

    Ok(Document {
        source: file.name.clone(),
        text,
    })
}

/// Load every file of an upload batch.
///
/// Unsupported extensions and files without any text are skipped, extraction
/// failures are recorded and the remaining files are still processed.
#[inline]
pub fn load_documents(files: &[UploadedFile]) -> (Vec<Document>, Vec<FileOutcome>) {
    let mut documents = Vec::with_capacity(files.len());
    let mut outcomes = Vec::with_capacity(files.len());

    for file in files {
        let status = match load_document(file) {
            Ok(document) if document.text.trim().is_empty() => {
                debug!("No text extracted from {}", file.name);
                FileStatus::Skipped {
                    reason: "no extractable text".to_string(),
                }
            }
            Ok(document) => {
                let characters = document.text.chars().count();
                debug!("Extracted {} characters from {}", characters, file.name);
                documents.push(document);
                FileStatus::Loaded { characters }
            }
            Err(ChatError::UnsupportedFileType(name)) => {
                debug!("Skipping unsupported file {}", name);
                FileStatus::Skipped {
                    reason: "unsupported file type".to_string(),
                }
            }
            Err(e) => {
                warn!("Failed to load {}: {}", file.name, e);
                FileStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        outcomes.push(FileOutcome {
            file_name: file.name.clone(),
            status,
        });
    }

    info!(
        "Loaded {} of {} uploaded files",
        documents.len(),
        files.len()
    );

    (documents, outcomes)
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document =
        lopdf::Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for page_number in document.get_pages().keys() {
        let page_text = document
            .extract_text(&[*page_number])
            .map_err(|e| ExtractionError::Pdf(format!("page {}: {}", page_number, e)))?;
        text.push_str(&page_text);
        if !page_text.ends_with('\n') {
            text.push('\n');
        }
    }

    Ok(text)
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut document_xml)?;

    parse_document_xml(&document_xml)
}

/// Walk WordprocessingML and collect run text, one line per paragraph
fn parse_document_xml(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:r" => in_run = true,
                b"w:t" => in_text = true,
                b"w:p" => current.clear(),
                _ => {}
            },
            // <w:tab/> also appears in paragraph properties, only runs carry text
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" if in_run => current.push('\t'),
                b"w:br" | b"w:cr" if in_run => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:r" => in_run = false,
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Xml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}

fn extract_plain_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8(bytes.to_vec())?)
}
