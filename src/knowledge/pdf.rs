//! PDF text extraction.

use crate::error::{Result, PdfChatError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Text and metadata pulled out of one PDF file
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    pub file_name: String,
    pub text: String,
    pub page_count: usize,
    pub content_hash: String,
}

/// Whether `path` names a PDF by extension (case-insensitive)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// PDF files directly inside `dir` (no recursion), sorted by path.
///
/// Subdirectories such as `processed/` are never descended into.
pub fn pdf_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            PdfChatError::Io(std::io::Error::other(format!("{}: {}", dir.display(), e)))
        })?;
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

/// Read a PDF from disk and extract its text.
///
/// A document without any extractable text (e.g. a scanned image) is an
/// error: indexing it would silently make it unanswerable.
pub fn extract_pdf(path: &Path) -> Result<ExtractedPdf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PdfChatError::Extract(format!("invalid file name: {}", path.display())))?
        .to_string();

    let bytes = std::fs::read(path)?;
    let content_hash = format!("{:x}", Sha256::digest(&bytes));

    let raw = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| PdfChatError::Extract(format!("{}: {}", file_name, e)))?;

    // Pages are separated by form feeds in the extractor's output
    let page_count = raw.matches('\x0C').count().max(1);
    let text = clean_pdf_text(&raw);

    if text.is_empty() {
        return Err(PdfChatError::Extract(format!("{}: no extractable text", file_name)));
    }

    log::debug!("Extracted {} characters from {}", text.len(), file_name);

    Ok(ExtractedPdf {
        file_name,
        text,
        page_count,
        content_hash,
    })
}

/// Normalize extractor output: trim lines, drop form feeds, and collapse
/// runs of blank lines into one.
pub fn clean_pdf_text(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\x0C');
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
