//! Knowledge store: the vector-backed document memory the chat session retrieves from.
//!
//! The store accepts a directory of PDFs, extracts and chunks their text, asks
//! an [`Embedder`](crate::embeddings::Embedder) for vectors, and keeps
//! everything in SQLite under a named table. Retrieval is a brute-force cosine
//! scan, which is plenty for a personal PDF folder.

pub mod chunker;
pub mod pdf;
pub mod store;

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

pub use chunker::{chunk_document, estimate_tokens, TextChunk};
pub use pdf::{extract_pdf, is_pdf, pdf_paths, ExtractedPdf};
pub use store::SqliteKnowledgeStore;

/// A chunk returned by retrieval, best match first
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievedChunk {
    pub file_name: String,
    pub chunk_text: String,
    pub score: f32,
    pub rank: usize,
}

/// Boundary to the knowledge store as seen by ingestion and the chat session
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Embed and store every PDF in `dir`; returns the number of documents added.
    /// Either the whole directory is stored or nothing is.
    async fn ingest(&self, dir: &Path) -> Result<usize>;

    /// Whether the store is open and can serve retrieval
    fn ready(&self) -> bool;

    /// Top `k` chunks for `query` with similarity of at least `min_score`
    async fn search(&self, query: &str, k: usize, min_score: f32) -> Result<Vec<RetrievedChunk>>;

    /// Number of documents stored in this table
    async fn document_count(&self) -> Result<usize>;
}
