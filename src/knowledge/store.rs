use super::chunker::{chunk_document, TextChunk};
use super::pdf::{extract_pdf, pdf_paths, ExtractedPdf};
use super::{KnowledgeStore, RetrievedChunk};
use crate::config::PerformanceConfig;
use crate::db::{migrate, Db};
use crate::embeddings::Embedder;
use crate::error::{Result, PdfChatError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// SQLite-backed knowledge store scoped to one named table
///
/// Several tables can share a database file; every row carries the table name
/// it belongs to and retrieval only looks at its own rows.
pub struct SqliteKnowledgeStore {
    db: Db,
    table_name: String,
    embedder: Arc<dyn Embedder>,
    chunking: PerformanceConfig,
}

/// A document with its chunks and their embeddings, ready to be written
struct PreparedDocument {
    pdf: ExtractedPdf,
    chunks: Vec<TextChunk>,
    embeddings: Vec<Vec<f32>>,
}

impl SqliteKnowledgeStore {
    /// Open the store at `db`, creating the schema on first use
    pub async fn create_or_open(
        db: Db,
        table_name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        chunking: PerformanceConfig,
    ) -> Result<Self> {
        let table_name = table_name.into();
        if table_name.trim().is_empty() {
            return Err(PdfChatError::Config("knowledge table name must not be empty".to_string()));
        }

        db.with_connection(migrate::run_migrations).await?;
        log::info!("Knowledge store '{}' opened at {}", table_name, db.path().display());

        Ok(Self {
            db,
            table_name,
            embedder,
            chunking,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Chunk and embed extracted documents, then write them in one transaction.
    async fn store_documents(&self, pdfs: Vec<ExtractedPdf>) -> Result<usize> {
        let mut documents: Vec<PreparedDocument> = pdfs
            .into_iter()
            .map(|pdf| {
                let chunks = chunk_document(&pdf.text, &self.chunking);
                PreparedDocument { pdf, chunks, embeddings: Vec::new() }
            })
            .collect();

        let texts: Vec<String> = documents
            .iter()
            .flat_map(|d| d.chunks.iter().map(|c| c.text.clone()))
            .collect();
        let total_chunks = texts.len();

        let mut embeddings = self.embedder.embed_batch(texts).await?.into_iter();
        if embeddings.len() != total_chunks {
            return Err(PdfChatError::Embedding(format!(
                "Expected {} embeddings, got {}",
                total_chunks,
                embeddings.len()
            )));
        }
        for doc in &mut documents {
            doc.embeddings = embeddings.by_ref().take(doc.chunks.len()).collect();
        }

        let table_name = self.table_name.clone();
        let count = documents.len();
        let ingested_at = Utc::now().to_rfc3339();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for doc in &documents {
                    let doc_id = Uuid::new_v4().to_string();
                    let content_tokens: usize = doc.chunks.iter().map(|c| c.tokens).sum();
                    tx.execute(
                        "INSERT INTO documents \
                         (doc_id, table_name, file_name, content_hash, page_count, \
                          content_tokens, ingested_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            doc_id,
                            table_name,
                            doc.pdf.file_name,
                            doc.pdf.content_hash,
                            doc.pdf.page_count as i64,
                            content_tokens as i64,
                            ingested_at,
                        ],
                    )?;
                    for (chunk, embedding) in doc.chunks.iter().zip(&doc.embeddings) {
                        tx.execute(
                            "INSERT INTO chunks \
                             (chunk_id, doc_id, chunk_index, chunk_text, tokens, embedding) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            params![
                                format!("{}::{}", doc_id, chunk.index),
                                doc_id,
                                chunk.index as i64,
                                chunk.text,
                                chunk.tokens as i64,
                                encode_embedding(embedding),
                            ],
                        )?;
                    }
                    log::info!("Indexed {} ({} chunks)", doc.pdf.file_name, doc.chunks.len());
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn ingest(&self, dir: &Path) -> Result<usize> {
        let dir = dir.to_path_buf();
        let pdfs = tokio::task::spawn_blocking(move || -> Result<Vec<ExtractedPdf>> {
            pdf_paths(&dir)?.iter().map(|p| extract_pdf(p)).collect()
        })
        .await
        .map_err(|e| PdfChatError::Extract(format!("extraction task failed: {}", e)))??;

        if pdfs.is_empty() {
            return Ok(0);
        }

        self.store_documents(pdfs).await
    }

    /// True while the database file exists and carries the migrated schema.
    /// Runs one small query on a fresh connection.
    fn ready(&self) -> bool {
        if !self.db.path().is_file() {
            return false;
        }
        let migrated = self.db.open_connection().and_then(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))?;
            Ok(count > 0)
        });
        match migrated {
            Ok(migrated) => migrated,
            Err(e) => {
                log::warn!("Knowledge store '{}' is not ready: {}", self.table_name, e);
                false
            }
        }
    }

    async fn search(&self, query: &str, k: usize, min_score: f32) -> Result<Vec<RetrievedChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let table_name = self.table_name.clone();

        let rows = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT d.file_name, c.chunk_text, c.embedding \
                     FROM chunks c JOIN documents d ON c.doc_id = d.doc_id \
                     WHERE d.table_name = ?1 AND c.embedding IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map(params![table_name], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        let mut scored: Vec<(f32, String, String)> = rows
            .into_iter()
            .filter_map(|(file_name, chunk_text, blob)| {
                let embedding = decode_embedding(&blob)?;
                if embedding.len() != query_vec.len() {
                    return None;
                }
                let score = cosine_similarity(&query_vec, &embedding);
                (score >= min_score).then_some((score, file_name, chunk_text))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(idx, (score, file_name, chunk_text))| RetrievedChunk {
                file_name,
                chunk_text,
                score,
                rank: idx + 1,
            })
            .collect())
    }

    async fn document_count(&self) -> Result<usize> {
        let table_name = self.table_name.clone();
        self.db
            .with_connection(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM documents WHERE table_name = ?1",
                    params![table_name],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
    }
}

/// Little-endian f32 BLOB encoding
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Cosine similarity; 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
