pub mod cache;
pub mod openai;

use crate::error::Result;
use async_trait::async_trait;

pub use cache::QueryEmbeddingCache;
pub use openai::OpenAIEmbedder;

/// Embedding function handed to the knowledge store
///
/// The hosted provider is the production implementation; tests substitute a
/// deterministic local one.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed many texts, returning one vector per input in input order
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a single question
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(vec![text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| {
                crate::error::PdfChatError::Embedding("no embedding returned".to_string())
            })
    }
}
