// Embeddings module
// Chunking of extracted text and the embedding service seam

pub mod chunking;

use async_trait::async_trait;

use crate::ollama::{OllamaClient, ServiceError, run_blocking};

pub use chunking::{Chunk, ChunkingConfig, Chunks, chunk_document, chunk_documents};

/// Maps text to fixed-dimension vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    /// Preferred number of texts per call
    fn batch_size(&self) -> usize {
        32
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    #[inline]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let client = self.clone();
        let texts = texts.to_vec();
        run_blocking(move || client.embed_batch(&texts)).await
    }

    #[inline]
    fn batch_size(&self) -> usize {
        OllamaClient::batch_size(self).max(1) as usize
    }
}
