// Vector index module
// Exact nearest-neighbour search over embedded chunks


use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::embeddings::{Chunk, Embedder};
use crate::{ChatError, Result};

/// A retrieved chunk and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory index over one upload batch
///
/// Vectors are L2-normalised when the index is built, so similarity is a dot
/// product. Entries keep the order of the chunks they were built from, which
/// is also the tie-break order for equal scores.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    built_at: DateTime<Utc>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for VectorIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("entries", &self.entries.len())
            .field("dimension", &self.dimension)
            .field("built_at", &self.built_at)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Embed every chunk and build the index
    #[inline]
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::build_with_progress(chunks, embedder, &mut |_, _| {}).await
    }

    /// Same as [`VectorIndex::build`], reporting `(embedded, total)` after each batch
    #[inline]
    pub async fn build_with_progress(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        progress: &mut (dyn FnMut(usize, usize) + Send),
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(ChatError::Extraction(
                "no text could be extracted from the uploaded files".to_string(),
            ));
        }

        let total = chunks.len();
        let batch_size = embedder.batch_size().max(1);
        info!(
            "Embedding {} chunks in batches of {}",
            total, batch_size
        );

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embedded = embedder
                .embed(&texts)
                .await
                .map_err(|e| ChatError::Embedding(e.to_string()))?;

            if embedded.len() != texts.len() {
                return Err(ChatError::Embedding(format!(
                    "expected {} vectors but the service returned {}",
                    texts.len(),
                    embedded.len()
                )));
            }

            vectors.extend(embedded);
            progress(vectors.len(), total);
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension == 0 {
            return Err(ChatError::Embedding(
                "the service returned empty vectors".to_string(),
            ));
        }

        if let Some(position) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(ChatError::Embedding(format!(
                "vector {} has dimension {} but the index uses {}",
                position,
                vectors.get(position).map_or(0, Vec::len),
                dimension
            )));
        }

        if let Some(position) = vectors.iter().position(|v| !is_finite(v)) {
            return Err(ChatError::Embedding(format!(
                "vector {} contains non-finite values",
                position
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, mut vector)| {
                normalize(&mut vector);
                IndexEntry { chunk, vector }
            })
            .collect_vec();

        info!(
            "Built index with {} chunks of dimension {}",
            entries.len(),
            dimension
        );

        Ok(Self {
            entries,
            dimension,
            built_at: Utc::now(),
            embedder,
        })
    }

    /// Return the `k` chunks most similar to `query`, best first
    ///
    /// `k` is clamped to the number of indexed chunks.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let k = k.min(self.entries.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching {} chunks for: '{}'", self.entries.len(), query);

        let mut query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| ChatError::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Embedding("no vector returned for the query".to_string()))?;

        if query_vector.len() != self.dimension {
            return Err(ChatError::Embedding(format!(
                "query vector has dimension {} but the index uses {}",
                query_vector.len(),
                self.dimension
            )));
        }
        if !is_finite(&query_vector) {
            return Err(ChatError::Embedding(
                "query vector contains non-finite values".to_string(),
            ));
        }
        normalize(&mut query_vector);

        let hits = self
            .entries
            .iter()
            .enumerate()
            .map(|(ordinal, entry)| (ordinal, dot(&query_vector, &entry.vector)))
            .sorted_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(k)
            .filter_map(|(ordinal, score)| {
                self.entries.get(ordinal).map(|entry| SearchHit {
                    chunk: entry.chunk.clone(),
                    score,
                })
            })
            .collect_vec();

        debug!(
            "Top score {:?} across {} results",
            hits.first().map(|hit| hit.score),
            hits.len()
        );
        Ok(hits)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub const fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Indexed chunks in build order
    #[inline]
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Distinct source file names in build order
    #[inline]
    pub fn sources(&self) -> Vec<&str> {
        self.chunks()
            .map(|chunk| chunk.source.as_str())
            .unique()
            .collect()
    }
}

fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
