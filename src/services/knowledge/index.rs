//! Reference-Text Index
//!
//! Chunks the static reference text, embeds the chunks, and answers top-k
//! similarity queries against them.
//!
//! The index is persisted under the vector directory as `index.json` plus
//! `text_hash.txt` (SHA-256 of the source text, hex). On start-up the stored
//! index is reused when the hash matches and the artifacts load; otherwise it
//! is rebuilt and overwritten. The hash file is written last, so an
//! interrupted write forces a rebuild next time.
//!
//! One process is assumed to own a vector directory. Two writers rebuilding
//! at once race and the last one wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunker::RecursiveChunker;
use super::embedding::{cosine_similarity, EmbeddingProvider};
use crate::utils::error::AppResult;
use crate::utils::paths::ensure_dir;

pub const INDEX_FILE: &str = "index.json";
pub const HASH_FILE: &str = "text_hash.txt";

/// One chunk of reference text with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    provider: String,
    chunk_size: usize,
    chunk_overlap: usize,
    chunks: Vec<IndexedChunk>,
}

/// A loaded or freshly built index.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    chunks: Vec<IndexedChunk>,
    text_hash: String,
    rebuilt: bool,
}

impl IndexHandle {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    pub fn text_hash(&self) -> &str {
        &self.text_hash
    }

    /// Whether this handle came from a rebuild rather than the stored index.
    pub fn was_rebuilt(&self) -> bool {
        self.rebuilt
    }
}

/// SHA-256 of `text` as lowercase hex.
pub fn text_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Builds, persists and queries the reference-text index.
pub struct ContextRetriever {
    provider: Box<dyn EmbeddingProvider>,
    vector_dir: PathBuf,
}

impl ContextRetriever {
    pub fn new(provider: Box<dyn EmbeddingProvider>, vector_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            vector_dir: vector_dir.into(),
        }
    }

    pub fn vector_dir(&self) -> &Path {
        &self.vector_dir
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Load the stored index for `text`, or build and persist a new one.
    ///
    /// Returns `None` for empty text.
    pub async fn build_index(
        &self,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> AppResult<Option<IndexHandle>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let hash = text_hash(text);
        if let Some(stored) = self.load_stored(&hash, chunk_size, chunk_overlap) {
            let corpus: Vec<String> = stored.chunks.iter().map(|c| c.text.clone()).collect();
            self.provider.prepare(&corpus);
            tracing::info!(
                chunks = stored.chunks.len(),
                dir = %self.vector_dir.display(),
                "reusing stored reference index"
            );
            return Ok(Some(IndexHandle {
                chunks: stored.chunks,
                text_hash: hash,
                rebuilt: false,
            }));
        }

        let chunker = RecursiveChunker::new(chunk_size, chunk_overlap)?;
        let texts = chunker.split_text(text);
        self.provider.prepare(&texts);
        let vectors = self.provider.embed_documents(&texts).await?;

        let chunks: Vec<IndexedChunk> = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| IndexedChunk { text, vector })
            .collect();

        let persisted = PersistedIndex {
            provider: self.provider.name().to_string(),
            chunk_size,
            chunk_overlap,
            chunks,
        };
        self.persist(&persisted, &hash)?;

        tracing::info!(
            chunks = persisted.chunks.len(),
            provider = %persisted.provider,
            dir = %self.vector_dir.display(),
            "rebuilt reference index"
        );
        Ok(Some(IndexHandle {
            chunks: persisted.chunks,
            text_hash: hash,
            rebuilt: true,
        }))
    }

    /// The `top_k` chunks most similar to `query`, joined with newlines.
    ///
    /// An empty query returns the first `top_k` chunks in document order.
    /// Embedding failures are logged and yield an empty string.
    pub async fn retrieve(&self, handle: &IndexHandle, query: &str, top_k: usize) -> String {
        if handle.is_empty() || top_k == 0 {
            return String::new();
        }

        if query.trim().is_empty() {
            return join_chunks(handle.chunks.iter().take(top_k));
        }

        let query_vector = match self.provider.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to embed retrieval query");
                return String::new();
            }
        };

        let mut scored: Vec<(f32, &IndexedChunk)> = handle
            .chunks
            .iter()
            .map(|c| (cosine_similarity(&query_vector, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        join_chunks(scored.into_iter().take(top_k).map(|(_, c)| c))
    }

    fn load_stored(
        &self,
        hash: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Option<PersistedIndex> {
        let stored_hash = fs::read_to_string(self.vector_dir.join(HASH_FILE)).ok()?;
        if stored_hash.trim() != hash {
            tracing::debug!("reference text changed since last index build");
            return None;
        }

        let raw = fs::read_to_string(self.vector_dir.join(INDEX_FILE)).ok()?;
        let stored: PersistedIndex = match serde_json::from_str(&raw) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "stored reference index is unreadable");
                return None;
            }
        };

        if stored.provider != self.provider.name()
            || stored.chunk_size != chunk_size
            || stored.chunk_overlap != chunk_overlap
        {
            tracing::debug!(
                stored_provider = %stored.provider,
                "stored index was built with different settings"
            );
            return None;
        }
        Some(stored)
    }

    fn persist(&self, index: &PersistedIndex, hash: &str) -> AppResult<()> {
        ensure_dir(&self.vector_dir)?;
        fs::write(
            self.vector_dir.join(INDEX_FILE),
            serde_json::to_string(index)?,
        )?;
        fs::write(self.vector_dir.join(HASH_FILE), hash)?;
        Ok(())
    }
}

fn join_chunks<'a>(chunks: impl Iterator<Item = &'a IndexedChunk>) -> String {
    chunks
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
