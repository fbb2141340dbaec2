//! Reference Knowledge
//!
//! Retrieval over the static reference text: chunking, embeddings, and the
//! persisted similarity index.

pub mod chunker;
pub mod embedding;
pub mod index;

pub use chunker::RecursiveChunker;
pub use embedding::{
    build_embedding_provider, cosine_similarity, EmbeddingProvider, OpenAIEmbedder, TfIdfEmbedder,
};
pub use index::{text_hash, ContextRetriever, IndexHandle, IndexedChunk};
