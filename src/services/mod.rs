//! Services
//!
//! Business logic for a chat session: prompt assembly, reference-text
//! retrieval, and the per-turn pipeline.

pub mod knowledge;
pub mod pipeline;
pub mod prompt;
pub mod reference;
pub mod session;

pub use knowledge::{build_embedding_provider, ContextRetriever, EmbeddingProvider, IndexHandle};
pub use pipeline::{ChatPipeline, PipelineSettings, TurnOutcome, TurnStage};
pub use prompt::PromptBuilder;
pub use reference::load_reference_text;
pub use session::ChatSession;
