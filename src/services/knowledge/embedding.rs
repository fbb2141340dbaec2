//! Embedding Providers
//!
//! The `EmbeddingProvider` trait and its two implementations:
//! - `TfIdfEmbedder`: local TF-IDF vectors, no network access (default)
//! - `OpenAIEmbedder`: the OpenAI `/embeddings` endpoint over reqwest
//!
//! TF-IDF needs a vocabulary learned from the indexed chunks, so the index
//! calls `prepare` with the chunk corpus before embedding anything, both
//! when building and when loading a persisted index.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use askdb_core::{retry_with_policy, RetryPolicy};
use askdb_llm::provider::{missing_api_key_error, parse_http_error};
use askdb_llm::{build_http_client, LlmError};
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::settings::EmbeddingProviderKind;
use crate::utils::error::{AppError, AppResult};

/// Turns text into dense vectors for similarity search.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier stored with a persisted index.
    fn name(&self) -> &str;

    /// Learn whatever the provider needs from the indexed corpus.
    fn prepare(&self, _corpus: &[String]) {}

    /// Embed the indexed chunks.
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>>;
}

/// Cosine similarity of two vectors; 0.0 when either has zero magnitude or
/// the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

// ---------------------------------------------------------------------------
// TF-IDF
// ---------------------------------------------------------------------------

const MAX_VOCAB_SIZE: usize = 8192;

#[derive(Debug, Clone)]
struct Vocabulary {
    token_to_idx: HashMap<String, usize>,
    idf: Vec<f32>,
}

/// Local TF-IDF embedder.
///
/// The vocabulary is rebuilt by every `prepare` call; before the first one
/// every text embeds to an empty vector.
#[derive(Debug, Default)]
pub struct TfIdfEmbedder {
    vocab: RwLock<Option<Vocabulary>>,
}

impl TfIdfEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&self) -> usize {
        self.vocab
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |v| v.idf.len())
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let guard = self.vocab.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(vocab) => tfidf_vector(text, vocab),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TfIdfEmbedder {
    fn name(&self) -> &str {
        "tfidf"
    }

    fn prepare(&self, corpus: &[String]) {
        let vocab = build_vocab(corpus);
        *self.vocab.write().unwrap_or_else(PoisonError::into_inner) = Some(vocab);
    }

    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        Ok(self.embed(text))
    }
}

/// Lowercase, split on anything that is not alphanumeric, drop 1-char tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(String::from)
        .collect()
}

fn build_vocab(corpus: &[String]) -> Vocabulary {
    let num_docs = corpus.len().max(1);

    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    for doc in corpus {
        let unique: HashSet<String> = tokenize(doc).into_iter().collect();
        for tok in unique {
            *doc_freq.entry(tok).or_insert(0) += 1;
        }
    }

    // Most frequent first, ties by token so the layout is deterministic
    let mut entries: Vec<(String, usize)> = doc_freq.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(MAX_VOCAB_SIZE);

    let mut token_to_idx = HashMap::with_capacity(entries.len());
    let mut idf = Vec::with_capacity(entries.len());
    for (idx, (token, freq)) in entries.into_iter().enumerate() {
        token_to_idx.insert(token, idx);
        idf.push(((num_docs as f32) / (freq as f32)).ln() + 1.0);
    }

    Vocabulary { token_to_idx, idf }
}

/// L2-normalised TF-IDF vector of `text`.
fn tfidf_vector(text: &str, vocab: &Vocabulary) -> Vec<f32> {
    let dim = vocab.idf.len();
    if dim == 0 {
        return Vec::new();
    }

    let tokens = tokenize(text);
    let total = tokens.len().max(1) as f32;

    let mut vector = vec![0.0f32; dim];
    for tok in &tokens {
        if let Some(&idx) = vocab.token_to_idx.get(tok.as_str()) {
            vector[idx] += 1.0 / total;
        }
    }
    for (v, idf) in vector.iter_mut().zip(&vocab.idf) {
        *v *= idf;
    }

    let mag: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if mag > 0.0 {
        for v in &mut vector {
            *v /= mag;
        }
    }
    vector
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const MAX_BATCH_SIZE: usize = 2048;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embeddings from the OpenAI API (or any compatible server via `base_url`).
///
/// Requests go through the shared retry policy.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    policy: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        policy: RetryPolicy,
    ) -> AppResult<Self> {
        let client = build_http_client(Some(REQUEST_TIMEOUT))?;
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| OPENAI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url,
            model: OPENAI_EMBEDDING_MODEL.to_string(),
            policy,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn post_batch(&self, input: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| missing_api_key_error("openai embeddings"))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: format!("failed to read response body: {}", e),
        })?;
        if status != 200 {
            return Err(parse_http_error(status, &text, "openai embeddings"));
        }

        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ParseError {
                message: format!("failed to parse embedding response: {}", e),
            })?;
        if parsed.data.len() != input.len() {
            return Err(LlmError::ParseError {
                message: format!(
                    "expected {} embeddings but received {}",
                    input.len(),
                    parsed.data.len()
                ),
            });
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_batch(&self, input: &[String]) -> AppResult<Vec<Vec<f32>>> {
        retry_with_policy(&self.policy, "openai:embeddings", |_| self.post_batch(input))
            .await
            .map_err(|e| AppError::embedding(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::embedding("empty embedding response"))
    }
}

/// Build the configured embedding provider.
pub fn build_embedding_provider(
    kind: EmbeddingProviderKind,
    api_key: Option<String>,
    base_url: Option<String>,
    policy: RetryPolicy,
) -> AppResult<Box<dyn EmbeddingProvider>> {
    match kind {
        EmbeddingProviderKind::Tfidf => Ok(Box::new(TfIdfEmbedder::new())),
        EmbeddingProviderKind::Openai => {
            Ok(Box::new(OpenAIEmbedder::new(api_key, base_url, policy)?))
        }
    }
}
