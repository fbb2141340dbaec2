//! Application State
//!
//! Everything one REPL session needs, wired together at start-up: the model
//! caller, the database backend, the reference index, the pipeline and the
//! session itself.

use std::sync::Arc;

use askdb_llm::{LlmProvider, OpenAIProvider, ProviderConfig, ResilientCaller};
use askdb_sql::{QueryBackend, SqlExecutor};

use crate::models::settings::AppConfig;
use crate::services::knowledge::{build_embedding_provider, ContextRetriever, EmbeddingProvider};
use crate::services::pipeline::{ChatPipeline, PipelineSettings, TurnOutcome};
use crate::services::reference::load_reference_text;
use crate::services::session::ChatSession;
use crate::storage::connection::{connect, DatabaseTarget};
use crate::storage::schema::{load_schema_context, NO_TABLE};
use crate::utils::error::AppResult;
use crate::utils::paths::resolve_path;

/// Lines shown above the prompt, refreshed after every turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub database: String,
    pub table: String,
    pub tokens: u64,
}

impl std::fmt::Display for Banner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "database: {} | table: {} | tokens used: {}",
            self.database, self.table, self.tokens
        )
    }
}

/// State of a running session
pub struct AppState {
    config: AppConfig,
    /// Display name of the connected database, if any
    database_name: Option<String>,
    pipeline: ChatPipeline,
    session: ChatSession,
}

impl AppState {
    /// Build every service from `config` and the process environment.
    ///
    /// An unreachable database or an unusable reference index degrades the
    /// session instead of failing start-up.
    pub async fn initialize(config: AppConfig) -> AppResult<Self> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let provider_config = ProviderConfig {
            api_key: env("OPENAI_API_KEY"),
            base_url: env("OPENAI_BASE_URL"),
            model: config.model.clone(),
            ..Default::default()
        };
        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAIProvider::new(provider_config)?);

        let target = DatabaseTarget::resolve(&config, env);
        let backend = connect(target.as_ref());
        // Without a backend the banner has nothing to name
        let database_name = backend
            .as_ref()
            .and(target.as_ref())
            .map(DatabaseTarget::display_name);

        let embedder = build_embedding_provider(
            config.embedding_provider,
            env("OPENAI_API_KEY"),
            env("OPENAI_BASE_URL"),
            config.retry.to_policy(),
        )?;

        Self::assemble(config, provider, backend, database_name, embedder).await
    }

    /// Build the session from already constructed collaborators.
    pub async fn assemble(
        config: AppConfig,
        provider: Arc<dyn LlmProvider>,
        backend: Option<Arc<dyn QueryBackend>>,
        database_name: Option<String>,
        embedder: Box<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let schema = load_schema_context(backend.as_ref(), config.sample_rows).await;
        tracing::info!(
            database = database_name.as_deref().unwrap_or(NO_TABLE),
            table = %schema.table_name,
            "schema context loaded"
        );

        let reference_text = load_reference_text(&resolve_path(&config.reference_file));
        let caller = ResilientCaller::new(provider, config.retry.to_policy());
        let executor = SqlExecutor::new(backend);

        let mut pipeline = ChatPipeline::new(
            caller,
            executor,
            schema,
            &reference_text,
            PipelineSettings::from(&config),
        )?;

        let retriever = ContextRetriever::new(embedder, resolve_path(&config.vector_dir));
        match retriever
            .build_index(&reference_text, config.chunk_size, config.chunk_overlap)
            .await
        {
            Ok(Some(index)) => pipeline = pipeline.with_retriever(retriever, index),
            Ok(None) => tracing::info!("no reference text; retrieval disabled"),
            Err(e) => tracing::warn!(error = %e, "failed to build reference index; retrieval disabled"),
        }

        Ok(Self {
            config,
            database_name,
            pipeline,
            session: ChatSession::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &ChatPipeline {
        &self.pipeline
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Run one user turn against the session.
    pub async fn ask(&mut self, utterance: &str) -> TurnOutcome {
        self.pipeline.handle_turn(&mut self.session, utterance).await
    }

    pub fn banner(&self) -> Banner {
        Banner {
            database: self
                .database_name
                .clone()
                .unwrap_or_else(|| NO_TABLE.to_string()),
            table: self.pipeline.schema().table_name.clone(),
            tokens: self.session.total_tokens(),
        }
    }

    /// Reference context retrievable without a question.
    pub async fn context_snapshot(&self) -> String {
        self.pipeline.context_snapshot().await
    }
}
