//! Chat Pipeline
//!
//! Runs one user turn end to end:
//!
//! ```text
//! START -> DECIDING -> PARSING -> [EXECUTING_SQL] -> SYNTHESIZING -> DONE
//!              \                                        /
//!               `----------> ERROR_ANSWER <------------'
//! ```
//!
//! Every failure is turned into an answer the user can read; `handle_turn`
//! itself never fails. The user turn is recorded before the model is asked,
//! and the assistant turn is recorded even when the answer is an error.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use askdb_llm::{LlmResponse, Message, ModelCallError, ResilientCaller};
use askdb_sql::{
    extract_sql_fallback, parse_decision_detailed, strip_code_fences, Decision, ParseStrategy,
    SqlExecutor, StatementOutcome,
};
use serde::Serialize;

use super::knowledge::{ContextRetriever, IndexHandle};
use super::prompt::{
    general_system_message, synthesis_user_message, PromptBuilder, DECIDE_INSTRUCTION,
    FINAL_ANSWER_INSTRUCTION,
};
use super::session::ChatSession;
use crate::models::session::Turn;
use crate::models::settings::AppConfig;
use crate::storage::schema::SchemaContext;
use crate::utils::error::AppResult;

/// Prefix of the answer when any statement of the turn failed.
pub const QUERIES_FAILED_PREFIX: &str = "Some queries failed:\n";

/// Prefix of the answer when the final model call failed.
pub const GENERATION_ERROR_PREFIX: &str = "error generating response: ";

/// Last stage a turn reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Deciding,
    Parsing,
    ExecutingSql,
    Synthesizing,
    Done,
    ErrorAnswer,
}

impl TurnStage {
    const ALL: [TurnStage; 6] = [
        TurnStage::Deciding,
        TurnStage::Parsing,
        TurnStage::ExecutingSql,
        TurnStage::Synthesizing,
        TurnStage::Done,
        TurnStage::ErrorAnswer,
    ];

    fn from_index(index: u8) -> Self {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .unwrap_or(TurnStage::Deciding)
    }
}

/// Tokens and current stage of a running turn, readable after a deadline
/// drops it.
#[derive(Debug, Default)]
struct TurnProgress {
    tokens: AtomicU32,
    stage: AtomicU8,
}

impl TurnProgress {
    fn enter(&self, stage: TurnStage) {
        tracing::debug!(stage = ?stage, "turn stage");
        self.stage.store(stage as u8, Ordering::Relaxed);
    }

    fn stage(&self) -> TurnStage {
        TurnStage::from_index(self.stage.load(Ordering::Relaxed))
    }

    fn add_tokens(&self, tokens: u32) {
        self.tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    fn tokens(&self) -> u32 {
        self.tokens.load(Ordering::Relaxed)
    }
}

/// Result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub decision: Decision,
    /// `None` when the decision came from the fallback extractor or the
    /// decision call failed
    pub parse_strategy: Option<ParseStrategy>,
    pub outcomes: Vec<StatementOutcome>,
    /// Model tokens spent on this turn
    pub tokens_used: u32,
    pub stage: TurnStage,
}

/// Per-turn settings taken from `AppConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub model: String,
    pub max_history: usize,
    pub top_k: usize,
    pub turn_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_history: config.max_history,
            top_k: config.top_k,
            turn_timeout: config.turn_timeout(),
        }
    }
}

/// Retriever plus the index it built for the reference text.
struct Reference {
    retriever: ContextRetriever,
    index: IndexHandle,
}

/// Orchestrates decision, execution and synthesis for each turn.
pub struct ChatPipeline {
    caller: ResilientCaller,
    executor: SqlExecutor,
    prompts: PromptBuilder,
    schema: SchemaContext,
    system_prompt: String,
    reference: Option<Reference>,
    settings: PipelineSettings,
}

impl ChatPipeline {
    /// Assemble a pipeline. The system prompt is rendered once here from the
    /// schema context and the static reference text.
    pub fn new(
        caller: ResilientCaller,
        executor: SqlExecutor,
        schema: SchemaContext,
        reference_text: &str,
        settings: PipelineSettings,
    ) -> AppResult<Self> {
        let prompts = PromptBuilder::new()?;
        let system_prompt = prompts.system_prompt(&schema, reference_text)?;
        Ok(Self {
            caller,
            executor,
            prompts,
            schema,
            system_prompt,
            reference: None,
            settings,
        })
    }

    /// Attach reference-text retrieval.
    pub fn with_retriever(mut self, retriever: ContextRetriever, index: IndexHandle) -> Self {
        self.reference = Some(Reference { retriever, index });
        self
    }

    pub fn schema(&self) -> &SchemaContext {
        &self.schema
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn executor(&self) -> &SqlExecutor {
        &self.executor
    }

    /// Reference context currently retrievable without a question.
    pub async fn context_snapshot(&self) -> String {
        self.retrieve("").await
    }

    /// Process one user utterance and record both turns in `session`.
    pub async fn handle_turn(&self, session: &mut ChatSession, utterance: &str) -> TurnOutcome {
        session.append(Turn::user(utterance));
        let history: Vec<Message> = session
            .recent(self.settings.max_history)
            .iter()
            .map(Turn::to_message)
            .collect();

        tracing::info!(session = %session.id(), history = history.len(), "turn started");

        let progress = TurnProgress::default();
        let outcome = match self.settings.turn_timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.run_turn(&history, utterance, &progress))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::warn!(
                            session = %session.id(),
                            deadline_secs = deadline.as_secs(),
                            stage = ?progress.stage(),
                            "turn deadline exceeded"
                        );
                        TurnOutcome {
                            answer: format!(
                                "{}turn exceeded {}s deadline",
                                GENERATION_ERROR_PREFIX,
                                deadline.as_secs()
                            ),
                            decision: Decision::default(),
                            parse_strategy: None,
                            outcomes: Vec::new(),
                            tokens_used: progress.tokens(),
                            stage: TurnStage::ErrorAnswer,
                        }
                    }
                }
            }
            None => self.run_turn(&history, utterance, &progress).await,
        };

        session.append(Turn::assistant(outcome.answer.clone(), outcome.tokens_used));
        session.add_tokens(outcome.tokens_used);

        tracing::info!(
            session = %session.id(),
            stage = ?outcome.stage,
            tokens = outcome.tokens_used,
            total_tokens = session.total_tokens(),
            "turn finished"
        );
        outcome
    }

    async fn run_turn(&self, history: &[Message], utterance: &str, progress: &TurnProgress) -> TurnOutcome {
        let relevant = self.retrieve(utterance).await;

        progress.enter(TurnStage::Deciding);
        let mut parse_strategy = None;
        let decision = match self.decide(history, &relevant, progress).await {
            Ok(raw) => {
                progress.enter(TurnStage::Parsing);
                match parse_decision_detailed(&raw) {
                    Some(parsed) => {
                        parse_strategy = Some(parsed.strategy);
                        parsed.decision
                    }
                    None => {
                        let sql = extract_sql_fallback(&raw);
                        tracing::debug!(
                            statements = sql.len(),
                            "decision unparsable, used fallback extraction"
                        );
                        Decision {
                            needs_sql: !sql.is_empty(),
                            sql,
                            notes: String::new(),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "decision call failed");
                Decision::degraded(format!("error: {}", e))
            }
        };

        tracing::info!(
            needs_sql = decision.needs_sql,
            statements = decision.sql.len(),
            strategy = ?parse_strategy,
            "decision ready"
        );

        if !decision.wants_sql() {
            progress.enter(TurnStage::Synthesizing);
            let messages = vec![
                Message::system(general_system_message(&relevant)),
                Message::user(utterance),
            ];
            let (answer, stage) = self.synthesize(&messages, progress).await;
            return TurnOutcome {
                answer,
                decision,
                parse_strategy,
                outcomes: Vec::new(),
                tokens_used: progress.tokens(),
                stage,
            };
        }

        progress.enter(TurnStage::ExecutingSql);
        let report = self.executor.execute_all(&decision.sql).await;
        if report.has_errors() {
            return TurnOutcome {
                answer: format!("{}{}", QUERIES_FAILED_PREFIX, report.errors.join("\n")),
                decision,
                parse_strategy,
                outcomes: report.outcomes,
                tokens_used: progress.tokens(),
                stage: TurnStage::Done,
            };
        }

        progress.enter(TurnStage::Synthesizing);
        let (answer, stage) = match report.results_json() {
            Ok(results) => {
                let mut messages = Vec::with_capacity(history.len() + 3);
                messages.push(Message::system(self.system_prompt.clone()));
                messages.extend_from_slice(history);
                messages.push(Message::system(FINAL_ANSWER_INSTRUCTION));
                messages.push(Message::user(synthesis_user_message(utterance, &results)));
                self.synthesize(&messages, progress).await
            }
            Err(e) => (
                format!("{}{}", GENERATION_ERROR_PREFIX, e),
                TurnStage::ErrorAnswer,
            ),
        };

        TurnOutcome {
            answer,
            decision,
            parse_strategy,
            outcomes: report.outcomes,
            tokens_used: progress.tokens(),
            stage,
        }
    }

    /// Ask the model for a decision and return its raw reply.
    async fn decide(
        &self,
        history: &[Message],
        relevant: &str,
        progress: &TurnProgress,
    ) -> Result<String, ModelCallError> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend_from_slice(history);
        match self
            .prompts
            .decision_context(&self.schema.table_name, relevant)
        {
            Ok(context) => messages.push(Message::system(context)),
            Err(e) => tracing::warn!(error = %e, "failed to render decision context"),
        }
        messages.push(Message::system(DECIDE_INSTRUCTION));

        let response = self.call(&messages, progress).await?;
        Ok(response.text().to_string())
    }

    /// Final model call; failures become the answer text.
    async fn synthesize(&self, messages: &[Message], progress: &TurnProgress) -> (String, TurnStage) {
        match self.call(messages, progress).await {
            Ok(response) => (strip_code_fences(response.text()), TurnStage::Done),
            Err(e) => {
                tracing::error!(error = %e, "answer generation failed");
                (
                    format!("{}{}", GENERATION_ERROR_PREFIX, e),
                    TurnStage::ErrorAnswer,
                )
            }
        }
    }

    async fn call(
        &self,
        messages: &[Message],
        progress: &TurnProgress,
    ) -> Result<LlmResponse, ModelCallError> {
        let response = self.caller.call(&self.settings.model, messages).await?;
        progress.add_tokens(response.usage.total_tokens());
        Ok(response)
    }

    async fn retrieve(&self, query: &str) -> String {
        match &self.reference {
            Some(reference) => {
                reference
                    .retriever
                    .retrieve(&reference.index, query, self.settings.top_k)
                    .await
            }
            None => String::new(),
        }
    }
}
