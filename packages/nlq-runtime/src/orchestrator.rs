//! Per-request sequencing of translation, execution and composition.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nlq_core::{
    ConfigurationError, DisplayMode, DisplayModeCell, ExecutionError, LanguageModel,
    PipelineConfig, ResultSet, SchemaCatalog, TranslationError, Warehouse,
};
use thiserror::Error;

use crate::composer::{AnswerComposer, Composition};
use crate::envelope::ResponseEnvelope;
use crate::executor::QueryExecutor;
use crate::translator::{QueryTranslator, TranslationResult};

/// Lifecycle of one request. Strictly linear; `Errored` absorbs failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    SchemaReady,
    Translated,
    Executed,
    Composed,
    Responded,
    Errored,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Responded | RequestState::Errored)
    }

    /// The only state a successful step may move to.
    pub fn successor(&self) -> Option<RequestState> {
        match self {
            RequestState::Received => Some(RequestState::SchemaReady),
            RequestState::SchemaReady => Some(RequestState::Translated),
            RequestState::Translated => Some(RequestState::Executed),
            RequestState::Executed => Some(RequestState::Composed),
            RequestState::Composed => Some(RequestState::Responded),
            RequestState::Responded | RequestState::Errored => None,
        }
    }

    pub fn can_transition_to(&self, next: RequestState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == RequestState::Errored || self.successor() == Some(next)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Received => "RECEIVED",
            RequestState::SchemaReady => "SCHEMA_READY",
            RequestState::Translated => "TRANSLATED",
            RequestState::Executed => "EXECUTED",
            RequestState::Composed => "COMPOSED",
            RequestState::Responded => "RESPONDED",
            RequestState::Errored => "ERRORED",
        };
        f.write_str(name)
    }
}

/// Failure that moved a request to `Errored`.
#[derive(Error, Debug, Clone)]
pub enum RequestError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// Carries the statement that was attempted
    #[error("{source}")]
    Execution {
        #[source]
        source: ExecutionError,
        sql: String,
    },
}

impl RequestError {
    /// Statement to show alongside the error, if one was generated.
    pub fn attempted_sql(&self) -> Option<&str> {
        match self {
            RequestError::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Tracks and logs state transitions for one request.
#[derive(Debug)]
pub struct RequestTrace {
    pub id: u64,
    state: RequestState,
}

impl RequestTrace {
    fn new(id: u64) -> Self {
        tracing::debug!("request {}: {}", id, RequestState::Received);
        Self {
            id,
            state: RequestState::Received,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!("request {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}

/// Completed request: the envelope plus what produced it.
#[derive(Debug)]
pub struct RequestOutcome {
    pub envelope: ResponseEnvelope,
    pub final_state: RequestState,
    pub translation: Option<TranslationResult>,
    pub composition: Option<Composition>,
}

pub struct Orchestrator {
    catalog: Arc<SchemaCatalog>,
    translator: QueryTranslator,
    executor: QueryExecutor,
    composer: AnswerComposer,
    display_mode: DisplayModeCell,
    row_limit: usize,
    next_request_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        warehouse: Arc<dyn Warehouse>,
        model: Arc<dyn LanguageModel>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            translator: QueryTranslator::new(Arc::clone(&model), config),
            executor: QueryExecutor::new(
                warehouse,
                Duration::from_millis(config.warehouse_timeout_ms),
            ),
            composer: AnswerComposer::new(
                Some(model),
                Duration::from_millis(config.model_timeout_ms),
                config.summary_max_rows,
            ),
            display_mode: DisplayModeCell::new(config.display_mode),
            row_limit: config.max_result_rows,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode.get()
    }

    /// Switches the display mode for subsequent requests.
    pub fn set_display_mode(&self, mode: DisplayMode) {
        tracing::info!("Display mode set to {}", mode);
        self.display_mode.set(mode);
    }

    /// Answers one question. Every failure is folded into the envelope.
    pub async fn handle(&self, question: &str) -> ResponseEnvelope {
        self.process(question).await.envelope
    }

    /// Answers one question and reports how the request ended.
    pub async fn process(&self, question: &str) -> RequestOutcome {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut trace = RequestTrace::new(id);
        tracing::info!("request {}: question '{}'", id, question);

        let mut translation = None;
        match self.run(question, &mut trace, &mut translation).await {
            Ok((result, composition)) => {
                let sql = translation
                    .as_ref()
                    .map(|t: &TranslationResult| t.query_text.clone())
                    .unwrap_or_default();
                let envelope = ResponseEnvelope::answered(
                    question,
                    composition.summary.clone(),
                    sql,
                    result,
                    self.display_mode.get(),
                );
                trace.advance(RequestState::Responded);
                RequestOutcome {
                    envelope,
                    final_state: trace.state(),
                    translation,
                    composition: Some(composition),
                }
            }
            Err(e) => {
                tracing::warn!("request {} failed in {}: {}", id, trace.state(), e);
                trace.advance(RequestState::Errored);
                let envelope =
                    ResponseEnvelope::failed(question, e.to_string(), e.attempted_sql().map(str::to_string));
                RequestOutcome {
                    envelope,
                    final_state: trace.state(),
                    translation,
                    composition: None,
                }
            }
        }
    }

    async fn run(
        &self,
        question: &str,
        trace: &mut RequestTrace,
        translation_slot: &mut Option<TranslationResult>,
    ) -> Result<(ResultSet, Composition), RequestError> {
        // Pinned for the whole request; a concurrent refresh does not affect it
        let snapshot = self
            .catalog
            .current()
            .ok_or_else(|| ConfigurationError::SchemaUnavailable {
                dataset: self.catalog.dataset().to_string(),
            })?;
        trace.advance(RequestState::SchemaReady);

        let translation = self.translator.translate(question, &snapshot).await?;
        trace.advance(RequestState::Translated);
        let translation = translation_slot.insert(translation);

        let result = self
            .executor
            .execute(&translation.query_text, self.row_limit)
            .await
            .map_err(|source| RequestError::Execution {
                source,
                sql: translation.query_text.clone(),
            })?;
        trace.advance(RequestState::Executed);

        let composition = self.composer.compose(question, translation, &result).await;
        trace.advance(RequestState::Composed);
        tracing::debug!("request {}: summary via {:?}", trace.id, composition.method);

        Ok((result, composition))
    }
}
