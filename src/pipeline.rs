//! Top-level question-answering pipeline.
//!
//! Owns the long-lived clients and runs one request strictly in order:
//! router → retrieval → agentic loop → guardrail → assembler → telemetry.
//! Any uncaught stage error becomes a generic answer carrying the request
//! id; cancellation stops new external calls and emits nothing.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::executor::ToolExecutor;
use crate::agent::provider::LlmProvider;
use crate::agent::{LoopInput, agentic_loop};
use crate::answer;
use crate::config::ServiceConfig;
use crate::core::{Answer, Feedback, QuestionInput, ThreadMessage};
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::{Error, StoreError};
use crate::fetcher::{ArticleFetcher, LiveFetcher};
use crate::guardrail;
use crate::retrieval::RetrievalEngine;
use crate::router::{Mode, RouteDecision, RouteRequest, Router};
use crate::store::{ArticleStore, SharedStore, SqliteStore, call_blocking, shared};
use crate::telemetry::{QaLog, ReplayCandidate, ReplayResult};

/// Pipeline version, recorded on every request.
pub const PIPELINE_VERSION: &str = "pipeline.v1.0";

/// Characters of a candidate kept in replay snippets.
const REPLAY_SNIPPET_CHARS: usize = 160;

/// The outcome of one handled question.
#[derive(Debug)]
pub struct QuestionOutcome {
    /// Plain-text response for the shell to post.
    pub response: String,
    /// Opaque request id (also inside the answer).
    pub request_id: String,
    /// The full structured answer.
    pub answer: Answer,
}

/// The assembled service: one of everything, constructed at startup and
/// shared across requests.
pub struct Lightopedia {
    store: SharedStore,
    provider: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    router: Router,
    retrieval: RetrievalEngine,
    executor: ToolExecutor,
}

impl Lightopedia {
    /// Wires the pipeline from pre-built clients (tests inject mocks
    /// here).
    #[must_use]
    pub fn new(
        store: SharedStore,
        provider: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        live_fetcher: Option<Arc<dyn ArticleFetcher>>,
    ) -> Self {
        let router = Router::new(Arc::clone(&provider));
        let retrieval = RetrievalEngine::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::clone(&provider),
        );
        let executor = ToolExecutor::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            live_fetcher,
        );
        Self {
            store,
            provider,
            embedder,
            router,
            retrieval,
            executor,
        }
    }

    /// Builds the production pipeline from configuration: opens the
    /// store, initializes its schema, and constructs the external
    /// clients once.
    ///
    /// # Errors
    ///
    /// Returns store errors from opening or migrating the database.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, Error> {
        use crate::agent::providers::OpenAiProvider;

        let mut store = SqliteStore::open(&config.db_path)?;
        store.init()?;

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(config));
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(config));
        let live: Arc<dyn ArticleFetcher> = Arc::new(LiveFetcher::new(None));

        Ok(Self::new(shared(store), provider, embedder, Some(live)))
    }

    /// Shared store handle, for wiring the indexer next to the pipeline.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Shared embedder handle.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Handles one question end to end.
    ///
    /// The only error this returns is [`Error::Cancelled`]; every other
    /// failure is logged and rendered as the generic error answer so the
    /// asker always gets exactly one of the three user-visible outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the caller cancelled; no answer
    /// is emitted in that case.
    pub async fn handle_question(
        &self,
        input: &QuestionInput,
        thread_history: &[ThreadMessage],
        user_context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<QuestionOutcome, Error> {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let mut log = QaLog::new(&request_id, &input.text);
        log.channel_id = Some(input.channel_id.clone());
        log.thread_ts = input.thread_ts.clone();
        log.thread_history = thread_history.to_vec();
        log.pipeline_version = PIPELINE_VERSION.to_string();

        let result = self
            .answer_question(input, thread_history, user_context, cancel, &mut log)
            .await;

        let answer = match result {
            Ok(answer) => answer,
            Err(Error::Cancelled) => {
                // Stop issuing calls; emit nothing, not even a log row.
                info!(request_id, "request cancelled");
                return Err(Error::Cancelled);
            }
            Err(e) => {
                error!(request_id, error = %e, "pipeline failed; emitting generic error");
                answer::generic_error_answer(&request_id)
            }
        };

        log.confidence = answer.confidence;
        log.escalation.clone_from(&answer.escalation);
        log.final_text = Some(answer.summary.clone());
        log.latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Err(e) = call_blocking(&self.store, move |store| store.log_request(&log)).await {
            warn!(request_id, error = %e, "request log write failed");
        }

        Ok(QuestionOutcome {
            response: render_response(&answer),
            request_id,
            answer,
        })
    }

    /// The fallible inner pipeline; `handle_question` wraps its errors.
    async fn answer_question(
        &self,
        input: &QuestionInput,
        thread_history: &[ThreadMessage],
        user_context: Option<&str>,
        cancel: &CancellationToken,
        log: &mut QaLog,
    ) -> Result<Answer, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // 1. Route.
        let attachment_hints: Vec<String> = input
            .attachments
            .iter()
            .map(|a| a.name.trim_end_matches(".txt").replace(['-', '_'], " "))
            .collect();
        let route = self
            .router
            .route(&RouteRequest {
                question: &input.text,
                channel_kind: input.channel_kind,
                thread_history,
                attachment_hints: &attachment_hints,
            })
            .await;
        log.route = Some(route.clone());
        info!(
            request_id = log.request_id,
            mode = route.mode.as_str(),
            confidence = ?route.confidence,
            fallback = route.fallback_used,
            "routed"
        );

        // Modes that never reach retrieval or the loop.
        match route.mode {
            Mode::OutOfScope => {
                return Ok(answer::missing_context_answer(&log.request_id));
            }
            Mode::Clarify => {
                return Ok(answer::clarification_answer(
                    &log.request_id,
                    &route.missing_info,
                ));
            }
            _ => {}
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // 2. Retrieve (never fails; feeds telemetry, replay, and the
        // confidence picture).
        let attachment_summaries: Vec<String> =
            input.attachments.iter().map(|a| a.text.clone()).collect();
        let evidence = self
            .retrieval
            .retrieve(&input.text, &route, attachment_summaries, cancel)
            .await;
        log.retrieval = Some(evidence.meta.clone());
        log.top_similarities = evidence.chunks.iter().map(|c| c.final_score).collect();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // 3. Agentic loop: gather evidence through tools, then synthesize.
        let outcome = agentic_loop::run(
            self.provider.as_ref(),
            &self.executor,
            &input.text,
            &LoopInput {
                thread_history,
                attachments: &input.attachments,
                user_context,
            },
            cancel,
        )
        .await?;
        log.fetched_urls = outcome.state.fetched_urls.iter().cloned().collect();
        log.draft_text = Some(outcome.draft.clone());

        // No evidence and no text: the canned missing-context response.
        if outcome.state.fetched_articles.is_empty() && outcome.draft.trim().is_empty() {
            return Ok(answer::missing_context_answer(&log.request_id));
        }

        // 4. Guardrails (never fail; may downgrade).
        let report = guardrail::apply(&outcome.draft, &outcome.state.fetched_urls);
        log.guardrail_findings.clone_from(&report.findings);

        // 5. Assemble.
        Ok(answer::assemble(&report, &outcome.state, &log.request_id))
    }

    /// Records user feedback on a past answer.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub async fn record_feedback(&self, feedback: Feedback) -> Result<(), Error> {
        call_blocking(&self.store, move |store| store.record_feedback(&feedback))
            .await
            .map_err(Error::Store)
    }

    /// Re-runs routing and retrieval for a question without synthesis;
    /// the debug surface and replay both use this.
    pub async fn dry_run(
        &self,
        question: &str,
        thread_history: &[ThreadMessage],
    ) -> (RouteDecision, Vec<ReplayCandidate>) {
        let route = self
            .router
            .route(&RouteRequest {
                question,
                channel_kind: crate::core::ChannelKind::Channel,
                thread_history,
                attachment_hints: &[],
            })
            .await;

        let evidence = self
            .retrieval
            .retrieve(question, &route, Vec::new(), &CancellationToken::new())
            .await;

        let candidates = evidence
            .chunks
            .iter()
            .map(|chunk| ReplayCandidate {
                id: chunk.id,
                path: chunk.metadata.path.clone(),
                score: chunk.final_score,
                snippet: chunk.content.chars().take(REPLAY_SNIPPET_CHARS).collect(),
            })
            .collect();

        (route, candidates)
    }

    /// Replays a past request from its persisted log: routing and
    /// retrieval re-run against the store's current state with the pinned
    /// program versions; synthesis is not re-run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LogNotFound`] when no log row exists.
    pub async fn replay(&self, request_id: &str) -> Result<ReplayResult, Error> {
        let id = request_id.to_string();
        let log = call_blocking(&self.store, move |store| store.get_log(&id))
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| {
                Error::Store(StoreError::LogNotFound {
                    request_id: request_id.to_string(),
                })
            })?;

        let (route, candidates) = self.dry_run(&log.question, &log.thread_history).await;
        Ok(ReplayResult {
            request_id: request_id.to_string(),
            route,
            candidates,
        })
    }
}

/// Renders the plain-text response a shell posts: the answer text plus a
/// numbered source footer.
#[must_use]
pub fn render_response(answer: &Answer) -> String {
    let mut response = answer.summary.clone();
    if !answer.sources.is_empty() {
        response.push_str("\n\nSources:");
        for source in &answer.sources {
            response.push_str(&format!("\n{}. {} ({})", source.id, source.title, source.url));
        }
    }
    response
}
