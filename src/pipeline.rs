//! Conversational retrieval pipeline
//!
//! A `QueryPipeline` is built once per chat session and composes
//! retrieval, prompt assembly, the model gateway, the semantic cache,
//! transcript persistence and trace emission. `ChatSession` exposes the
//! two per-session entry points (`on_start`, `on_message`) the hosting
//! web layer drives; both write `ServerEvent`s to an `EventSink`, so the
//! session logic runs and tests without any web framework present.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::SemanticCache;
use crate::context::AppContext;
use crate::error::Result;
use crate::graph::ChatHistoryStore;
use crate::llm::{ChatMessage, OpenRouterClient};
use crate::metrics;
use crate::observability::{LangfuseTracer, TraceSpan};
use crate::prompts;
use crate::retrieval::{self, DocumentRetriever, GraphRetriever};

/// Outbound event on the chat protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Status line shown to the user (initializing, ready).
    Status(String),
    /// One streamed fragment of the assistant's answer.
    Token(String),
    /// Final assembled answer; closes the streamed message.
    Done(String),
    /// Inline error shown to the user.
    Error(String),
}

impl ServerEvent {
    /// Wire encoding used by the WebSocket transport.
    pub fn to_json(&self) -> String {
        let (kind, content) = match self {
            ServerEvent::Status(text) => ("status", text),
            ServerEvent::Token(text) => ("token", text),
            ServerEvent::Done(text) => ("done", text),
            ServerEvent::Error(text) => ("error", text),
        };

        serde_json::json!({ "type": kind, "content": content }).to_string()
    }
}

/// Destination for outbound session events.
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: ServerEvent) -> Result<()>;
}

/// Per-session composition of retriever, prompt, model, cache, history
/// and tracer.
pub struct QueryPipeline {
    session_id: String,
    retriever: Arc<dyn DocumentRetriever>,
    llm: Arc<OpenRouterClient>,
    history: Arc<ChatHistoryStore>,
    cache: Option<Arc<SemanticCache>>,
    tracer: Option<Arc<LangfuseTracer>>,
}

impl QueryPipeline {
    /// Build the pipeline for one session from the shared application
    /// context. Binding the retriever verifies the vector index exists.
    pub async fn build(ctx: &AppContext, session_id: &str) -> Result<Self> {
        debug!(session_id, "Binding retriever to vector index");
        let retriever = GraphRetriever::bind(
            ctx.knowledge.clone(),
            ctx.embedder.clone(),
            &ctx.config.vector_index,
            ctx.config.retrieval_top_k,
        )
        .await?;

        Ok(Self {
            session_id: session_id.to_string(),
            retriever: Arc::new(retriever),
            llm: ctx.llm.clone(),
            history: ctx.history.clone(),
            cache: ctx.cache.clone(),
            tracer: ctx.tracer.clone(),
        })
    }

    /// Assemble a pipeline from its parts.
    pub fn from_parts(
        session_id: &str,
        retriever: Arc<dyn DocumentRetriever>,
        llm: Arc<OpenRouterClient>,
        history: Arc<ChatHistoryStore>,
        cache: Option<Arc<SemanticCache>>,
        tracer: Option<Arc<LangfuseTracer>>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            retriever,
            llm,
            history,
            cache,
            tracer,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Fetch retrieval context for a query.
    pub async fn get_context(&self, query: &str) -> String {
        retrieval::get_context(&*self.retriever, query).await
    }

    /// Answer one question: retrieve context, consult the cache, stream
    /// the model's reply through the sink, then persist the exchange and
    /// flush the trace. Returns the final assembled answer.
    pub async fn answer(&self, question: &str, sink: &mut dyn EventSink) -> Result<String> {
        let context = self.get_context(question).await;
        let mut span = TraceSpan::begin(&self.session_id, self.llm.model(), question);

        if let Some(cache) = &self.cache {
            match cache.lookup(question).await {
                Ok(Some(cached)) => {
                    debug!(session_id = %self.session_id, "Serving answer from semantic cache");
                    metrics::record_cache_event(true);

                    sink.emit(ServerEvent::Token(cached.clone())).await?;
                    span.record_token();
                    span.mark_cache_hit();
                    span.complete(&cached);

                    self.record_exchange(question, &cached).await?;
                    self.flush_trace(&span).await;
                    return Ok(cached);
                }
                Ok(None) => metrics::record_cache_event(false),
                // A cache outage degrades to a miss; generation proceeds.
                Err(err) => warn!("Semantic cache lookup failed: {}", err),
            }
        }

        let messages = self.assemble_messages(&context, question).await?;

        let stream = self.llm.chat_stream(messages).await?;
        futures::pin_mut!(stream);

        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            span.record_token();
            answer.push_str(&fragment);
            sink.emit(ServerEvent::Token(fragment)).await?;
        }

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(question, &answer).await {
                warn!("Failed to store response in semantic cache: {}", err);
            }
        }

        self.record_exchange(question, &answer).await?;
        span.complete(&answer);
        self.flush_trace(&span).await;

        Ok(answer)
    }

    /// System prompt with context, prior turns, then the current question.
    async fn assemble_messages(&self, context: &str, question: &str) -> Result<Vec<ChatMessage>> {
        let mut messages = vec![ChatMessage::system(prompts::render_system_prompt(context))];

        let prior = self.history.session(&self.session_id).messages().await?;
        for message in prior {
            messages.push(ChatMessage {
                role: message.role.api_role().to_string(),
                content: Some(message.content),
            });
        }

        messages.push(ChatMessage::user(question));
        Ok(messages)
    }

    async fn record_exchange(&self, question: &str, answer: &str) -> Result<()> {
        self.history
            .session(&self.session_id)
            .append_exchange(question, answer)
            .await
    }

    async fn flush_trace(&self, span: &TraceSpan) {
        if let Some(tracer) = &self.tracer {
            if let Err(err) = tracer.flush(span).await {
                warn!("Trace export failed: {}", err);
            }
        }
    }
}

/// One chat session: reacts to the two events of its lifetime.
pub struct ChatSession {
    ctx: Option<Arc<AppContext>>,
    session_id: String,
    pipeline: Option<QueryPipeline>,
}

impl ChatSession {
    /// Session with a generated id; the pipeline is built on start.
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx: Some(ctx),
            session_id: Uuid::new_v4().to_string(),
            pipeline: None,
        }
    }

    /// Session wrapping an already-built pipeline (embedding the session
    /// logic outside the server, and tests).
    pub fn with_pipeline(pipeline: QueryPipeline) -> Self {
        Self {
            ctx: None,
            session_id: pipeline.session_id().to_string(),
            pipeline: Some(pipeline),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Session-start event: build the pipeline once and report readiness.
    pub async fn on_start(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        info!(session_id = %self.session_id, "Chat session started");

        sink.emit(ServerEvent::Status(
            "🧠 Initializing medical assistant...".to_string(),
        ))
        .await?;

        if self.pipeline.is_none() {
            let Some(ctx) = self.ctx.clone() else {
                sink.emit(ServerEvent::Error(
                    "❌ Error initializing: no application context".to_string(),
                ))
                .await?;
                return Ok(());
            };

            match QueryPipeline::build(&ctx, &self.session_id).await {
                Ok(pipeline) => {
                    self.pipeline = Some(pipeline);
                    info!(session_id = %self.session_id, "Chat pipeline initialized");
                }
                Err(err) => {
                    error!(session_id = %self.session_id, "Error during initialization: {}", err);
                    sink.emit(ServerEvent::Error(format!("❌ Error initializing: {}", err)))
                        .await?;
                    return Ok(());
                }
            }
        }

        sink.emit(ServerEvent::Status(
            "✅ Medical assistant ready! Ask your question.".to_string(),
        ))
        .await
    }

    /// Message event: answer through the pipeline, reporting errors
    /// inline. The session stays usable after a failed query.
    pub async fn on_message(&mut self, text: &str, sink: &mut dyn EventSink) -> Result<()> {
        info!(session_id = %self.session_id, "Received message: {:.50}", text);

        let Some(pipeline) = &self.pipeline else {
            sink.emit(ServerEvent::Error(
                "❌ Error: assistant is not initialized for this session".to_string(),
            ))
            .await?;
            return Ok(());
        };

        let start = Instant::now();
        match pipeline.answer(text, sink).await {
            Ok(answer) => {
                metrics::record_query(start.elapsed(), true);
                info!(session_id = %self.session_id, "Streaming completed");
                sink.emit(ServerEvent::Done(answer)).await
            }
            Err(err) => {
                metrics::record_query(start.elapsed(), false);
                error!(session_id = %self.session_id, "Error processing query: {}", err);
                sink.emit(ServerEvent::Error(format!(
                    "❌ Error: Error processing query: {}",
                    err
                )))
                .await
            }
        }
    }
}
