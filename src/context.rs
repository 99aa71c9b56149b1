//! Shared application context
//!
//! Every process-wide client (embedder, both graph stores, cache, model
//! gateway, tracer) is constructed exactly once at startup and injected
//! into session handlers. Nothing in this crate holds module-level
//! mutable state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::SemanticCache;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::graph::{ChatHistoryStore, KnowledgeGraphStore};
use crate::llm::OpenRouterClient;
use crate::observability::LangfuseTracer;

/// Process-wide clients shared across all chat sessions.
pub struct AppContext {
    pub config: Config,
    pub embedder: Arc<Embedder>,
    pub knowledge: Arc<KnowledgeGraphStore>,
    pub history: Arc<ChatHistoryStore>,
    pub llm: Arc<OpenRouterClient>,
    pub cache: Option<Arc<SemanticCache>>,
    pub tracer: Option<Arc<LangfuseTracer>>,
}

impl AppContext {
    /// Construct every shared client. The knowledge graph connection is
    /// required; history, cache and tracing degrade gracefully when not
    /// configured.
    pub async fn initialize(config: Config) -> Result<Self> {
        let embedder = Arc::new(Embedder::from_env());

        let knowledge = Arc::new(KnowledgeGraphStore::connect(&config.knowledge_graph).await?);

        let history = match &config.history_graph {
            Some(graph_config) => Arc::new(ChatHistoryStore::connect(graph_config).await?),
            None => {
                warn!("NEO4J_URI_2 not set; keeping chat history in process memory");
                Arc::new(ChatHistoryStore::in_memory())
            }
        };

        let llm = Arc::new(OpenRouterClient::from_config(&config.model_gateway)?);

        let cache = if config.cache_enabled() {
            let cache = SemanticCache::connect(
                &config.redis.uri,
                embedder.clone(),
                config.cache_distance_threshold,
            )?;
            info!(
                threshold = config.cache_distance_threshold as f64,
                "Semantic cache enabled"
            );
            Some(Arc::new(cache))
        } else {
            warn!("Semantic cache disabled; every query will invoke the model gateway");
            None
        };

        let tracer = match &config.langfuse {
            Some(langfuse_config) => {
                info!(host = %langfuse_config.host_url, "Langfuse tracing enabled");
                Some(Arc::new(LangfuseTracer::from_config(langfuse_config)?))
            }
            None => {
                warn!("Langfuse not configured; traces will not be exported");
                None
            }
        };

        Ok(Self {
            config,
            embedder,
            knowledge,
            history,
            llm,
            cache,
            tracer,
        })
    }
}
