//! Medical knowledge-graph QA assistant
//!
//! This library wires together:
//! - a Neo4j knowledge graph with a vector index for context retrieval
//! - a second Neo4j database holding per-session chat transcripts
//! - a Redis-backed semantic cache that short-circuits repeated queries
//! - an OpenRouter-compatible model gateway with streaming completions
//! - Langfuse trace export for every generation
//! - an axum WebSocket mount streaming assistant tokens to the client

pub mod cache;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod retrieval;
pub mod server;

// Re-export common types
pub use config::Config;
pub use context::AppContext;
pub use error::{Error, Result};
pub use llm::{ChatMessage, OpenRouterClient};
pub use pipeline::{ChatSession, EventSink, QueryPipeline, ServerEvent};
pub use retrieval::{get_context, DocumentRetriever, GraphRetriever, RetrievedDocument};
