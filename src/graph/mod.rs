//! Graph database clients
//!
//! Two independent Neo4j connections with separate failure domains:
//! - the knowledge graph (documents, chunks, entities, vector index)
//! - the chat-history graph (per-session transcripts)

pub mod history;
pub mod knowledge;

pub use history::{ChatHistoryStore, MessageRole, SessionHistory, StoredMessage};
pub use knowledge::KnowledgeGraphStore;
