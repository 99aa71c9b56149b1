//! Chat transcript store
//!
//! Transcripts live as `(:Session {id})-[:HAS_MESSAGE]->(:Message)` in the
//! history graph, ordered by a per-session sequence number. When the
//! second database is not configured the store keeps transcripts in
//! process memory instead; the handle API is identical.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use neo4rs::{query, Graph};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::error::{Error, Result};

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    Human,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::Human => "human",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Role string used by the chat-completions wire format.
    pub fn api_role(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::Human => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn parse(value: &str) -> MessageRole {
        match value {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::Human,
        }
    }
}

/// One transcript entry. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
}

enum HistoryBackend {
    Neo4j(Graph),
    Memory(Mutex<HashMap<String, Vec<StoredMessage>>>),
}

/// Store for per-session chat transcripts.
pub struct ChatHistoryStore {
    backend: Arc<HistoryBackend>,
}

impl ChatHistoryStore {
    /// Connect to the chat-history database.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        if config.uri.trim().is_empty() {
            return Err(Error::Config("NEO4J_URI_2 is not set".to_string()));
        }

        let graph = Graph::new(&config.uri, &config.username, &config.password).await?;
        info!(uri = %config.uri, "Connected to chat-history graph");

        Ok(Self {
            backend: Arc::new(HistoryBackend::Neo4j(graph)),
        })
    }

    /// In-process store (used when the history database is not configured,
    /// and in tests).
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(HistoryBackend::Memory(Mutex::new(HashMap::new()))),
        }
    }

    /// Handle bound to one session's transcript. A fresh handle is
    /// constructed per call; handles share the underlying connection.
    pub fn session(&self, session_id: &str) -> SessionHistory {
        SessionHistory {
            backend: self.backend.clone(),
            session_id: session_id.to_string(),
        }
    }
}

/// Handle to a single session's transcript.
pub struct SessionHistory {
    backend: Arc<HistoryBackend>,
    session_id: String,
}

impl SessionHistory {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one message to the transcript.
    pub async fn append(&self, role: MessageRole, content: &str) -> Result<()> {
        match &*self.backend {
            HistoryBackend::Neo4j(graph) => {
                let q = query(
                    "MERGE (s:Session {id: $session_id})
                     WITH s
                     OPTIONAL MATCH (s)-[:HAS_MESSAGE]->(existing:Message)
                     WITH s, count(existing) AS seq
                     CREATE (m:Message {role: $role, content: $content,
                                        seq: seq, created_at: datetime($created_at)})
                     CREATE (s)-[:HAS_MESSAGE]->(m)",
                )
                .param("session_id", self.session_id.clone())
                .param("role", role.as_str())
                .param("content", content)
                .param("created_at", Utc::now().to_rfc3339());

                graph.run(q).await?;
            }
            HistoryBackend::Memory(sessions) => {
                sessions
                    .lock()
                    .await
                    .entry(self.session_id.clone())
                    .or_default()
                    .push(StoredMessage {
                        role,
                        content: content.to_string(),
                    });
            }
        }

        debug!(session_id = %self.session_id, role = role.as_str(), "Appended message");
        Ok(())
    }

    /// Record one completed exchange: the human turn followed by the
    /// assistant's reply.
    pub async fn append_exchange(&self, question: &str, answer: &str) -> Result<()> {
        self.append(MessageRole::Human, question).await?;
        self.append(MessageRole::Assistant, answer).await
    }

    /// Read the whole transcript in insertion order.
    pub async fn messages(&self) -> Result<Vec<StoredMessage>> {
        match &*self.backend {
            HistoryBackend::Neo4j(graph) => {
                let q = query(
                    "MATCH (s:Session {id: $session_id})-[:HAS_MESSAGE]->(m:Message)
                     RETURN m.role AS role, m.content AS content
                     ORDER BY m.seq",
                )
                .param("session_id", self.session_id.clone());

                let mut result = graph.execute(q).await?;
                let mut messages = Vec::new();

                while let Some(row) = result.next().await? {
                    messages.push(StoredMessage {
                        role: MessageRole::parse(
                            &row.get::<String>("role").unwrap_or_default(),
                        ),
                        content: row.get::<String>("content").unwrap_or_default(),
                    });
                }

                Ok(messages)
            }
            HistoryBackend::Memory(sessions) => Ok(sessions
                .lock()
                .await
                .get(&self.session_id)
                .cloned()
                .unwrap_or_default()),
        }
    }
}
