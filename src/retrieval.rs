//! Context retrieval
//!
//! The retriever seam returns scored documents for a raw query string;
//! `get_context` flattens them into the prompt context. A retrieval
//! failure does not propagate: callers receive a fixed fallback string
//! and the pipeline carries on (the fallback is indistinguishable from
//! genuine context by design of the upstream service).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::graph::KnowledgeGraphStore;

/// Context returned when the retriever fails.
pub const CONTEXT_FALLBACK: &str = "Error retrieving context. Please try again.";

/// One scored hit from the knowledge graph. Purely transient.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub text: String,
    pub score: f64,
    /// Source document id.
    pub document_id: String,
    /// Flattened entity-relationship description strings.
    pub entity_relations: Vec<String>,
}

/// Component returning the most relevant stored documents for a query.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>>;
}

/// Retriever bound to the knowledge graph's vector index.
pub struct GraphRetriever {
    store: Arc<KnowledgeGraphStore>,
    embedder: Arc<Embedder>,
    index_name: String,
    top_k: usize,
}

impl GraphRetriever {
    /// Bind to an existing vector index. Fails when the index is absent,
    /// so a broken deployment surfaces at session start rather than on
    /// the first query.
    pub async fn bind(
        store: Arc<KnowledgeGraphStore>,
        embedder: Arc<Embedder>,
        index_name: &str,
        top_k: usize,
    ) -> Result<Self> {
        if !store.vector_index_exists(index_name).await? {
            return Err(Error::VectorIndexNotFound(index_name.to_string()));
        }

        Ok(Self {
            store,
            embedder,
            index_name: index_name.to_string(),
            top_k,
        })
    }
}

#[async_trait]
impl DocumentRetriever for GraphRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let embedding = self.embedder.embed(query).await?;
        self.store
            .similarity_search(&embedding, &self.index_name, self.top_k)
            .await
    }
}

/// Fetch context for a query: document texts joined with newlines, in
/// retriever-returned order.
pub async fn get_context(retriever: &dyn DocumentRetriever, query: &str) -> String {
    debug!("Retrieving context for query: {}", query);

    match retriever.retrieve(query).await {
        Ok(documents) => {
            debug!("Retrieved {} documents", documents.len());
            let context = documents
                .iter()
                .map(|doc| doc.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            debug!("Context length: {} characters", context.len());
            context
        }
        Err(err) => {
            error!("Error retrieving context: {}", err);
            CONTEXT_FALLBACK.to_string()
        }
    }
}
