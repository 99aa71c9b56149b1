//! Knowledge-graph client backed by Neo4j
//!
//! Chunks are stored as nodes with `text` and `Embedding` properties,
//! linked to their source document via `PART_OF` and to extracted
//! entities via `HAS_ENTITY`. Retrieval runs the vector index query and
//! then a fixed traversal that flattens the entity relationships around
//! each chunk into plain description strings.

use neo4rs::{query, Graph};
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::retrieval::RetrievedDocument;

/// Similarity search over the knowledge graph's vector index, with the
/// entity/relationship context attached to every hit.
const RETRIEVAL_QUERY: &str = "
    CALL db.index.vector.queryNodes($index_name, $top_k, $embedding)
    YIELD node, score
    MATCH (node)-[:PART_OF]->(d:Document)
    WITH node, score, d
    MATCH (node)-[:HAS_ENTITY]->(e)
    MATCH p = (e)-[r]-(e2)
    WHERE (node)-[:HAS_ENTITY]->(e2)
    UNWIND relationships(p) AS rel
    WITH node, score, d,
         collect(labels(startNode(rel))[0] + ' ' + toString(startNode(rel).id) + ' '
                 + type(rel) + ' '
                 + labels(endNode(rel))[0] + ' ' + toString(endNode(rel).id)) AS entity_relations
    RETURN node.text AS text, score, d.id AS document, entity_relations
";

/// Client for the medical knowledge graph.
pub struct KnowledgeGraphStore {
    graph: Graph,
}

impl KnowledgeGraphStore {
    /// Connect to the knowledge-graph database.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        if config.uri.trim().is_empty() {
            return Err(Error::Config("NEO4J_URI is not set".to_string()));
        }

        let graph = Graph::new(&config.uri, &config.username, &config.password).await?;
        info!(uri = %config.uri, "Connected to knowledge graph");

        Ok(Self { graph })
    }

    /// Check that a vector index with the given name exists.
    pub async fn vector_index_exists(&self, index_name: &str) -> Result<bool> {
        let mut result = self
            .graph
            .execute(query("SHOW VECTOR INDEXES YIELD name"))
            .await?;

        while let Some(row) = result.next().await? {
            if row.get::<String>("name").ok().as_deref() == Some(index_name) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Run the vector similarity query and return scored documents in
    /// index order.
    pub async fn similarity_search(
        &self,
        embedding: &[f32],
        index_name: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let embedding: Vec<f64> = embedding.iter().map(|v| *v as f64).collect();

        let q = query(RETRIEVAL_QUERY)
            .param("index_name", index_name)
            .param("top_k", top_k as i64)
            .param("embedding", embedding);

        let mut result = self.graph.execute(q).await?;
        let mut documents = Vec::new();

        while let Some(row) = result.next().await? {
            documents.push(RetrievedDocument {
                text: row.get::<String>("text").unwrap_or_default(),
                score: row.get::<f64>("score").unwrap_or(0.0),
                document_id: row.get::<String>("document").unwrap_or_default(),
                entity_relations: row.get::<Vec<String>>("entity_relations").unwrap_or_default(),
            });
        }

        debug!("Similarity search returned {} documents", documents.len());
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;

    #[tokio::test]
    async fn connect_rejects_missing_uri() {
        let config = GraphConfig {
            uri: String::new(),
            username: "neo4j".to_string(),
            password: "secret".to_string(),
        };

        let err = KnowledgeGraphStore::connect(&config).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("NEO4J_URI"));
    }

    #[test]
    fn retrieval_query_binds_expected_parameters() {
        assert!(RETRIEVAL_QUERY.contains("$index_name"));
        assert!(RETRIEVAL_QUERY.contains("$top_k"));
        assert!(RETRIEVAL_QUERY.contains("$embedding"));
        assert!(RETRIEVAL_QUERY.contains("PART_OF"));
        assert!(RETRIEVAL_QUERY.contains("HAS_ENTITY"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Neo4j with a populated vector index
    async fn live_similarity_search() {
        dotenvy::dotenv().ok();
        let config = GraphConfig {
            uri: std::env::var("NEO4J_URI").expect("NEO4J_URI not set"),
            username: std::env::var("NEO4J_USERNAME").unwrap_or_else(|_| "neo4j".to_string()),
            password: std::env::var("NEO4J_PASSWORD").expect("NEO4J_PASSWORD not set"),
        };

        let store = KnowledgeGraphStore::connect(&config).await.unwrap();
        assert!(store.vector_index_exists("vector").await.unwrap());
    }
}
