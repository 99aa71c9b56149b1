//! Integration tests for the medgraph library
//!
//! These tests verify the public API and module interactions; everything
//! that needs an external service runs against httpmock doubles, and
//! live-service tests are `#[ignore]`d.

use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;

use medgraph::{
    cache::SemanticCache,
    config::{Config, DEFAULT_DISTANCE_THRESHOLD, DEFAULT_TOP_K, DEFAULT_VECTOR_INDEX},
    embedding::Embedder,
    get_context,
    graph::{ChatHistoryStore, MessageRole},
    pipeline::{ChatSession, EventSink, QueryPipeline, ServerEvent},
    prompts,
    retrieval::{DocumentRetriever, RetrievedDocument, CONTEXT_FALLBACK},
    Error, OpenRouterClient, Result,
};

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_constants() {
    assert_eq!(DEFAULT_VECTOR_INDEX, "vector");
    assert_eq!(DEFAULT_TOP_K, 4);
    assert!((DEFAULT_DISTANCE_THRESHOLD - 0.2).abs() < f32::EPSILON);
}

#[test]
fn test_config_from_env_never_panics() {
    // Missing variables surface at client construction, not here.
    let config = Config::from_env();
    assert!(!config.vector_index.is_empty());
    assert!(config.retrieval_top_k > 0);
}

// ============================================================================
// Context retrieval
// ============================================================================

struct DummyRetriever;

#[async_trait]
impl DocumentRetriever for DummyRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
        Ok(vec![
            RetrievedDocument {
                text: "This is a test doc.".to_string(),
                score: 0.9,
                document_id: "doc-1".to_string(),
                entity_relations: Vec::new(),
            },
            RetrievedDocument {
                text: "Second doc.".to_string(),
                score: 0.8,
                document_id: "doc-2".to_string(),
                entity_relations: Vec::new(),
            },
        ])
    }
}

struct BrokenRetriever;

#[async_trait]
impl DocumentRetriever for BrokenRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
        Err(Error::Graph("boom".to_string()))
    }
}

#[tokio::test]
async fn test_get_context_concatenates_in_order() {
    let context = get_context(&DummyRetriever, "What is diabetes?").await;

    assert!(context.contains("This is a test doc."));
    assert!(context.contains("Second doc."));
    assert!(
        context.find("This is a test doc.").unwrap() < context.find("Second doc.").unwrap()
    );
}

#[tokio::test]
async fn test_get_context_fallback_on_failure() {
    let context = get_context(&BrokenRetriever, "What is diabetes?").await;
    assert_eq!(context, CONTEXT_FALLBACK);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_history_handle_appends_and_reads() {
    let store = ChatHistoryStore::in_memory();
    let history = store.session("integration-session");

    history
        .append(MessageRole::Human, "What is asthma?")
        .await
        .unwrap();

    let messages = history.messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "What is asthma?");

    // Not visible under a different session id.
    let other = store.session("another-session").messages().await.unwrap();
    assert!(other.is_empty());
}

// ============================================================================
// Prompts
// ============================================================================

#[test]
fn test_prompt_keeps_clinical_structure() {
    let rendered = prompts::render_system_prompt("retrieved facts");

    for section in [
        "Clinical Overview",
        "Relevant Findings",
        "Clinical Recommendations",
        "Graph Context",
        "Example or Use Case",
        "Conclusion",
    ] {
        assert!(rendered.contains(section), "missing section: {}", section);
    }
    assert!(rendered.contains("Context: retrieved facts"));
}

// ============================================================================
// End-to-end session against a mock gateway
// ============================================================================

struct CollectingSink {
    events: Vec<ServerEvent>,
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&mut self, event: ServerEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n",
            fragment
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn mock_pipeline(server: &MockServer, cache: Option<Arc<SemanticCache>>) -> QueryPipeline {
    let llm = Arc::new(
        OpenRouterClient::new("test_key", "test-model")
            .expect("client")
            .with_base_url(&server.base_url()),
    );

    QueryPipeline::from_parts(
        "integration-session",
        Arc::new(DummyRetriever),
        llm,
        Arc::new(ChatHistoryStore::in_memory()),
        cache,
        None,
    )
}

#[tokio::test]
async fn test_session_streams_answer_end_to_end() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .body(sse_body(&["Polyuria, ", "polydipsia ", "and fatigue."]));
    });

    let mut session = ChatSession::with_pipeline(mock_pipeline(&server, None));
    let mut sink = CollectingSink { events: Vec::new() };

    session.on_start(&mut sink).await.unwrap();
    session
        .on_message("What are the symptoms of diabetes?", &mut sink)
        .await
        .unwrap();

    let tokens: Vec<_> = sink
        .events
        .iter()
        .filter(|e| matches!(e, ServerEvent::Token(_)))
        .collect();
    assert!(!tokens.is_empty());

    let done = sink.events.iter().find_map(|e| match e {
        ServerEvent::Done(text) => Some(text.clone()),
        _ => None,
    });
    assert_eq!(done.as_deref(), Some("Polyuria, polydipsia and fatigue."));
}

#[tokio::test]
async fn test_semantic_cache_dedupes_gateway_calls() {
    let server = MockServer::start_async().await;

    let gateway_mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).body(sse_body(&["one answer"]));
    });

    let cache = Arc::new(SemanticCache::in_memory(Arc::new(Embedder::local(64)), 0.2));
    let pipeline = mock_pipeline(&server, Some(cache));
    let mut session = ChatSession::with_pipeline(pipeline);

    let mut sink = CollectingSink { events: Vec::new() };
    session.on_message("Is metformin safe?", &mut sink).await.unwrap();
    session.on_message("Is metformin safe?", &mut sink).await.unwrap();

    gateway_mock.assert_calls(1);
}

// ============================================================================
// Live services (opt-in)
// ============================================================================

#[tokio::test]
#[ignore] // Requires REDIS_URI pointing at a running Redis
async fn test_live_redis_cache_roundtrip() {
    dotenvy::dotenv().ok();
    let uri = std::env::var("REDIS_URI").expect("REDIS_URI not found in environment variables");

    let cache = SemanticCache::connect(&uri, Arc::new(Embedder::local(64)), 0.9).unwrap();
    cache
        .store("Redis is a fast in-memory key-value store.", "cached")
        .await
        .unwrap();

    let hit = cache
        .lookup("Redis is a fast in-memory key-value store.")
        .await
        .unwrap();
    assert!(hit.is_some(), "No result retrieved from Redis");
}
