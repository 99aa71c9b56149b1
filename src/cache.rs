//! Semantic response cache
//!
//! Keyed by similarity-of-meaning rather than exact match: every stored
//! entry carries the query embedding, and a lookup embeds the incoming
//! query and scans for the nearest stored vector within a cosine-distance
//! threshold. Entries live in a Redis list as JSON blobs; eviction is the
//! cache service's concern. An in-memory backend covers tests and offline
//! development.

use std::sync::Arc;

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;

/// Redis key holding the cache entries.
const CACHE_KEY: &str = "medgraph:semantic_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    embedding: Vec<f32>,
    prompt: String,
    response: String,
}

enum CacheBackend {
    Redis(redis::Client),
    Memory(Mutex<Vec<CacheEntry>>),
}

/// Cache of generated responses keyed by query embedding.
pub struct SemanticCache {
    embedder: Arc<Embedder>,
    distance_threshold: f32,
    backend: CacheBackend,
}

impl SemanticCache {
    /// Cache backed by a Redis list. The connection is established lazily
    /// on first use.
    pub fn connect(redis_uri: &str, embedder: Arc<Embedder>, distance_threshold: f32) -> Result<Self> {
        let client = redis::Client::open(redis_uri)?;
        Ok(Self {
            embedder,
            distance_threshold,
            backend: CacheBackend::Redis(client),
        })
    }

    /// In-process cache (useful for tests or offline).
    pub fn in_memory(embedder: Arc<Embedder>, distance_threshold: f32) -> Self {
        Self {
            embedder,
            distance_threshold,
            backend: CacheBackend::Memory(Mutex::new(Vec::new())),
        }
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    /// Return the cached response for the nearest stored query within the
    /// distance threshold, if any.
    pub async fn lookup(&self, prompt: &str) -> Result<Option<String>> {
        let embedding = self.embedder.embed(prompt).await?;
        let entries = self.load_entries().await?;

        let mut best: Option<(f32, &CacheEntry)> = None;
        for entry in &entries {
            let distance = cosine_distance(&embedding, &entry.embedding);
            if distance > self.distance_threshold {
                continue;
            }
            match best {
                Some((best_distance, _)) if best_distance <= distance => {}
                _ => best = Some((distance, entry)),
            }
        }

        if let Some((distance, entry)) = best {
            debug!(distance = distance as f64, "Semantic cache hit for prompt: {}", entry.prompt);
            return Ok(Some(entry.response.clone()));
        }

        Ok(None)
    }

    /// Store a generated response keyed by the query's embedding.
    pub async fn store(&self, prompt: &str, response: &str) -> Result<()> {
        let entry = CacheEntry {
            embedding: self.embedder.embed(prompt).await?,
            prompt: prompt.to_string(),
            response: response.to_string(),
        };

        match &self.backend {
            CacheBackend::Redis(client) => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let payload = serde_json::to_string(&entry)?;
                let _: i64 = conn.rpush(CACHE_KEY, payload).await?;
            }
            CacheBackend::Memory(entries) => {
                entries.lock().await.push(entry);
            }
        }

        Ok(())
    }

    async fn load_entries(&self) -> Result<Vec<CacheEntry>> {
        match &self.backend {
            CacheBackend::Redis(client) => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let raw: Vec<String> = conn.lrange(CACHE_KEY, 0, -1).await?;
                let mut entries = Vec::with_capacity(raw.len());
                for payload in raw {
                    entries.push(serde_json::from_str(&payload)?);
                }
                Ok(entries)
            }
            CacheBackend::Memory(entries) => Ok(entries.lock().await.clone()),
        }
    }
}

/// Cosine distance: 0.0 for identical direction, 1.0 for orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
