//! Environment-driven configuration
//!
//! All settings come from process environment variables (a local `.env`
//! file is honored via dotenvy). Values are resolved leniently: a missing
//! variable does not abort startup, it surfaces when the client that owns
//! the value is constructed. Tests assert presence explicitly.

use std::env;

/// Model served through the OpenRouter-compatible gateway.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick:free";

/// Default base URL of the model gateway.
pub const DEFAULT_GATEWAY_URL: &str = "https://openrouter.ai/api/v1";

/// Name of the vector index over knowledge-graph chunks.
pub const DEFAULT_VECTOR_INDEX: &str = "vector";

/// Number of documents fetched per retrieval.
pub const DEFAULT_TOP_K: usize = 4;

/// Cosine-distance threshold for semantic cache hits.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.2;

/// Credentials for one Neo4j database.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
}

/// Redis connection settings for the semantic cache.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub uri: String,
    pub password: Option<String>,
    pub port: Option<u16>,
}

/// Langfuse tracing credentials.
#[derive(Debug, Clone)]
pub struct LangfuseConfig {
    pub host_url: String,
    pub public_key: String,
    pub secret_key: String,
}

/// Model gateway (OpenRouter-compatible) settings.
#[derive(Debug, Clone)]
pub struct ModelGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// OAuth provider client credentials.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    /// Knowledge graph (entities, documents, vector embeddings).
    pub knowledge_graph: GraphConfig,
    /// Chat-history graph. Optional: history stays in process memory
    /// when the second database is not configured.
    pub history_graph: Option<GraphConfig>,
    pub redis: RedisConfig,
    pub langfuse: Option<LangfuseConfig>,
    pub model_gateway: ModelGatewayConfig,
    /// Session-encryption secret for the chat frontend.
    pub auth_secret: Option<String>,
    pub oauth_github: Option<OAuthConfig>,
    pub oauth_google: Option<OAuthConfig>,
    pub vector_index: String,
    pub retrieval_top_k: usize,
    pub cache_distance_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        // Load .env for local development; ignored in production setups
        // where the environment is injected directly.
        let _ = dotenvy::dotenv();

        Self {
            knowledge_graph: GraphConfig {
                uri: env_string("NEO4J_URI"),
                username: env_string("NEO4J_USERNAME"),
                password: env_string("NEO4J_PASSWORD"),
            },
            history_graph: env_opt("NEO4J_URI_2").map(|uri| GraphConfig {
                uri,
                username: env_string("NEO4J_USERNAME_2"),
                password: env_string("NEO4J_PASSWORD_2"),
            }),
            redis: RedisConfig {
                uri: env_string("REDIS_URI"),
                password: env_opt("REDIS_PASSWORD"),
                port: env_opt("REDIS_PORT").and_then(|p| p.parse().ok()),
            },
            langfuse: match (
                env_opt("LANGFUSE_HOST_URL"),
                env_opt("LANGFUSE_PUBLIC_KEY"),
                env_opt("LANGFUSE_SECRET_KEY"),
            ) {
                (Some(host_url), Some(public_key), Some(secret_key)) => Some(LangfuseConfig {
                    host_url,
                    public_key,
                    secret_key,
                }),
                _ => None,
            },
            model_gateway: ModelGatewayConfig {
                base_url: env_opt("OPENROUTER_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
                api_key: env_string("OPENROUTER_API_KEY"),
                model: env_opt("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
            auth_secret: env_opt("AUTH_SECRET"),
            oauth_github: oauth_pair("OAUTH_GITHUB_CLIENT_ID", "OAUTH_GITHUB_CLIENT_SECRET"),
            oauth_google: oauth_pair("OAUTH_GOOGLE_CLIENT_ID", "OAUTH_GOOGLE_CLIENT_SECRET"),
            vector_index: env_opt("VECTOR_INDEX_NAME")
                .unwrap_or_else(|| DEFAULT_VECTOR_INDEX.to_string()),
            retrieval_top_k: env_opt("RETRIEVAL_TOP_K")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TOP_K),
            cache_distance_threshold: env_opt("CACHE_DISTANCE_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
        }
    }

    /// True when a distance threshold is configured that allows cache hits.
    pub fn cache_enabled(&self) -> bool {
        !self.redis.uri.is_empty() && self.cache_distance_threshold > 0.0
    }
}

/// Read a variable, treating absent and blank values the same.
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_string(key: &str) -> String {
    env_opt(key).unwrap_or_default()
}

fn oauth_pair(id_key: &str, secret_key: &str) -> Option<OAuthConfig> {
    match (env_opt(id_key), env_opt(secret_key)) {
        (Some(client_id), Some(client_secret)) => Some(OAuthConfig {
            client_id,
            client_secret,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        keys: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn set(pairs: &[(&'static str, &str)]) -> Self {
            let keys = pairs
                .iter()
                .map(|(key, value)| {
                    let original = env::var(key).ok();
                    env::set_var(key, value);
                    (*key, original)
                })
                .collect();
            Self { keys }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, original) in &self.keys {
                match original {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    // Environment mutation is process-global, so everything that touches
    // it lives in one test.
    #[test]
    fn test_config_resolves_from_environment() {
        let _guard = EnvGuard::set(&[
            ("NEO4J_URI", "bolt://kg.example:7687"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "secret"),
            ("NEO4J_URI_2", "bolt://history.example:7687"),
            ("NEO4J_USERNAME_2", "neo4j"),
            ("NEO4J_PASSWORD_2", "secret2"),
            ("REDIS_URI", "redis://cache.example:6379"),
            ("REDIS_PORT", "6379"),
            ("LANGFUSE_HOST_URL", "https://langfuse.example"),
            ("LANGFUSE_PUBLIC_KEY", "pk-test"),
            ("LANGFUSE_SECRET_KEY", "sk-test"),
            ("OPENROUTER_BASE_URL", "https://gateway.example/api/v1"),
            ("OPENROUTER_API_KEY", "or-test"),
            ("CACHE_DISTANCE_THRESHOLD", "0.35"),
        ]);

        let config = Config::from_env();

        assert_eq!(config.knowledge_graph.uri, "bolt://kg.example:7687");
        assert_eq!(config.knowledge_graph.password, "secret");

        let history = config.history_graph.as_ref().expect("history graph");
        assert_eq!(history.uri, "bolt://history.example:7687");

        assert_eq!(config.redis.uri, "redis://cache.example:6379");
        assert_eq!(config.redis.port, Some(6379));

        let langfuse = config.langfuse.as_ref().expect("langfuse config");
        assert_eq!(langfuse.public_key, "pk-test");

        assert_eq!(config.model_gateway.base_url, "https://gateway.example/api/v1");
        assert_eq!(config.model_gateway.api_key, "or-test");
        assert_eq!(config.model_gateway.model, DEFAULT_MODEL);

        assert!((config.cache_distance_threshold - 0.35).abs() < f32::EPSILON);
        assert!(config.cache_enabled());
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_VECTOR_INDEX, "vector");
        assert_eq!(DEFAULT_TOP_K, 4);
        assert!((DEFAULT_DISTANCE_THRESHOLD - 0.2).abs() < f32::EPSILON);
        assert!(DEFAULT_GATEWAY_URL.starts_with("https://"));
    }

    #[test]
    fn test_cache_enabled_requires_uri_and_threshold() {
        let mut config = Config::from_env();
        config.redis.uri = String::new();
        assert!(!config.cache_enabled());

        config.redis.uri = "redis://localhost:6379".to_string();
        config.cache_distance_threshold = 0.0;
        assert!(!config.cache_enabled());

        config.cache_distance_threshold = 0.2;
        assert!(config.cache_enabled());
    }
}
