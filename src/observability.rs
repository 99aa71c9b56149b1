//! Langfuse trace export
//!
//! One `TraceSpan` per pipeline invocation: it receives the start, token
//! and completion events of the streaming call and is flushed once to the
//! Langfuse batch-ingestion API. Delivery is best-effort; callers log and
//! swallow export failures.

use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use crate::config::LangfuseConfig;
use crate::error::{Error, Result};

/// One recorded unit of observability data covering a single pipeline
/// invocation.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    pub id: String,
    pub session_id: String,
    pub model: String,
    pub input: String,
    pub output: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub token_count: usize,
    pub cache_hit: bool,
}

impl TraceSpan {
    /// Start a span for one generation.
    pub fn begin(session_id: &str, model: &str, input: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            model: model.to_string(),
            input: input.to_string(),
            output: String::new(),
            start_time: Utc::now(),
            end_time: None,
            token_count: 0,
            cache_hit: false,
        }
    }

    /// Count one streamed fragment.
    pub fn record_token(&mut self) {
        self.token_count += 1;
    }

    pub fn mark_cache_hit(&mut self) {
        self.cache_hit = true;
    }

    /// Close the span with the final output.
    pub fn complete(&mut self, output: &str) {
        self.output = output.to_string();
        self.end_time = Some(Utc::now());
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Client for the Langfuse ingestion API.
#[derive(Debug, Clone)]
pub struct LangfuseTracer {
    http: Client,
    base_url: String,
    public_key: String,
    secret_key: String,
}

impl LangfuseTracer {
    /// Create tracer from Langfuse configuration.
    pub fn from_config(config: &LangfuseConfig) -> Result<Self> {
        if config.public_key.trim().is_empty() || config.secret_key.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "Langfuse keys are empty".to_string(),
            ));
        }

        let http = Client::builder()
            .user_agent("medgraph/0.1.0")
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.host_url.trim_end_matches('/').to_string(),
            public_key: config.public_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Override the host URL.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.public_key, self.secret_key);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    /// Flush one completed span to the ingestion endpoint.
    pub async fn flush(&self, span: &TraceSpan) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let end_time = span
            .end_time
            .unwrap_or_else(Utc::now)
            .to_rfc3339();

        let batch = json!({
            "batch": [
                {
                    "id": Uuid::new_v4().to_string(),
                    "type": "trace-create",
                    "timestamp": now,
                    "body": {
                        "id": span.id,
                        "name": "medical-qa",
                        "sessionId": span.session_id,
                        "input": span.input,
                        "output": span.output,
                        "timestamp": span.start_time.to_rfc3339(),
                    }
                },
                {
                    "id": Uuid::new_v4().to_string(),
                    "type": "generation-create",
                    "timestamp": now,
                    "body": {
                        "traceId": span.id,
                        "name": "chat-completion",
                        "model": span.model,
                        "input": span.input,
                        "output": span.output,
                        "startTime": span.start_time.to_rfc3339(),
                        "endTime": end_time,
                        "metadata": {
                            "tokenCount": span.token_count,
                            "cacheHit": span.cache_hit,
                        }
                    }
                }
            ]
        });

        let response = self
            .http
            .post(format!("{}/api/public/ingestion", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&batch)
            .send()
            .await
            .map_err(|e| Error::TraceExport(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::TraceExport(format!("{}: {}", status, text)));
        }

        Ok(())
    }
}
