//! Prometheus metrics for the medgraph server.
//!
//! Exposes:
//! - `medgraph_sessions_active` (gauge)
//! - `medgraph_queries_total` (counter with status)
//! - `medgraph_query_duration_seconds` (histogram)
//! - `medgraph_cache_events_total` (counter with result)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("medgraph_sessions_active", "Number of open chat sessions")
        .expect("failed to register sessions gauge")
});

static QUERY_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "medgraph_queries_total",
        "Total query executions by status",
        &["status"]
    )
    .expect("failed to register query counter")
});

static QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 12).expect("failed to create histogram buckets");
    register_histogram!(
        "medgraph_query_duration_seconds",
        "End-to-end query handling duration in seconds",
        buckets
    )
    .expect("failed to register query duration histogram")
});

static CACHE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "medgraph_cache_events_total",
        "Semantic cache lookups by result",
        &["result"]
    )
    .expect("failed to register cache counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&SESSIONS_ACTIVE);
    Lazy::force(&QUERY_TOTAL);
    Lazy::force(&QUERY_DURATION);
    Lazy::force(&CACHE_EVENTS);
}

/// A chat session opened.
pub fn record_session_start() {
    init_collectors();
    SESSIONS_ACTIVE.inc();
}

/// A chat session closed.
pub fn record_session_end() {
    init_collectors();
    SESSIONS_ACTIVE.dec();
}

/// Record one handled query with duration and status.
pub fn record_query(duration: Duration, success: bool) {
    init_collectors();
    QUERY_DURATION.observe(duration.as_secs_f64());
    QUERY_TOTAL
        .with_label_values(&[if success { "ok" } else { "error" }])
        .inc();
}

/// Record one semantic cache lookup.
pub fn record_cache_event(hit: bool) {
    init_collectors();
    CACHE_EVENTS
        .with_label_values(&[if hit { "hit" } else { "miss" }])
        .inc();
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::from("encode error"))
            .unwrap());
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, encoder.format_type())
        .body(Full::from(buffer))
        .unwrap())
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap()),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
