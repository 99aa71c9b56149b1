//! Web mount for the chat protocol
//!
//! One axum application: the chat session protocol is served over a
//! WebSocket mounted under a configured path, and a logging middleware
//! records method, URL and response status for every HTTP request. No
//! other routes exist.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::metrics;
use crate::pipeline::{ChatSession, EventSink, ServerEvent};

/// Build the chat application router.
pub fn router(ctx: Arc<AppContext>, mount_path: &str) -> Router {
    Router::new()
        .route(mount_path, get(chat_upgrade))
        .with_state(ctx)
        .layer(middleware::from_fn(log_requests))
}

/// Serve the chat application until the process exits.
pub async fn run(ctx: Arc<AppContext>, addr: SocketAddr, mount_path: &str) -> Result<()> {
    let app = router(ctx, mount_path);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, mount_path, "Chat server listening");

    axum::serve(listener, app).await.map_err(Error::IoError)
}

async fn log_requests(req: axum::extract::Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    info!("Request: {} {}", method, uri);

    let response = next.run(req).await;
    info!("Response status: {}", response.status());
    response
}

async fn chat_upgrade(
    State(ctx): State<Arc<AppContext>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

/// Drive one chat session over its socket. Events arrive in order per
/// connection, so a session's handlers never interleave with themselves.
async fn handle_socket(socket: WebSocket, ctx: Arc<AppContext>) {
    metrics::record_session_start();

    let (sender, mut receiver) = socket.split();
    let mut sink = WsEventSink { sender };
    let mut session = ChatSession::new(ctx);

    if let Err(err) = session.on_start(&mut sink).await {
        warn!(session_id = %session.session_id(), "Session start aborted: {}", err);
        metrics::record_session_end();
        return;
    }

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if session.on_message(text.as_str(), &mut sink).await.is_err() {
                    // Client went away mid-stream; abandon the session.
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    metrics::record_session_end();
    info!(session_id = %session.session_id(), "Chat session closed");
}

struct WsEventSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl EventSink for WsEventSink {
    async fn emit(&mut self, event: ServerEvent) -> Result<()> {
        self.sender
            .send(Message::Text(event.to_json().into()))
            .await
            .map_err(|e| Error::Session(format!("client connection lost: {}", e)))
    }
}
