use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Deserialize;
use serde_json::json;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tinychat::models::message::Message;
use tinychat::providers::base::Provider;
use tinychat::providers::ollama::OllamaProvider;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

/// Hard cap on how long one reply may stream before it is cut off
const MAX_STREAM_DURATION: Duration = Duration::from_secs(30);

/// How often the relay wakes up to notice a disconnected client
const HEARTBEAT: Duration = Duration::from_millis(500);

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<IncomingMessage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

// Custom SSE response type that implements the Vercel AI SDK protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let stream = self;
        let body = axum::body::Body::from_stream(stream);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .header("x-vercel-ai-data-stream", "v1")
            .body(body)
            .unwrap()
    }
}

// Convert incoming messages to our internal Message type
fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "user" => messages.push(Message::user(msg.content)),
            "assistant" => messages.push(Message::assistant(msg.content)),
            _ => {
                tracing::warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        // Text parts start with "0:" and carry a JSON-encoded string
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, StatusCode> {
    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    let provider =
        OllamaProvider::new(state.ollama.clone()).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Convert incoming messages
    let messages = convert_messages(request.messages);
    let model = request.model;

    // Spawn task to handle streaming
    tokio::spawn(async move {
        let mut tokens = match provider.stream(&model, &messages).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!("Failed to start reply stream: {}", e);
                // Send a finish message with error as the reason
                let _ = tx.send(ProtocolFormatter::format_finish("error")).await;
                return;
            }
        };

        let deadline = tokio::time::sleep(MAX_STREAM_DURATION);
        tokio::pin!(deadline);

        let reason = loop {
            tokio::select! {
                () = &mut deadline => {
                    tracing::warn!("Reply exceeded {:?}, cutting stream", MAX_STREAM_DURATION);
                    break "length";
                }
                response = timeout(HEARTBEAT, tokens.next()) => {
                    match response {
                        Ok(Some(Ok(text))) => {
                            if let Err(e) = tx.send(ProtocolFormatter::format_text(&text)).await {
                                tracing::error!("Error sending text through channel: {}", e);
                                return;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            tracing::error!("Error processing reply: {}", e);
                            break "error";
                        }
                        Ok(None) => {
                            break "stop";
                        }
                        Err(_) => { // Heartbeat, used to detect disconnected clients
                            if tx.is_closed() {
                                return;
                            }
                            continue;
                        }
                    }
                }
            }
        };

        // Send finish message
        let _ = tx.send(ProtocolFormatter::format_finish(reason)).await;
    });

    Ok(SseResponse::new(stream))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
