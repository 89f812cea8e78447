//! HTTP surface: the websocket endpoint plus the small status/health routes.

use crate::dispatch::GameServer;
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use durak_core::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, stream::StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub struct AppState {
    pub server: GameServer,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(server: GameServer) -> Self {
        AppState { server, started_at: Instant::now() }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/health", get(health))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Durak game server is running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "status": "/api/status",
            "health": "/health",
            "websocket": "/ws",
        },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "Server is running",
        "rooms": state.server.room_count(),
        "users": state.server.user_count(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one client connection from upgrade to close.
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    // Outbound messages are queued by the dispatcher and written by this task.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.server.connect(conn_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => state.server.handle(conn_id, client_msg),
                Err(e) => state.server.reject_malformed(conn_id, &e.to_string()),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Dropping the outbox ends the writer once it has flushed what is queued.
    state.server.disconnect(conn_id);
    let _ = writer.await;
}
