use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gatekeeper_models::activity::BroadcastMessage;
use gatekeeper_models::command::{CommandKind, CommandRecord, ControlInstruction};
use gatekeeper_store::{CommandLookup, CommandMailbox, StoreError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::broadcast::Broadcaster;
use crate::error::SupervisorError;
use crate::websocket::websocket_handler;

#[derive(Clone)]
pub struct AppState {
    pub mailbox: CommandMailbox,
    pub broadcaster: Arc<Broadcaster>,
    pub heartbeat: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub observers: usize,
    pub last_seq: i64,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandAccepted {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        observers: state.broadcaster.observer_count(),
        last_seq: state.broadcaster.last_seq().await,
    })
}

async fn snapshot(State(state): State<AppState>) -> Json<BroadcastMessage> {
    Json(state.broadcaster.snapshot().await)
}

/// Validate and enqueue. The decision loop picks it up on its next cycle.
async fn enqueue_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandAccepted>), SupervisorError> {
    let candidate = CommandRecord {
        id: String::new(),
        kind: request.kind,
        payload: request.payload.clone(),
        created_at: chrono::Utc::now(),
        outcome: None,
    };
    ControlInstruction::from_record(&candidate)?;

    let mailbox = state.mailbox.clone();
    let record = tokio::task::spawn_blocking(move || mailbox.enqueue(request.kind, request.payload))
        .await
        .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))??;

    info!(id = %record.id, kind = record.kind.as_str(), "Command enqueued");
    Ok((
        StatusCode::ACCEPTED,
        Json(CommandAccepted {
            id: record.id,
            kind: record.kind,
        }),
    ))
}

async fn command_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandLookup>, SupervisorError> {
    match state.mailbox.status(&id) {
        Ok(Some(lookup)) => Ok(Json(lookup)),
        Ok(None) => Err(SupervisorError::NotFound(id)),
        Err(StoreError::UnknownCommand(id)) => Err(SupervisorError::InvalidId(id)),
        Err(e) => Err(e.into()),
    }
}

/// HTTP + websocket surface of the supervisory process.
pub struct SupervisorServer {
    state: AppState,
}

impl SupervisorServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health))
            .route("/api/state", get(snapshot))
            .route("/api/commands", post(enqueue_command))
            .route("/api/commands/:id", get(command_status))
            .route("/ws", get(websocket_handler))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `cancel` fires.
    pub async fn serve(self, addr: SocketAddr, cancel: CancellationToken) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Supervisor listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }
}
