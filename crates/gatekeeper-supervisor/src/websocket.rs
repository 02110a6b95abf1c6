use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use gatekeeper_models::activity::{BroadcastMessage, ObserverRequest};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::server::AppState;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let updates = state.broadcaster.subscribe();
        let (sink, stream) = socket.split();
        observer_session(sink, stream, updates, state.broadcaster, state.heartbeat).await
    })
}

/// Reply to an observer request, if it warrants one.
pub async fn answer(broadcaster: &Broadcaster, text: &str) -> Option<BroadcastMessage> {
    match serde_json::from_str::<ObserverRequest>(text) {
        Ok(ObserverRequest::Resync) => Some(broadcaster.snapshot().await),
        Ok(ObserverRequest::Ping) => Some(Broadcaster::heartbeat()),
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognised observer message");
            None
        }
    }
}

/// Highest journal sequence an observer already has, pushed or folded into
/// a snapshot.
#[derive(Debug, Default)]
pub struct DeliveryCursor {
    last_seq: i64,
}

impl DeliveryCursor {
    /// Whether `message` should go out. A snapshot moves the cursor to the
    /// sequence it covers.
    pub fn admit(&mut self, message: &BroadcastMessage) -> bool {
        if let BroadcastMessage::Snapshot { last_seq, .. } = message {
            self.last_seq = *last_seq;
            return true;
        }
        match message.seq() {
            Some(seq) if seq <= self.last_seq => false,
            Some(seq) => {
                self.last_seq = seq;
                true
            }
            None => true,
        }
    }
}

async fn send<S>(sink: &mut S, message: &BroadcastMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to encode broadcast message");
            return true;
        }
    };
    sink.send(Message::Text(json)).await.is_ok()
}

/// One observer connection: snapshot first, then incremental pushes,
/// heartbeats, and answers to resync/ping requests.
///
/// `updates` must be subscribed before the first snapshot is taken; pushes
/// the snapshot already covers are skipped.
pub async fn observer_session<S, R, E>(
    mut sink: S,
    mut stream: R,
    mut updates: broadcast::Receiver<BroadcastMessage>,
    broadcaster: Arc<Broadcaster>,
    heartbeat: Duration,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    info!(observers = broadcaster.observer_count(), "Observer connected");
    let mut cursor = DeliveryCursor::default();

    let snapshot = broadcaster.snapshot().await;
    cursor.admit(&snapshot);
    if !send(&mut sink, &snapshot).await {
        debug!("Observer went away before the snapshot");
        return;
    }

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;

    loop {
        let outgoing = tokio::select! {
            update = updates.recv() => match update {
                Ok(message) => message,
                Err(RecvError::Lagged(missed)) => {
                    debug!(missed, "Observer lagged, resending snapshot");
                    broadcaster.snapshot().await
                }
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => Broadcaster::heartbeat(),
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match answer(&broadcaster, &text).await {
                    Some(reply) => reply,
                    None => continue,
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "Observer socket error");
                    break;
                }
            },
        };

        if !cursor.admit(&outgoing) {
            continue;
        }
        if !send(&mut sink, &outgoing).await {
            debug!("Dropping observer after failed send");
            break;
        }
    }

    info!("Observer disconnected");
}
