use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use super::api::SharedState;
use super::models::{Job, JobProcess, JobWithProcesses};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

/// Change notifications pushed to every connected client so that shop-floor
/// screens can refresh without polling.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum WsMessage {
    JobCreated {
        job: JobWithProcesses,
        undo_token: Uuid,
    },
    JobUpdated {
        job: Job,
        undo_token: Uuid,
    },
    JobDeleted {
        job_key: String,
        undo_token: Uuid,
    },
    JobRestored {
        job_key: String,
    },
    ProcessUpdated {
        job: Job,
        rows: Vec<JobProcess>,
        undo_token: Uuid,
    },
    Undone {
        job_key: String,
        label: String,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_tx.clone()))
}

async fn handle_socket(socket: WebSocket, tx: broadcast::Sender<String>) {
    let (sender, receiver) = socket.split();
    let rx = tx.subscribe();
    tracing::debug!("websocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    tracing::debug!("websocket client disconnected");
}

/// Liveness bookkeeping for one client.
struct Heartbeat {
    last_pong: Instant,
    awaiting_pong: bool,
}

impl Heartbeat {
    fn new() -> Self {
        Self {
            last_pong: Instant::now(),
            awaiting_pong: false,
        }
    }

    /// True when a Ping went unanswered for longer than [`PONG_TIMEOUT`].
    fn expired(&self) -> bool {
        self.awaiting_pong && self.last_pong.elapsed() > PONG_TIMEOUT
    }

    fn pinged(&mut self) {
        self.awaiting_pong = true;
    }

    fn ponged(&mut self) {
        self.last_pong = Instant::now();
        self.awaiting_pong = false;
    }
}

/// Feed tracker events to one client until it goes away.
///
/// The feed is one-way: anything the client sends other than Pong and
/// Close is ignored.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut events: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;
    let mut heartbeat = Heartbeat::new();

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if heartbeat.expired() {
                    tracing::debug!("websocket client stopped answering pings");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                heartbeat.pinged();
            }

            event = events.recv() => match event {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "websocket client fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            frame = receiver.next() => match frame {
                Some(Ok(Message::Pong(_))) => heartbeat.ponged(),
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(len = text.as_str().len(), "ignoring client message");
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to all connected WebSocket clients.
/// Returns silently even if no clients are connected.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize websocket message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_deleted_serialization() {
        let token = Uuid::nil();
        let msg = WsMessage::JobDeleted {
            job_key: "6".into(),
            undo_token: token,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"JobDeleted\""));
        assert!(json.contains("\"jobKey\":\"6\""));
        assert!(json.contains("\"undoToken\""));
    }

    #[test]
    fn test_undone_serialization() {
        let msg = WsMessage::Undone {
            job_key: "job-1".into(),
            label: "delete job".into(),
        };
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "Undone");
        assert_eq!(value["data"]["jobKey"], "job-1");
        assert_eq!(value["data"]["label"], "delete job");
    }

    #[test]
    fn test_heartbeat_expires_only_while_awaiting_pong() {
        let mut heartbeat = Heartbeat::new();
        let Some(stale) = Instant::now().checked_sub(PONG_TIMEOUT + Duration::from_secs(1)) else {
            return;
        };
        heartbeat.last_pong = stale;
        assert!(!heartbeat.expired());
        heartbeat.pinged();
        assert!(heartbeat.expired());
        heartbeat.ponged();
        assert!(!heartbeat.expired());
    }

    #[tokio::test]
    async fn test_broadcast_channel_delivers_to_subscribers() {
        let (tx, _) = broadcast::channel::<String>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        let msg = WsMessage::JobRestored {
            job_key: "job-1".into(),
        };
        broadcast_message(&tx, &msg);

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert!(received1.contains("JobRestored"));
        assert_eq!(received1, received2);
    }

    #[tokio::test]
    async fn test_broadcast_no_receivers_does_not_panic() {
        let (tx, _) = broadcast::channel::<String>(16);
        let msg = WsMessage::JobRestored {
            job_key: "job-1".into(),
        };
        broadcast_message(&tx, &msg);
    }
}
