//! Live job updates over WebSocket.
//!
//! A connection first receives the job's current snapshot, then every
//! event the notifier publishes for it, and is closed by the server after
//! the first terminal message.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use saiad_models::{JobEvent, JobId, WsMessage};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_ENDPOINT: &str = "jobs";
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type WsSender = SplitSink<WebSocket, Message>;

fn message_type(msg: &WsMessage) -> &'static str {
    match msg {
        WsMessage::Progress { .. } => "progress",
        WsMessage::Completed { .. } => "completed",
        WsMessage::Error { .. } => "error",
    }
}

/// Serialize and send one message. Returns false once the client is gone.
async fn send_ws_message(sender: &mut WsSender, msg: &WsMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            return false;
        }
    };
    if sender.send(Message::Text(json)).await.is_err() {
        return false;
    }
    metrics::record_ws_message_sent(WS_ENDPOINT, message_type(msg));
    true
}

async fn close(sender: &mut WsSender, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: reason.into(),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}

/// GET /ws/jobs/:job_id
pub async fn ws_job_updates(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job_id = JobId::from_string(job_id);
    if state.tracker.get_status(&job_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Job {} not found", job_id)));
    }

    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection(WS_ENDPOINT);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_job_socket(socket, state, job_id).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    }))
}

async fn handle_job_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no write falls in between.
    let mut events = match state.tracker.subscribe(&job_id).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Failed to subscribe to job events");
            close(&mut sender, "subscription failed").await;
            return;
        }
    };

    let snapshot = match state.tracker.get_status(&job_id).await {
        Ok(Some(job)) => JobEvent::from_job(&job),
        Ok(None) => {
            close(&mut sender, "job not found").await;
            return;
        }
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Failed to load job snapshot");
            close(&mut sender, "job store unavailable").await;
            return;
        }
    };

    info!(job_id = %job_id, revision = snapshot.revision, "WebSocket subscriber attached");

    let first = snapshot.to_ws_message();
    if !send_ws_message(&mut sender, &first).await {
        return;
    }
    if first.is_terminal() {
        close(&mut sender, "job finished").await;
        return;
    }

    let mut last_revision = snapshot.revision;
    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    debug!(job_id = %job_id, "Event stream ended");
                    break;
                };
                // Events at or below the snapshot revision are already reflected in it.
                if event.revision <= last_revision {
                    continue;
                }
                last_revision = event.revision;

                let msg = event.to_ws_message();
                if !send_ws_message(&mut sender, &msg).await {
                    debug!(job_id = %job_id, "WebSocket send failed, client disconnected");
                    return;
                }
                if msg.is_terminal() {
                    close(&mut sender, "job finished").await;
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!(job_id = %job_id, "Heartbeat failed, client disconnected");
                    return;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        debug!(job_id = %job_id, "Client closed connection");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(job_id = %job_id, "WebSocket subscriber detached");
}
