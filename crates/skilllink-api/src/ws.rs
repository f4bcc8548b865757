//! WebSocket feed of job updates.
//!
//! Clients subscribe to `jobs` (every job) or `job:<id>` and refetch the job
//! when an update arrives. Delivery is best effort: a subscriber that falls
//! behind skips the missed events.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use skilllink_core::{JobStatus, ResourceId};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::AppState;
use crate::session::CurrentSession;

const ALL_JOBS: &str = "jobs";

/// WebSocket upgrade handler. Only signed-in users may subscribe.
pub async fn ws_handler(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    info!(actor_id = %session.actor_id, "WebSocket upgrade");
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

async fn handle_socket(mut socket: WebSocket, mut events: broadcast::Receiver<JobEvent>) {
    info!("WebSocket connection established");
    let mut channels: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(cmd) = serde_json::from_str::<WsCommand>(&text) else {
                        continue;
                    };
                    match cmd {
                        WsCommand::Subscribe { channel } => {
                            info!(channel = %channel, "Client subscribed");
                            let reply = WsMessage::Subscribed { channel: channel.clone() };
                            channels.insert(channel);
                            if send(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                        WsCommand::Unsubscribe { channel } => {
                            info!(channel = %channel, "Client unsubscribed");
                            channels.remove(&channel);
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket connection closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if event.matches(&channels) && send(&mut socket, &WsMessage::from(event)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

async fn send(socket: &mut WebSocket, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode WebSocket message");
            Ok(())
        }
    }
}

/// Change notification published after a transition commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobUpdated { job_id: ResourceId, status: JobStatus },
}

impl JobEvent {
    fn job_id(&self) -> ResourceId {
        match self {
            JobEvent::JobUpdated { job_id, .. } => *job_id,
        }
    }

    fn matches(&self, channels: &HashSet<String>) -> bool {
        channels.contains(ALL_JOBS) || channels.contains(&format!("job:{}", self.job_id()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsMessage {
    Subscribed { channel: String },
    JobUpdated { job_id: ResourceId, status: JobStatus },
}

impl From<JobEvent> for WsMessage {
    fn from(event: JobEvent) -> Self {
        match event {
            JobEvent::JobUpdated { job_id, status } => WsMessage::JobUpdated { job_id, status },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel_matching() {
        let job_id = ResourceId::new();
        let event = JobEvent::JobUpdated {
            job_id,
            status: JobStatus::Accepted,
        };

        let mut channels = HashSet::new();
        assert!(!event.matches(&channels));

        channels.insert(format!("job:{}", ResourceId::new()));
        assert!(!event.matches(&channels));

        channels.insert(format!("job:{}", job_id));
        assert!(event.matches(&channels));

        let all: HashSet<String> = [ALL_JOBS.to_string()].into();
        assert!(event.matches(&all));
    }

    #[test]
    fn test_job_updated_wire_shape() {
        let job_id: ResourceId = "0190b6a0-7c1e-7000-8000-00000000000a".parse().unwrap();
        let msg = WsMessage::from(JobEvent::JobUpdated {
            job_id,
            status: JobStatus::InProgress,
        });
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "job_updated");
        assert_eq!(json["job_id"], "0190b6a0-7c1e-7000-8000-00000000000a");
        assert_eq!(json["status"], "in_progress");
    }
}
