//! WebSocket support for live upload and processing updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use filmroom_core::{Clip, ProcessingState, VideoAsset};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients for real-time updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Transfer progress of a game's upload, 0-100.
    UploadProgress { game_id: String, percent: u8 },
    /// An asset changed processing state.
    AssetUpdate {
        asset_id: String,
        game_id: String,
        state: ProcessingState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure_reason: Option<String>,
    },
    /// A clip was created, updated or deleted.
    ClipChanged {
        clip_id: String,
        asset_id: String,
        /// "created", "updated" or "deleted"
        action: String,
    },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            WsMessage::UploadProgress { .. } => "upload_progress",
            WsMessage::AssetUpdate { .. } => "asset_update",
            WsMessage::ClipChanged { .. } => "clip_changed",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers is not an error
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    pub fn upload_progress(&self, game_id: &str, percent: u8) {
        self.broadcast(WsMessage::UploadProgress {
            game_id: game_id.to_string(),
            percent,
        });
    }

    pub fn asset_updated(&self, asset: &VideoAsset) {
        self.broadcast(WsMessage::AssetUpdate {
            asset_id: asset.id.clone(),
            game_id: asset.game_id.clone(),
            state: asset.state,
            failure_reason: asset.failure_reason.clone(),
        });
    }

    pub fn clip_changed(&self, clip: &Clip, action: &str) {
        self.broadcast(WsMessage::ClipChanged {
            clip_id: clip.id.clone(),
            asset_id: clip.asset_id.clone(),
            action: action.to_string(),
        });
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately.
        heartbeat.tick().await;

        loop {
            let msg = tokio::select! {
                result = rx.recv() => match result {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged, skipped {} messages", n);
                        WS_LAG_EVENTS.inc();
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                },
            };

            WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize WsMessage: {}", e),
            }
        }
    });

    // Clients only listen; inbound traffic is drained until close.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => debug!("Ignoring client message: {}", text),
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(WsMessage::UploadProgress {
            game_id: "g1".to_string(),
            percent: 42,
        })
        .unwrap();
        assert_eq!(json["type"], "upload_progress");
        assert_eq!(json["percent"], 42);

        let json = serde_json::to_value(WsMessage::AssetUpdate {
            asset_id: "a1".to_string(),
            game_id: "g1".to_string(),
            state: ProcessingState::Failed,
            failure_reason: Some("processing timeout".to_string()),
        })
        .unwrap();
        assert_eq!(json["type"], "asset_update");
        assert_eq!(json["state"], "failed");
        assert_eq!(json["failure_reason"], "processing timeout");
    }

    #[tokio::test]
    async fn test_subscribers_receive_broadcasts() {
        let broadcaster = WsBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        broadcaster.upload_progress("g1", 50);
        assert_eq!(
            rx.recv().await.unwrap(),
            WsMessage::UploadProgress {
                game_id: "g1".to_string(),
                percent: 50
            }
        );
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        WsBroadcaster::default().upload_progress("g1", 10);
    }
}
