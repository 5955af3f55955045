use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Upload lifecycle
    UploadStarted {
        game_id: String,
        asset_id: String,
        owner_id: String,
        /// Caller-declared size, used for progress.
        size_hint: u64,
    },
    UploadCompleted {
        game_id: String,
        asset_id: String,
        size_bytes: u64,
        /// Transfer attempts used, including the successful one.
        attempts: u32,
        duration_ms: u64,
    },
    UploadFailed {
        game_id: String,
        asset_id: String,
        attempts: u32,
        error: String,
    },
    UploadCancelled {
        game_id: String,
        asset_id: String,
    },
    TranscodeSubmitFailed {
        asset_id: String,
        error: String,
    },

    // Processing
    AssetStateChanged {
        asset_id: String,
        from_state: String,
        to_state: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // Clip timeline
    ClipCreated {
        clip_id: String,
        asset_id: String,
        start_time: f64,
        end_time: f64,
        visibility: String,
    },
    ClipUpdated {
        clip_id: String,
        asset_id: String,
    },
    ClipDeleted {
        clip_id: String,
        asset_id: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::UploadStarted { .. } => "upload_started",
            Self::UploadCompleted { .. } => "upload_completed",
            Self::UploadFailed { .. } => "upload_failed",
            Self::UploadCancelled { .. } => "upload_cancelled",
            Self::TranscodeSubmitFailed { .. } => "transcode_submit_failed",
            Self::AssetStateChanged { .. } => "asset_state_changed",
            Self::ClipCreated { .. } => "clip_created",
            Self::ClipUpdated { .. } => "clip_updated",
            Self::ClipDeleted { .. } => "clip_deleted",
        }
    }

    /// The asset this event concerns, if any
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            Self::UploadStarted { asset_id, .. }
            | Self::UploadCompleted { asset_id, .. }
            | Self::UploadFailed { asset_id, .. }
            | Self::UploadCancelled { asset_id, .. }
            | Self::TranscodeSubmitFailed { asset_id, .. }
            | Self::AssetStateChanged { asset_id, .. }
            | Self::ClipCreated { asset_id, .. }
            | Self::ClipUpdated { asset_id, .. }
            | Self::ClipDeleted { asset_id, .. } => Some(asset_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// The game this event concerns, if carried
    pub fn game_id(&self) -> Option<&str> {
        match self {
            Self::UploadStarted { game_id, .. }
            | Self::UploadCompleted { game_id, .. }
            | Self::UploadFailed { game_id, .. }
            | Self::UploadCancelled { game_id, .. } => Some(game_id),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub asset_id: Option<String>,
    pub game_id: Option<String>,
    pub data: AuditEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_events_have_no_asset() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.asset_id(), None);
        assert_eq!(event.game_id(), None);
    }

    #[test]
    fn test_upload_event_ids() {
        let event = AuditEvent::UploadFailed {
            game_id: "game-7".to_string(),
            asset_id: "asset-1".to_string(),
            attempts: 3,
            error: "connection reset".to_string(),
        };
        assert_eq!(event.event_type(), "upload_failed");
        assert_eq!(event.asset_id(), Some("asset-1"));
        assert_eq!(event.game_id(), Some("game-7"));
    }

    #[test]
    fn test_state_change_serialization() {
        let event = AuditEvent::AssetStateChanged {
            asset_id: "asset-1".to_string(),
            from_state: "processing".to_string(),
            to_state: "failed".to_string(),
            reason: Some("processing timeout".to_string()),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "asset_state_changed");
        assert_eq!(json["reason"], "processing timeout");

        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_state_change_skips_missing_reason() {
        let event = AuditEvent::AssetStateChanged {
            asset_id: "a".to_string(),
            from_state: "pending".to_string(),
            to_state: "processing".to_string(),
            reason: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("reason"));
    }
}
