//! Clip timeline engine.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Clip, ClipError, ClipFilter, ClipStore, ClipUpdate, CreateClipRequest};
use crate::asset::AssetStore;
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;

/// Creates, validates, and queries clips against their assets.
///
/// Every write is validated as a whole before it reaches the store; a rejected
/// write leaves the store untouched. End times are bounded by the footage
/// duration only once the asset's transcode has completed.
pub struct ClipTimeline {
    clips: Arc<dyn ClipStore>,
    assets: Arc<dyn AssetStore>,
    audit: Option<AuditHandle>,
}

impl ClipTimeline {
    pub fn new(clips: Arc<dyn ClipStore>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            clips,
            assets,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn create_clip(&self, request: CreateClipRequest) -> Result<Clip, ClipError> {
        let asset = self
            .assets
            .get(&request.asset_id)?
            .ok_or_else(|| ClipError::AssetNotFound(request.asset_id.clone()))?;

        if let Some(ref game_id) = request.game_id {
            if *game_id != asset.game_id {
                return Err(self.rejected(format!(
                    "asset {} belongs to game {}, not {}",
                    asset.id, asset.game_id, game_id
                )));
            }
        }

        let now = Utc::now();
        let mut clip = Clip {
            id: Uuid::new_v4().to_string(),
            asset_id: asset.id.clone(),
            game_id: asset.game_id.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            title: request.title,
            description: request.description,
            visibility: request.visibility,
            assigned_player_ids: request.assigned_player_ids,
            tags: request.tags,
            play_type: request.play_type,
            priority: request.priority,
            coach_notes: request.coach_notes,
            learning_objective: request.learning_objective,
            created_at: now,
            updated_at: now,
        };
        clip.normalize();
        self.check(&clip, asset.known_duration())?;

        self.clips.insert(&clip)?;
        metrics::CLIP_OPERATIONS.with_label_values(&["create"]).inc();
        info!(
            clip_id = %clip.id,
            asset_id = %clip.asset_id,
            start_time = clip.start_time,
            end_time = clip.end_time,
            "Clip created"
        );
        self.emit(AuditEvent::ClipCreated {
            clip_id: clip.id.clone(),
            asset_id: clip.asset_id.clone(),
            start_time: clip.start_time,
            end_time: clip.end_time,
            visibility: clip.visibility.to_string(),
        });

        Ok(clip)
    }

    /// Merge `update` into the stored clip and re-validate the result.
    pub fn update_clip(&self, id: &str, update: ClipUpdate) -> Result<Clip, ClipError> {
        let current = self.get_clip(id)?;

        let mut next = update.apply_to(&current);
        next.normalize();
        next.updated_at = Utc::now();

        // An asset removed out from under the clip only loses the duration bound.
        let duration = self
            .assets
            .get(&current.asset_id)?
            .and_then(|asset| asset.known_duration());
        self.check(&next, duration)?;

        self.clips.update(&next)?;
        metrics::CLIP_OPERATIONS.with_label_values(&["update"]).inc();
        debug!(clip_id = %id, "Clip updated");
        self.emit(AuditEvent::ClipUpdated {
            clip_id: next.id.clone(),
            asset_id: next.asset_id.clone(),
        });

        Ok(next)
    }

    /// Delete a clip, returning what was removed.
    pub fn delete_clip(&self, id: &str) -> Result<Clip, ClipError> {
        let clip = self.get_clip(id)?;
        self.clips.delete(id)?;

        metrics::CLIP_OPERATIONS.with_label_values(&["delete"]).inc();
        info!(clip_id = %id, asset_id = %clip.asset_id, "Clip deleted");
        self.emit(AuditEvent::ClipDeleted {
            clip_id: clip.id.clone(),
            asset_id: clip.asset_id.clone(),
        });

        Ok(clip)
    }

    pub fn get_clip(&self, id: &str) -> Result<Clip, ClipError> {
        self.clips
            .get(id)?
            .ok_or_else(|| ClipError::NotFound(id.to_string()))
    }

    pub fn list_clips(&self, filter: &ClipFilter) -> Result<Vec<Clip>, ClipError> {
        self.clips.list(filter)
    }

    pub fn count_clips(&self, filter: &ClipFilter) -> Result<i64, ClipError> {
        self.clips.count(filter)
    }

    fn check(&self, clip: &Clip, asset_duration: Option<f64>) -> Result<(), ClipError> {
        clip.validate(asset_duration).map_err(|e| {
            metrics::CLIP_VALIDATION_FAILURES.inc();
            debug!(asset_id = %clip.asset_id, "Clip rejected: {}", e);
            e
        })
    }

    fn rejected(&self, reason: String) -> ClipError {
        metrics::CLIP_VALIDATION_FAILURES.inc();
        ClipError::Validation(reason)
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.try_emit(event);
        }
    }
}
