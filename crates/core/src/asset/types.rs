//! Video asset data types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::AssetError;
use crate::transcode::TranscodeOutput;

/// Playback quality of a transcoded variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    /// Untouched source rendition.
    #[serde(rename = "original")]
    Original,
    /// 1920x1080
    #[serde(rename = "1080p")]
    P1080,
    /// 1280x720
    #[serde(rename = "720p")]
    P720,
}

impl Quality {
    /// Every quality a variant may be stored under.
    pub const ALL: [Quality; 3] = [Quality::Original, Quality::P1080, Quality::P720];

    /// Returns the quality label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Original => "original",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of an asset's transcode job.
///
/// Transitions only move forward: `Pending -> Processing -> {Completed | Failed}`.
/// `Pending` may also jump straight to a terminal state when the first
/// observation of the job is already final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingState {
    /// Returns the state as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            ProcessingState::Pending => 0,
            ProcessingState::Processing => 1,
            ProcessingState::Completed | ProcessingState::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` goes strictly forward.
    pub fn can_transition_to(&self, next: ProcessingState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingState {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingState::Pending),
            "processing" => Ok(ProcessingState::Processing),
            "completed" => Ok(ProcessingState::Completed),
            "failed" => Ok(ProcessingState::Failed),
            other => Err(AssetError::Database(format!(
                "unknown processing state: {}",
                other
            ))),
        }
    }
}

/// Registry record for one uploaded video and its derived artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: String,
    pub owner_id: String,
    pub game_id: String,
    /// Blob key of the raw upload.
    pub raw_location: String,
    /// Size of the raw upload in bytes.
    pub size_bytes: u64,
    /// Playback variants; populated only once `Completed`.
    #[serde(default)]
    pub variants: BTreeMap<Quality, String>,
    /// Thumbnail locations in order; populated only once `Completed`.
    #[serde(default)]
    pub thumbnails: Vec<String>,
    pub state: ProcessingState,
    /// Set only when `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Footage duration, reported by the transcode job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoAsset {
    /// Whether the asset reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Duration usable for bounding clips; only trusted once processing completed.
    pub fn known_duration(&self) -> Option<f64> {
        match self.state {
            ProcessingState::Completed => self.duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            _ => None,
        }
    }

    /// Returns a copy with `update` merged in, enforcing the lifecycle rules.
    ///
    /// Fields left `None` in the update keep their current value. A state change
    /// must move forward, and artifacts/failure reason must agree with the
    /// resulting state.
    pub fn merged(&self, update: &AssetUpdate) -> Result<VideoAsset, AssetError> {
        let mut next = self.clone();

        if let Some(state) = update.state {
            if state != self.state && !self.state.can_transition_to(state) {
                return Err(AssetError::InvalidTransition {
                    asset_id: self.id.clone(),
                    from: self.state,
                    to: state,
                });
            }
            next.state = state;
        }
        if let Some(ref variants) = update.variants {
            next.variants = variants.clone();
        }
        if let Some(ref thumbnails) = update.thumbnails {
            next.thumbnails = thumbnails.clone();
        }
        if let Some(ref reason) = update.failure_reason {
            next.failure_reason = Some(reason.clone());
        }
        if let Some(duration) = update.duration_secs {
            next.duration_secs = Some(duration);
        }

        next.check_invariants()?;
        next.updated_at = Utc::now();
        Ok(next)
    }

    fn check_invariants(&self) -> Result<(), AssetError> {
        let has_artifacts = !self.variants.is_empty() || !self.thumbnails.is_empty();
        if has_artifacts && self.state != ProcessingState::Completed {
            return Err(AssetError::Invariant(format!(
                "asset {} has artifacts while {}",
                self.id, self.state
            )));
        }
        if self.failure_reason.is_some() && self.state != ProcessingState::Failed {
            return Err(AssetError::Invariant(format!(
                "asset {} has a failure reason while {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

/// Request to register a newly uploaded video.
#[derive(Debug, Clone)]
pub struct CreateAssetRequest {
    /// Pre-generated id (the upload key already embeds it).
    pub id: String,
    pub owner_id: String,
    pub game_id: String,
    pub raw_location: String,
    pub size_bytes: u64,
}

/// Partial update merged into an existing asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetUpdate {
    pub state: Option<ProcessingState>,
    pub variants: Option<BTreeMap<Quality, String>>,
    pub thumbnails: Option<Vec<String>>,
    pub failure_reason: Option<String>,
    pub duration_secs: Option<f64>,
}

impl AssetUpdate {
    /// Move to `Processing`.
    pub fn processing() -> Self {
        Self {
            state: Some(ProcessingState::Processing),
            ..Default::default()
        }
    }

    /// Move to `Completed` with the job's artifacts populated together.
    pub fn completed(output: TranscodeOutput) -> Self {
        Self {
            state: Some(ProcessingState::Completed),
            variants: Some(output.variants),
            thumbnails: Some(output.thumbnails),
            failure_reason: None,
            duration_secs: output.duration_secs,
        }
    }

    /// Move to `Failed` with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: Some(ProcessingState::Failed),
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_asset() -> VideoAsset {
        VideoAsset {
            id: "asset-1".to_string(),
            owner_id: "coach-1".to_string(),
            game_id: "game-1".to_string(),
            raw_location: "raw/game-1/asset-1/film.mp4".to_string(),
            size_bytes: 1024,
            variants: BTreeMap::new(),
            thumbnails: vec![],
            state: ProcessingState::Pending,
            failure_reason: None,
            duration_secs: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_forward_transitions_only() {
        use ProcessingState::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_quality_labels() {
        assert_eq!(Quality::P1080.as_str(), "1080p");
        assert_eq!(serde_json::to_string(&Quality::P720).unwrap(), "\"720p\"");
        assert_eq!(Quality::ALL.len(), 3);
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            ProcessingState::Pending,
            ProcessingState::Processing,
            ProcessingState::Completed,
            ProcessingState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<ProcessingState>().unwrap(), state);
        }
        assert!("archived".parse::<ProcessingState>().is_err());
    }

    #[test]
    fn test_merge_completed_populates_artifacts() {
        let asset = pending_asset();
        let mut variants = BTreeMap::new();
        variants.insert(Quality::P720, "v/720p.mp4".to_string());

        let merged = asset
            .merged(&AssetUpdate::completed(TranscodeOutput {
                variants: variants.clone(),
                thumbnails: vec!["t/0.jpg".to_string()],
                duration_secs: Some(3600.0),
            }))
            .unwrap();

        assert_eq!(merged.state, ProcessingState::Completed);
        assert_eq!(merged.variants, variants);
        assert_eq!(merged.known_duration(), Some(3600.0));
        // Untouched fields survive the merge.
        assert_eq!(merged.raw_location, asset.raw_location);
    }

    #[test]
    fn test_merge_rejects_backwards_transition() {
        let mut asset = pending_asset();
        asset.state = ProcessingState::Processing;

        let err = asset
            .merged(&AssetUpdate {
                state: Some(ProcessingState::Pending),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidTransition { .. }));
    }

    #[test]
    fn test_merge_rejects_artifacts_before_completion() {
        let asset = pending_asset();
        let err = asset
            .merged(&AssetUpdate {
                thumbnails: Some(vec!["t/0.jpg".to_string()]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AssetError::Invariant(_)));
    }

    #[test]
    fn test_known_duration_requires_completion() {
        let mut asset = pending_asset();
        asset.duration_secs = Some(120.0);
        assert_eq!(asset.known_duration(), None);
    }
}
