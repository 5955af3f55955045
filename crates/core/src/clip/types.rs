//! Clip data types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::store::ClipError;

/// Who may see a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Whole team.
    #[default]
    Team,
    /// Only the assigned players.
    Player,
    /// Coaching staff only.
    Coach,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Team => "team",
            Visibility::Player => "player",
            Visibility::Coach => "coach",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "team" => Ok(Visibility::Team),
            "player" => Ok(Visibility::Player),
            "coach" => Ok(Visibility::Coach),
            other => Err(ClipError::Validation(format!(
                "unknown visibility: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ClipError::Validation(format!("unknown priority: {}", other))),
        }
    }
}

/// A time-range annotation over a video asset.
///
/// Clips on the same asset are independent; overlapping ranges are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    /// Annotated asset. Not owned by the clip.
    pub asset_id: String,
    pub game_id: String,
    /// Seconds from the start of the footage.
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub assigned_player_ids: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_type: Option<String>,
    pub priority: Priority,
    #[serde(default)]
    pub coach_notes: String,
    #[serde(default)]
    pub learning_objective: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clip {
    /// Length of the clip in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether the two time ranges share any instant.
    pub fn overlaps(&self, other: &Clip) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    /// Check the clip's invariants.
    ///
    /// `asset_duration` bounds the end time when the footage length is known.
    pub fn validate(&self, asset_duration: Option<f64>) -> Result<(), ClipError> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(ClipError::Validation(
                "start and end times must be finite".to_string(),
            ));
        }
        if self.start_time < 0.0 {
            return Err(ClipError::Validation(format!(
                "start time must not be negative (got {})",
                self.start_time
            )));
        }
        if self.end_time <= self.start_time {
            return Err(ClipError::Validation(format!(
                "end time {} must be after start time {}",
                self.end_time, self.start_time
            )));
        }
        if let Some(duration) = asset_duration {
            if self.end_time > duration {
                return Err(ClipError::Validation(format!(
                    "end time {} is past the end of the footage ({}s)",
                    self.end_time, duration
                )));
            }
        }
        if self.title.trim().is_empty() {
            return Err(ClipError::Validation("title is required".to_string()));
        }
        if self.visibility == Visibility::Player && self.assigned_player_ids.is_empty() {
            return Err(ClipError::Validation(
                "player visibility requires at least one assigned player".to_string(),
            ));
        }
        Ok(())
    }

    /// Trim free-text set members and drop empty ones.
    pub(crate) fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.tags = clean_set(std::mem::take(&mut self.tags));
        self.assigned_player_ids = clean_set(std::mem::take(&mut self.assigned_player_ids));
        self.description = clean_optional(self.description.take());
        self.play_type = clean_optional(self.play_type.take());
    }
}

fn clean_set(values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Input for creating a clip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateClipRequest {
    pub asset_id: String,
    /// Must match the asset's game when given; inherited from the asset otherwise.
    #[serde(default)]
    pub game_id: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub assigned_player_ids: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub play_type: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub coach_notes: String,
    #[serde(default)]
    pub learning_objective: String,
}

impl CreateClipRequest {
    pub fn new(asset_id: impl Into<String>, start_time: f64, end_time: f64, title: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            start_time,
            end_time,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_players<I, S>(mut self, players: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assigned_player_ids = players.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update for a clip. `None` leaves a field untouched.
///
/// `description` and `play_type` are doubly optional: `Some(None)` clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipUpdate {
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub assigned_player_ids: Option<BTreeSet<String>>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub play_type: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub coach_notes: Option<String>,
    #[serde(default)]
    pub learning_objective: Option<String>,
}

/// Distinguishes an explicit `null` from an absent field.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ClipUpdate {
    /// Apply to `clip`, returning the merged copy. Does not validate.
    pub fn apply_to(&self, clip: &Clip) -> Clip {
        let mut next = clip.clone();
        if let Some(start_time) = self.start_time {
            next.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            next.end_time = end_time;
        }
        if let Some(ref title) = self.title {
            next.title = title.clone();
        }
        if let Some(ref description) = self.description {
            next.description = description.clone();
        }
        if let Some(visibility) = self.visibility {
            next.visibility = visibility;
        }
        if let Some(ref players) = self.assigned_player_ids {
            next.assigned_player_ids = players.clone();
        }
        if let Some(ref tags) = self.tags {
            next.tags = tags.clone();
        }
        if let Some(ref play_type) = self.play_type {
            next.play_type = play_type.clone();
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(ref notes) = self.coach_notes {
            next.coach_notes = notes.clone();
        }
        if let Some(ref objective) = self.learning_objective {
            next.learning_objective = objective.clone();
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(start: f64, end: f64) -> Clip {
        let now = Utc::now();
        Clip {
            id: "c1".to_string(),
            asset_id: "a1".to_string(),
            game_id: "g1".to_string(),
            start_time: start,
            end_time: end,
            title: "Zone blitz".to_string(),
            description: None,
            visibility: Visibility::Team,
            assigned_player_ids: BTreeSet::new(),
            tags: BTreeSet::new(),
            play_type: None,
            priority: Priority::Medium,
            coach_notes: String::new(),
            learning_objective: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_time_bounds() {
        assert!(clip(0.0, 5.0).validate(None).is_ok());
        assert!(clip(10.0, 5.0).validate(None).is_err());
        assert!(clip(5.0, 5.0).validate(None).is_err());
        assert!(clip(-1.0, 5.0).validate(None).is_err());
        assert!(clip(0.0, f64::NAN).validate(None).is_err());
        assert!(clip(0.0, f64::INFINITY).validate(None).is_err());
    }

    #[test]
    fn test_duration_bound_only_when_known() {
        assert!(clip(100.0, 7200.0).validate(None).is_ok());
        assert!(clip(100.0, 7200.0).validate(Some(5400.0)).is_err());
        assert!(clip(100.0, 5400.0).validate(Some(5400.0)).is_ok());
    }

    #[test]
    fn test_player_visibility_requires_players() {
        let mut c = clip(1.0, 2.0);
        c.visibility = Visibility::Player;
        assert!(matches!(c.validate(None), Err(ClipError::Validation(_))));

        c.assigned_player_ids.insert("p7".to_string());
        assert!(c.validate(None).is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut c = clip(1.0, 2.0);
        c.title = "   ".to_string();
        assert!(c.validate(None).is_err());
    }

    #[test]
    fn test_normalize_trims_sets() {
        let mut c = clip(1.0, 2.0);
        c.tags = ["  red zone ", "", " ", "red zone"]
            .into_iter()
            .map(String::from)
            .collect();
        c.play_type = Some("  ".to_string());
        c.normalize();

        assert_eq!(c.tags.len(), 1);
        assert!(c.tags.contains("red zone"));
        assert!(c.play_type.is_none());
    }

    #[test]
    fn test_overlap() {
        assert!(clip(0.0, 10.0).overlaps(&clip(5.0, 15.0)));
        assert!(!clip(0.0, 10.0).overlaps(&clip(10.0, 15.0)));
    }

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: ClipUpdate =
            serde_json::from_str(r#"{"description": null, "title": "Screen"}"#).unwrap();
        assert_eq!(update.description, Some(None));
        assert!(update.play_type.is_none());

        let mut original = clip(1.0, 2.0);
        original.description = Some("old".to_string());
        original.play_type = Some("pass".to_string());
        let merged = update.apply_to(&original);

        assert_eq!(merged.title, "Screen");
        assert!(merged.description.is_none());
        assert_eq!(merged.play_type.as_deref(), Some("pass"));
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateClipRequest = serde_json::from_str(
            r#"{"asset_id": "a1", "start_time": 1.5, "end_time": 4.0, "title": "Sweep"}"#,
        )
        .unwrap();
        assert_eq!(request.visibility, Visibility::Team);
        assert_eq!(request.priority, Priority::Medium);
        assert!(request.tags.is_empty());
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("Player".parse::<Visibility>().unwrap(), Visibility::Player);
        assert!("everyone".parse::<Visibility>().is_err());
    }
}
