//! Clip timeline.
//!
//! A [`Clip`] annotates a time range of a video asset with visibility and
//! player-assignment metadata for film review.

mod sqlite_store;
mod store;
mod timeline;
mod types;

pub use sqlite_store::SqliteClipStore;
pub use store::{ClipError, ClipFilter, ClipStore};
pub use timeline::ClipTimeline;
pub use types::{Clip, ClipUpdate, CreateClipRequest, Priority, Visibility};
