//! Processing status tracker.
//!
//! [`ProcessingTracker`] turns the external transcode job's status into
//! forward-only asset transitions. [`PollSupervisor`] runs one cancellable
//! periodic task per asset on top of it.

mod processing;
mod supervisor;
mod types;

pub use processing::ProcessingTracker;
pub use supervisor::PollSupervisor;
pub use types::{AssetUpdateCallback, PollOutcome, TrackerError, PROCESSING_TIMEOUT_REASON};
