//! Upload coordinator: blob transfer, asset registration, transcode hand-off.

mod coordinator;
mod progress;
mod retry;
mod types;

pub use coordinator::{UploadCoordinator, UploadHandle};
pub use retry::RetryPolicy;
pub use types::{
    ByteSource, ProgressCallback, SingleUseSource, UploadError, UploadOutcome, UploadRequest,
};
