//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the two external collaborators, blob storage and
//! the transcode job service, so the whole ingest and tracking pipeline can
//! run in-process.
//!
//! # Example
//!
//! ```rust,ignore
//! use filmroom_core::testing::{fixtures, MockBlobStore, MockTranscodeService};
//!
//! let blobs = MockBlobStore::new();
//! let transcoder = MockTranscodeService::new();
//!
//! // Script responses
//! blobs.push_failure(BlobError::interrupted("reset")).await;
//! transcoder.complete("asset-1", fixtures::transcode_output("asset-1")).await;
//! ```

mod mock_blob_store;
mod mock_transcode;

pub use mock_blob_store::MockBlobStore;
pub use mock_transcode::MockTranscodeService;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use futures::{stream, StreamExt};

    use crate::asset::{AssetStore, CreateAssetRequest, Quality, VideoAsset};
    use crate::blob::ByteStream;
    use crate::clip::CreateClipRequest;
    use crate::transcode::TranscodeOutput;
    use crate::upload::ByteSource;

    /// A stream of `total` bytes split into chunks of at most `chunk_size`.
    pub fn byte_stream(total: usize, chunk_size: usize) -> ByteStream {
        let chunk_size = chunk_size.max(1);
        let chunks: Vec<Result<Bytes, std::io::Error>> = (0..total)
            .step_by(chunk_size)
            .map(|offset| {
                let len = chunk_size.min(total - offset);
                Ok(Bytes::from(vec![0xAB; len]))
            })
            .collect();
        stream::iter(chunks).boxed()
    }

    /// A replayable source producing [`byte_stream`] on every attempt.
    pub fn byte_source(total: usize, chunk_size: usize) -> Box<dyn ByteSource> {
        Box::new(move || byte_stream(total, chunk_size))
    }

    /// Transcode output with 1080p and 720p variants, five thumbnails, and a
    /// 90 minute duration.
    pub fn transcode_output(asset_id: &str) -> TranscodeOutput {
        let mut variants = BTreeMap::new();
        variants.insert(Quality::P1080, format!("variants/{}/1080p.mp4", asset_id));
        variants.insert(Quality::P720, format!("variants/{}/720p.mp4", asset_id));

        TranscodeOutput {
            variants,
            thumbnails: (0..5)
                .map(|i| format!("thumbs/{}/{}.jpg", asset_id, i))
                .collect(),
            duration_secs: Some(5400.0),
        }
    }

    /// Register a pending asset directly in the store.
    pub fn register_asset(store: &dyn AssetStore, asset_id: &str, game_id: &str) -> VideoAsset {
        store
            .create(CreateAssetRequest {
                id: asset_id.to_string(),
                owner_id: "coach-1".to_string(),
                game_id: game_id.to_string(),
                raw_location: format!("raw/{}/{}/film.mp4", game_id, asset_id),
                size_bytes: 1024,
            })
            .expect("register test asset")
    }

    /// A team-visible clip request.
    pub fn clip_request(asset_id: &str, start_time: f64, end_time: f64) -> CreateClipRequest {
        CreateClipRequest::new(
            asset_id,
            start_time,
            end_time,
            format!("Play at {:.0}s", start_time),
        )
    }
}
