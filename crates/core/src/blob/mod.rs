//! Blob transfer: streams raw bytes to durable storage.
//!
//! The `BlobStore` trait is the seam to the external blob storage service.
//! `FsBlobStore` is a filesystem-backed implementation that writes to a
//! temporary `.part` file and renames on success, so a failed or cancelled
//! transfer never leaves a complete-looking blob behind.

mod error;
mod fs_store;
mod traits;
mod types;

pub use error::BlobError;
pub use fs_store::FsBlobStore;
pub use traits::BlobStore;
pub use types::{BlobLocation, ByteStream, SignedUrl, TransferProgress};
