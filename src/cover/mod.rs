//! Cover image ingestion and compression
//!
//! Decodes an uploaded image, bounds its dimensions, flattens it onto white
//! and encodes it as a JPEG under a byte budget. Storing the result is the
//! caller's job.

pub mod ingestor;
pub mod ladder;
pub mod mock;
pub mod naming;

pub use ingestor::{target_dimensions, CoverImageIngestor};
pub use ladder::{EncodeAttempt, QualityLadder, SearchOutcome, SearchStrategy};
pub use mock::MockCoverProcessor;
pub use naming::{cover_filename, is_generated_name, sanitize_base_name, NamingPolicy};

use crate::upload::UploadedAsset;
use crate::Result;
use async_trait::async_trait;

pub const COVER_CONTENT_TYPE: &str = "image/jpeg";

/// A compressed cover ready to be handed to a store.
#[derive(Debug, Clone)]
pub struct CompressedCoverImage {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub attempts: usize,
    /// False when even the floor quality exceeded the budget.
    pub within_budget: bool,
}

impl CompressedCoverImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn content_type(&self) -> &'static str {
        COVER_CONTENT_TYPE
    }
}

#[async_trait]
pub trait CoverService: Send + Sync {
    async fn process_cover(&self, upload: &UploadedAsset) -> Result<CompressedCoverImage>;
}
