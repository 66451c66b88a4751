use super::naming::{cover_filename, NamingPolicy};
use super::{CompressedCoverImage, CoverService};
use crate::upload::UploadedAsset;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

/// Returns canned covers without touching the image pipeline.
#[derive(Clone)]
pub struct MockCoverProcessor {
    process_count: Arc<Mutex<usize>>,
    output: Vec<u8>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockCoverProcessor {
    pub fn new() -> Self {
        Self {
            process_count: Arc::new(Mutex::new(0)),
            output: vec![0xFF, 0xD8, 0xFF, 0xD9],
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_output(mut self, output: Vec<u8>) -> Self {
        self.output = output;
        self
    }

    /// Make every call fail as if the upload could not be decoded.
    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_process_count(&self) -> usize {
        *self.process_count.lock().unwrap()
    }
}

impl Default for MockCoverProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverService for MockCoverProcessor {
    async fn process_cover(&self, upload: &UploadedAsset) -> Result<CompressedCoverImage> {
        if *self.should_fail.lock().unwrap() {
            return Err(Error::DecodeFailure("Mock failure".to_string()));
        }

        *self.process_count.lock().unwrap() += 1;

        Ok(CompressedCoverImage {
            filename: cover_filename(
                NamingPolicy::Random,
                &upload.original_filename,
                &self.output,
                Utc::now(),
            ),
            bytes: self.output.clone(),
            width: 1,
            height: 1,
            quality: 85,
            attempts: 1,
            within_budget: true,
        })
    }
}
