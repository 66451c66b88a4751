//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not decode image: {0}")]
    DecodeFailure(String),

    #[error("Unsupported image dimensions: {width}x{height}")]
    UnsupportedDimensions { width: u32, height: u32 },

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cover ingestion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// True for failures caused by the uploaded bytes themselves.
    pub fn is_bad_image(&self) -> bool {
        matches!(
            self,
            Self::DecodeFailure(_) | Self::UnsupportedDimensions { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
