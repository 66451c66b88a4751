//! Cover image pipeline for a personal book-library tracker
//!
//! Uploaded covers are validated, downscaled, flattened and compressed to a
//! JPEG under a byte budget, then stored so book records can reference them
//! by filename.

pub mod app;
pub mod config;
pub mod cover;
pub mod error;
pub mod models;
pub mod store;
pub mod upload;

pub use error::{Error, Result};
