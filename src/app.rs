//! Application orchestration for cover uploads.
//!
//! Validates an upload, compresses it, stores it under the cover prefix and
//! keeps book records pointing at objects that actually exist.

use crate::config::{Config, StorageBackend};
use crate::cover::{CompressedCoverImage, CoverImageIngestor, CoverService};
use crate::models::{Book, BookResource};
use crate::store::{check_key, CoverStore, LocalStore, S3Store};
use crate::upload::{UploadLimits, UploadedAsset, COVER_FIELD};
use crate::{Error, Result};
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub attempts: usize,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub upload_limits: UploadLimits,
    pub public_base_url: String,
    pub covers_prefix: String,
    pub retry: RetryPolicy,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            upload_limits: UploadLimits::default(),
            public_base_url: "http://localhost/storage".to_string(),
            covers_prefix: "covers".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AppSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_limits: config.upload_limits.clone(),
            public_base_url: config.public_base_url.clone(),
            covers_prefix: config.covers_prefix.clone(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Coordinates validation, compression and storage of book covers.
pub struct App {
    covers: Box<dyn CoverService>,
    store: Box<dyn CoverStore>,
    settings: AppSettings,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub covers: Box<dyn CoverService>,
    pub store: Box<dyn CoverStore>,
}

impl App {
    pub fn with_services(services: AppServices, settings: AppSettings) -> Self {
        Self {
            covers: services.covers,
            store: services.store,
            settings,
        }
    }

    /// Construct an app from loaded configuration (`Config::from_env`).
    pub async fn new(config: &Config) -> Result<Self> {
        let covers = Box::new(CoverImageIngestor::new(config.ingest.clone())?);

        let store: Box<dyn CoverStore> = match config.storage_backend {
            StorageBackend::Local => {
                info!("Storing covers under {}", config.covers_dir.display());
                Box::new(LocalStore::new(&config.covers_dir))
            }
            StorageBackend::S3 => {
                let settings = config.s3.as_ref().ok_or_else(|| {
                    Error::Config("S3 backend selected without S3 settings".to_string())
                })?;
                info!("Storing covers in bucket {}", settings.bucket);
                Box::new(S3Store::new(settings).await?)
            }
        };

        Ok(Self::with_services(
            AppServices { covers, store },
            AppSettings::from_config(config),
        ))
    }

    pub fn cover_key(&self, filename: &str) -> String {
        let prefix = self.settings.covers_prefix.trim_matches('/');
        if prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", prefix, filename)
        }
    }

    /// Public URL for a stored cover, without checking the store.
    pub fn cover_url(&self, filename: Option<&str>) -> Option<String> {
        filename.map(|name| {
            format!(
                "{}/{}",
                self.settings.public_base_url.trim_end_matches('/'),
                self.cover_key(name)
            )
        })
    }

    /// Like [`App::cover_url`], but returns `None` when the object is gone so
    /// clients render the placeholder.
    pub async fn resolve_cover_url(&self, filename: Option<&str>) -> Result<Option<String>> {
        let Some(name) = filename else {
            return Ok(None);
        };
        let key = self.cover_key(name);
        if let Err(e) = check_key(&key) {
            warn!("Cover {} cannot be served: {}", name, e);
            return Ok(None);
        }
        if self.store.exists(&key).await? {
            Ok(self.cover_url(Some(name)))
        } else {
            warn!("Cover {} is referenced but missing from the store", name);
            Ok(None)
        }
    }

    pub async fn book_resource(&self, book: &Book) -> Result<BookResource> {
        let url = self.resolve_cover_url(book.cover_image.as_deref()).await?;
        Ok(BookResource::from_book(book, url))
    }

    /// Validate and compress an upload without storing it.
    ///
    /// Undecodable images surface as a validation error on the cover field.
    pub async fn process_upload(&self, upload: &UploadedAsset) -> Result<CompressedCoverImage> {
        self.settings.upload_limits.validate(upload)?;

        match self.covers.process_cover(upload).await {
            Ok(cover) => Ok(cover),
            Err(e) if e.is_bad_image() => {
                warn!("Rejected cover '{}': {}", upload.original_filename, e);
                Err(Error::validation(
                    COVER_FIELD,
                    "The cover image could not be read as an image.",
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Compress and store a new cover, returning the stored filename.
    pub async fn upload_cover(&self, upload: &UploadedAsset) -> Result<String> {
        let cover = self.process_upload(upload).await?;
        let key = self.cover_key(&cover.filename);

        self.put_with_retry(&key, &cover.bytes, cover.content_type())
            .await?;
        info!("Stored cover {} ({} bytes)", key, cover.len());

        Ok(cover.filename)
    }

    /// Store the new cover, then drop the old one.
    ///
    /// A failed upload leaves the current cover untouched.
    pub async fn replace_cover(
        &self,
        current: Option<&str>,
        upload: &UploadedAsset,
    ) -> Result<String> {
        let filename = self.upload_cover(upload).await?;

        if let Some(old) = current.filter(|old| *old != filename) {
            if let Err(e) = self.store.delete(&self.cover_key(old)).await {
                warn!("Failed to delete replaced cover {}: {}", old, e);
            }
        }

        Ok(filename)
    }

    pub async fn remove_cover(&self, current: Option<&str>) -> Result<()> {
        if let Some(name) = current {
            let key = self.cover_key(name);
            self.store.delete(&key).await?;
            info!("Deleted cover {}", key);
        }
        Ok(())
    }

    async fn put_with_retry(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let retry_strategy = FixedInterval::new(self.settings.retry.interval)
            .take(self.settings.retry.attempts.saturating_sub(1));
        let store = &self.store;

        Retry::spawn(retry_strategy, move || async move {
            store.put(key, bytes, content_type).await.map_err(|e| {
                warn!("Storing {} failed: {}. Will retry...", key, e);
                e
            })
        })
        .await
        .map_err(|e| {
            error!("Failed to store {} after retries: {}", key, e);
            e
        })
    }
}
