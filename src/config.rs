//! Configuration
//!
//! [`IngestConfig`] carries every ingestion tunable explicitly so callers and
//! tests can exercise boundary values. [`Config`] holds deployment settings
//! loaded from the environment.

use crate::cover::{NamingPolicy, QualityLadder, SearchStrategy};
use crate::upload::UploadLimits;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default output byte budget (2 MiB).
pub const DEFAULT_MAX_BYTES: usize = 2 * 1024 * 1024;

/// Default bound on the longer output side, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 1600;

/// Decoder limit per side; inputs beyond this are refused before allocation.
pub const DEFAULT_MAX_DECODE_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub ladder: QualityLadder,
    pub search: SearchStrategy,
    pub naming: NamingPolicy,
    pub max_decode_dimension: u32,
    /// Wall-clock limit for the async wrapper. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            ladder: QualityLadder::default(),
            search: SearchStrategy::default(),
            naming: NamingPolicy::default(),
            max_decode_dimension: DEFAULT_MAX_DECODE_DIMENSION,
            timeout: None,
        }
    }
}

impl IngestConfig {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_search(mut self, search: SearchStrategy) -> Self {
        self.search = search;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_bytes == 0 {
            return Err(Error::Config("max_bytes must be positive".to_string()));
        }
        if self.max_dimension == 0 {
            return Err(Error::Config("max_dimension must be positive".to_string()));
        }
        if self.max_decode_dimension < self.max_dimension {
            return Err(Error::Config(format!(
                "max_decode_dimension ({}) is below max_dimension ({})",
                self.max_decode_dimension, self.max_dimension
            )));
        }
        self.ladder.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(Error::Config(format!(
                "Unknown storage backend '{}'. Expected: local, s3",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    /// Upload covers with the `public-read` canned ACL.
    pub public_read: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub covers_dir: PathBuf,
    pub covers_prefix: String,
    pub public_base_url: String,
    pub s3: Option<S3Settings>,
    pub ingest: IngestConfig,
    pub upload_limits: UploadLimits,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: '{}'", name, raw))),
        None => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let storage_backend = parse_env::<StorageBackend>("STORAGE_BACKEND")?.unwrap_or_default();

        let s3 = if storage_backend == StorageBackend::S3 {
            Some(S3Settings {
                access_key_id: env_var("S3_ACCESS_KEY_ID")
                    .ok_or_else(|| Error::Config("S3_ACCESS_KEY_ID not set".to_string()))?,
                secret_access_key: env_var("S3_SECRET_ACCESS_KEY")
                    .ok_or_else(|| Error::Config("S3_SECRET_ACCESS_KEY not set".to_string()))?,
                endpoint: env_var("S3_ENDPOINT"),
                bucket: env_var("S3_BUCKET").unwrap_or_else(|| "bookshelf".to_string()),
                region: env_var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                public_read: parse_env("S3_PUBLIC_READ")?.unwrap_or(true),
            })
        } else {
            None
        };

        let defaults = IngestConfig::default();
        let ingest = IngestConfig {
            max_bytes: parse_env("COVER_MAX_BYTES")?.unwrap_or(defaults.max_bytes),
            max_dimension: parse_env("COVER_MAX_DIMENSION")?.unwrap_or(defaults.max_dimension),
            naming: parse_env("COVER_NAMING")?.unwrap_or(defaults.naming),
            search: parse_env("COVER_SEARCH")?.unwrap_or(defaults.search),
            timeout: parse_env::<u64>("COVER_TIMEOUT_SECS")?.map(Duration::from_secs),
            ..defaults
        };
        ingest.validate()?;

        let mut upload_limits = UploadLimits::default();
        if let Some(max) = parse_env("MAX_UPLOAD_BYTES")? {
            upload_limits.max_upload_bytes = max;
        }

        Ok(Self {
            storage_backend,
            covers_dir: env_var("COVERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage")),
            covers_prefix: env_var("COVERS_PREFIX").unwrap_or_else(|| "covers".to_string()),
            public_base_url: env_var("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost/storage".to_string()),
            s3,
            ingest,
            upload_limits,
        })
    }
}
