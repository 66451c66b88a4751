//! Cover filename derivation.
//!
//! Generated names look like `{unix_millis}_{base}[_{suffix}].jpg` and only
//! ever contain `[A-Za-z0-9_-]` before the extension.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const FALLBACK_BASE: &str = "cover";
const MAX_BASE_LEN: usize = 100;

/// How the uniqueness component of a cover filename is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingPolicy {
    /// Timestamp and base name only. Two uploads sharing a base name within
    /// the same millisecond collide.
    Timestamp,
    /// Random token from a v4 UUID.
    #[default]
    Random,
    /// Prefix of the SHA-256 of the encoded bytes.
    ContentHash,
}

impl FromStr for NamingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(Self::Timestamp),
            "random" => Ok(Self::Random),
            "content-hash" | "content_hash" | "hash" => Ok(Self::ContentHash),
            other => Err(Error::Config(format!(
                "Unknown naming policy '{}'. Expected: timestamp, random, content-hash",
                other
            ))),
        }
    }
}

impl fmt::Display for NamingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp => write!(f, "timestamp"),
            Self::Random => write!(f, "random"),
            Self::ContentHash => write!(f, "content-hash"),
        }
    }
}

/// Strip directories and the extension, then replace anything outside
/// `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_base_name(original: &str) -> String {
    let file = original.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(original);
    let stem = match file.rfind('.') {
        Some(pos) => &file[..pos],
        None => file,
    };

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_BASE_LEN)
        .collect();

    if sanitized.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        sanitized
    }
}

pub fn cover_filename(
    policy: NamingPolicy,
    original: &str,
    encoded: &[u8],
    now: DateTime<Utc>,
) -> String {
    let stamp = now.timestamp_millis().max(0);
    let base = sanitize_base_name(original);

    match policy {
        NamingPolicy::Timestamp => format!("{}_{}.jpg", stamp, base),
        NamingPolicy::Random => {
            let token = Uuid::new_v4().simple().to_string();
            format!("{}_{}_{}.jpg", stamp, base, &token[..12])
        }
        NamingPolicy::ContentHash => {
            let digest = format!("{:x}", Sha256::digest(encoded));
            format!("{}_{}_{}.jpg", stamp, base, &digest[..16])
        }
    }
}

/// True when `name` has the shape produced by [`cover_filename`].
pub fn is_generated_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".jpg") else {
        return false;
    };
    let Some((stamp, rest)) = stem.split_once('_') else {
        return false;
    };
    !stamp.is_empty()
        && stamp.chars().all(|c| c.is_ascii_digit())
        && !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
