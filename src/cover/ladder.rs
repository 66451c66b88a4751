//! Quality ladder and the search over it.
//!
//! The encode loop is expressed as a lazy sequence of [`EncodeAttempt`]s so
//! the strategy that consumes it can change without touching ingestion.

use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fmt;
use std::str::FromStr;

/// Descending JPEG qualities tried in search of an output under budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityLadder {
    pub start: u8,
    pub floor: u8,
    pub step: u8,
}

impl QualityLadder {
    pub const fn new(start: u8, floor: u8, step: u8) -> Self {
        Self { start, floor, step }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start == 0 || self.start > 100 || self.floor == 0 || self.floor > 100 {
            return Err(Error::Config(format!(
                "Quality ladder bounds must be within 1-100 (start {}, floor {})",
                self.start, self.floor
            )));
        }
        if self.floor > self.start {
            return Err(Error::Config(format!(
                "Quality floor {} is above start {}",
                self.floor, self.start
            )));
        }
        if self.step == 0 {
            return Err(Error::Config("Quality step must be positive".to_string()));
        }
        Ok(())
    }

    /// Qualities from `start` down to `floor`. The last rung is always `floor`.
    pub fn rungs(&self) -> Rungs {
        Rungs {
            next: Some(self.start),
            floor: self.floor,
            step: self.step.max(1),
        }
    }
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self::new(85, 50, 5)
    }
}

pub struct Rungs {
    next: Option<u8>,
    floor: u8,
    step: u8,
}

impl Iterator for Rungs {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let current = self.next?;
        self.next = if current <= self.floor {
            None
        } else {
            Some(current.saturating_sub(self.step).max(self.floor))
        };
        Some(current)
    }
}

/// One encoding of the raster at a given quality.
#[derive(Debug, Clone)]
pub struct EncodeAttempt {
    pub quality: u8,
    pub bytes: Vec<u8>,
}

impl EncodeAttempt {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn encode_jpeg(raster: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        encoder.encode_image(raster)?;
    }
    Ok(bytes)
}

/// Lazily encode `raster` at each rung of `ladder`.
pub fn encode_attempts(
    raster: &RgbImage,
    ladder: QualityLadder,
) -> impl Iterator<Item = Result<EncodeAttempt>> + '_ {
    ladder.rungs().map(move |quality| {
        encode_jpeg(raster, quality).map(|bytes| EncodeAttempt { quality, bytes })
    })
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub attempt: EncodeAttempt,
    /// Number of encodes performed.
    pub attempts: usize,
    pub within_budget: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Walk the ladder top-down and stop at the first fit.
    #[default]
    Linear,
    /// Binary search for the highest fitting rung. Assumes size shrinks with quality.
    Bisect,
}

impl SearchStrategy {
    pub fn search(
        &self,
        raster: &RgbImage,
        ladder: QualityLadder,
        budget: usize,
    ) -> Result<SearchOutcome> {
        match self {
            Self::Linear => linear_search(raster, ladder, budget),
            Self::Bisect => bisect_search(raster, ladder, budget),
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "bisect" | "binary" => Ok(Self::Bisect),
            other => Err(Error::Config(format!(
                "Unknown search strategy '{}'. Expected: linear, bisect",
                other
            ))),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Bisect => write!(f, "bisect"),
        }
    }
}

fn linear_search(raster: &RgbImage, ladder: QualityLadder, budget: usize) -> Result<SearchOutcome> {
    let mut attempts = 0;
    let mut last = None;

    for attempt in encode_attempts(raster, ladder) {
        let attempt = attempt?;
        attempts += 1;
        if attempt.len() <= budget {
            return Ok(SearchOutcome {
                attempt,
                attempts,
                within_budget: true,
            });
        }
        last = Some(attempt);
    }

    last.map(|attempt| SearchOutcome {
        attempt,
        attempts,
        within_budget: false,
    })
    .ok_or_else(|| Error::Invariant("Quality ladder yielded no rungs".to_string()))
}

fn bisect_search(raster: &RgbImage, ladder: QualityLadder, budget: usize) -> Result<SearchOutcome> {
    let rungs: Vec<u8> = ladder.rungs().collect();
    let floor_index = rungs.len().saturating_sub(1);

    let (mut lo, mut hi) = (0, rungs.len());
    let mut attempts = 0;
    let mut best = None;
    let mut floor_miss = None;

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let bytes = encode_jpeg(raster, rungs[mid])?;
        attempts += 1;
        let attempt = EncodeAttempt {
            quality: rungs[mid],
            bytes,
        };

        if attempt.len() <= budget {
            best = Some(attempt);
            hi = mid;
        } else {
            if mid == floor_index {
                floor_miss = Some(attempt);
            }
            lo = mid + 1;
        }
    }

    match (best, floor_miss) {
        (Some(attempt), _) => Ok(SearchOutcome {
            attempt,
            attempts,
            within_budget: true,
        }),
        (None, Some(attempt)) => Ok(SearchOutcome {
            attempt,
            attempts,
            within_budget: false,
        }),
        (None, None) => Err(Error::Invariant(
            "Bisect search ended without probing the floor".to_string(),
        )),
    }
}
