use super::ladder::SearchOutcome;
use super::naming::cover_filename;
use super::{CompressedCoverImage, CoverService};
use crate::config::IngestConfig;
use crate::upload::UploadedAsset;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Limits, Rgb, RgbImage};
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Turns arbitrary uploaded image bytes into a bounded, budgeted JPEG.
#[derive(Debug, Clone, Default)]
pub struct CoverImageIngestor {
    config: IngestConfig,
}

impl CoverImageIngestor {
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest using the configured byte budget.
    pub fn ingest(&self, raw: &[u8], original_filename: &str) -> Result<CompressedCoverImage> {
        self.ingest_with_budget(raw, original_filename, self.config.max_bytes)
    }

    pub fn ingest_with_budget(
        &self,
        raw: &[u8],
        original_filename: &str,
        max_bytes: usize,
    ) -> Result<CompressedCoverImage> {
        if max_bytes == 0 {
            return Err(Error::Config("max_bytes must be positive".to_string()));
        }

        let source = decode(raw, self.config.max_decode_dimension)?;
        let (width, height) = (source.width(), source.height());
        if width == 0 || height == 0 {
            return Err(Error::UnsupportedDimensions { width, height });
        }

        let (target_w, target_h) = target_dimensions(width, height, self.config.max_dimension);
        debug!(
            "Decoded {}x{} cover, target {}x{}",
            width, height, target_w, target_h
        );

        let flat = flatten_onto_white(&source);
        drop(source);
        let raster = if (target_w, target_h) == (width, height) {
            flat
        } else {
            image::imageops::resize(&flat, target_w, target_h, FilterType::Triangle)
        };

        let SearchOutcome {
            attempt,
            attempts,
            within_budget,
        } = self
            .config
            .search
            .search(&raster, self.config.ladder, max_bytes)?;

        if !within_budget {
            warn!(
                "Cover '{}' is {} bytes at floor quality {}, over the {} byte budget; accepting anyway",
                original_filename,
                attempt.len(),
                attempt.quality,
                max_bytes
            );
        }

        let filename = cover_filename(
            self.config.naming,
            original_filename,
            &attempt.bytes,
            Utc::now(),
        );
        info!(
            "Compressed cover {} ({}x{}, quality {}, {} bytes, {} attempt(s))",
            filename,
            target_w,
            target_h,
            attempt.quality,
            attempt.len(),
            attempts
        );

        Ok(CompressedCoverImage {
            filename,
            bytes: attempt.bytes,
            width: target_w,
            height: target_h,
            quality: attempt.quality,
            attempts,
            within_budget,
        })
    }
}

fn decode(raw: &[u8], max_dimension: u32) -> Result<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| Error::DecodeFailure(e.to_string()))?;
    if reader.format().is_none() {
        return Err(Error::DecodeFailure("unrecognized image format".to_string()));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    reader.limits(limits);

    reader
        .decode()
        .map_err(|e| Error::DecodeFailure(e.to_string()))
}

/// Output dimensions with the longer side bounded by `max_dimension`.
///
/// Scales by `min(max/w, max/h)` and floors each side, so the longer side
/// lands exactly on `max_dimension`. Integer arithmetic keeps the floor exact;
/// the shorter side never drops below one pixel.
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let (w, h, max) = (width as u64, height as u64, max_dimension as u64);
    if w >= h {
        (max_dimension, ((h * max) / w).max(1) as u32)
    } else {
        (((w * max) / h).max(1) as u32, max_dimension)
    }
}

/// Composite onto opaque white so transparent pixels do not leak into JPEG.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[async_trait]
impl CoverService for CoverImageIngestor {
    async fn process_cover(&self, upload: &UploadedAsset) -> Result<CompressedCoverImage> {
        let task = tokio::task::spawn_blocking({
            let ingestor = self.clone();
            let bytes = upload.bytes.clone();
            let filename = upload.original_filename.clone();
            move || ingestor.ingest(&bytes, &filename)
        });

        let joined = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => task.await,
        };

        joined.map_err(|e| Error::Invariant(format!("Cover ingestion task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::{is_generated_name, NamingPolicy, SearchStrategy};
    use image::{ImageFormat, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn decoded_dimensions(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_target_dimensions_unchanged_when_within_bound() {
        assert_eq!(target_dimensions(400, 600, 1600), (400, 600));
        assert_eq!(target_dimensions(1600, 1600, 1600), (1600, 1600));
    }

    #[test]
    fn test_target_dimensions_floors_shorter_side() {
        // floor(2000 * 1600 / 3000) = floor(1066.67)
        assert_eq!(target_dimensions(3000, 2000, 1600), (1600, 1066));
        assert_eq!(target_dimensions(2000, 3000, 1600), (1066, 1600));
        assert_eq!(target_dimensions(1601, 1601, 1600), (1600, 1600));
    }

    #[test]
    fn test_target_dimensions_never_zero() {
        assert_eq!(target_dimensions(20000, 3, 1600), (1600, 1));
    }

    #[test]
    fn test_target_dimensions_preserve_aspect() {
        let cases = [
            (3000, 2000),
            (1601, 900),
            (4032, 3024),
            (1000, 5000),
            (2500, 1700),
            (7000, 6999),
        ];
        for (w, h) in cases {
            let (out_w, out_h) = target_dimensions(w, h, 1600);
            assert!(out_w.max(out_h) <= 1600);
            let drift = (out_w as f64 / out_h as f64 - w as f64 / h as f64).abs();
            // Flooring can land exactly on the bound (3000x2000 -> 1600x1066).
            let tolerance = 1.0 / out_w.min(out_h) as f64 + 1e-12;
            assert!(drift <= tolerance, "{}x{} -> {}x{}", w, h, out_w, out_h);
        }
    }

    #[test]
    fn test_small_png_keeps_dimensions_and_exits_first_attempt() {
        let ingestor = CoverImageIngestor::default();
        let png = encode(gradient(400, 600), ImageFormat::Png);

        let cover = ingestor.ingest(&png, "dune.png").unwrap();

        assert_eq!((cover.width, cover.height), (400, 600));
        assert_eq!(decoded_dimensions(&cover.bytes), (400, 600));
        assert_eq!(cover.quality, 85);
        assert_eq!(cover.attempts, 1);
        assert!(cover.within_budget);
        assert!(cover.len() <= 2_097_152);
        assert!(is_generated_name(&cover.filename));
        assert!(cover.filename.contains("_dune_"));
    }

    #[test]
    fn test_large_image_is_downscaled() {
        let ingestor = CoverImageIngestor::default();
        let png = encode(gradient(2400, 1800), ImageFormat::Png);

        let cover = ingestor.ingest(&png, "wide.png").unwrap();

        assert_eq!((cover.width, cover.height), (1600, 1200));
        assert_eq!(decoded_dimensions(&cover.bytes), (1600, 1200));
    }

    #[test]
    fn test_reingesting_output_keeps_dimensions() {
        let ingestor = CoverImageIngestor::default();
        let png = encode(gradient(2400, 1800), ImageFormat::Png);

        let first = ingestor.ingest(&png, "wide.png").unwrap();
        let second = ingestor.ingest(&first.bytes, &first.filename).unwrap();

        assert_eq!((second.width, second.height), (first.width, first.height));
    }

    #[test]
    fn test_unreachable_budget_accepts_floor_quality() {
        let ingestor = CoverImageIngestor::default();
        let png = encode(gradient(64, 64), ImageFormat::Png);

        let cover = ingestor.ingest_with_budget(&png, "tiny.png", 1).unwrap();

        assert_eq!(cover.quality, 50);
        assert_eq!(cover.attempts, 8);
        assert!(!cover.within_budget);
        assert!(!cover.is_empty());
    }

    #[test]
    fn test_bisect_strategy_respects_floor() {
        let config = IngestConfig::default().with_search(SearchStrategy::Bisect);
        let ingestor = CoverImageIngestor::new(config).unwrap();
        let png = encode(gradient(64, 64), ImageFormat::Png);

        let cover = ingestor.ingest_with_budget(&png, "tiny.png", 1).unwrap();

        assert_eq!(cover.quality, 50);
        assert!(cover.attempts <= 4);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let ingestor = CoverImageIngestor::default();
        let png = encode(gradient(8, 8), ImageFormat::Png);

        let err = ingestor.ingest_with_budget(&png, "a.png", 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_transparent_pixels_flatten_to_white() {
        let ingestor = CoverImageIngestor::default();
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0])));
        let png = encode(clear, ImageFormat::Png);

        let cover = ingestor.ingest(&png, "clear.png").unwrap();

        let decoded = image::load_from_memory(&cover.bytes).unwrap().to_rgb8();
        for pixel in decoded.pixels() {
            assert!(pixel.0.iter().all(|&c| c >= 245), "pixel {:?}", pixel);
        }
    }

    #[test]
    fn test_half_transparent_red_blends_with_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128])));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 127, 127]);
    }

    #[test]
    fn test_gif_input_is_accepted() {
        let ingestor = CoverImageIngestor::default();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 48, Rgba([10, 200, 30, 255])));
        let gif = encode(img, ImageFormat::Gif);

        let cover = ingestor.ingest(&gif, "anim.gif").unwrap();
        assert_eq!((cover.width, cover.height), (32, 48));
    }

    #[test]
    fn test_non_image_bytes_fail_to_decode() {
        let ingestor = CoverImageIngestor::default();

        let err = ingestor
            .ingest(b"this is a text file, not a cover", "notes.txt")
            .unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
        assert!(err.is_bad_image());
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let ingestor = CoverImageIngestor::default();
        let png = encode(gradient(64, 64), ImageFormat::Png);

        let err = ingestor.ingest(&png[..png.len() / 2], "cut.png").unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }

    #[test]
    fn test_decode_limit_refuses_oversized_input() {
        let config = IngestConfig {
            max_dimension: 16,
            max_decode_dimension: 32,
            ..IngestConfig::default()
        };
        let ingestor = CoverImageIngestor::new(config).unwrap();
        let png = encode(gradient(64, 8), ImageFormat::Png);

        let err = ingestor.ingest(&png, "big.png").unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }

    #[test]
    fn test_timestamp_naming_policy() {
        let config = IngestConfig::default().with_naming(NamingPolicy::Timestamp);
        let ingestor = CoverImageIngestor::new(config).unwrap();
        let png = encode(gradient(8, 8), ImageFormat::Png);

        let cover = ingestor.ingest(&png, "My Cover!.png").unwrap();
        assert!(cover.filename.ends_with("_My_Cover_.jpg"));
        assert!(is_generated_name(&cover.filename));
    }

    #[tokio::test]
    async fn test_process_cover_runs_off_runtime() {
        let config = IngestConfig::default().with_timeout(Duration::from_secs(30));
        let ingestor = CoverImageIngestor::new(config).unwrap();
        let upload = UploadedAsset::new(
            encode(gradient(40, 30), ImageFormat::Png),
            "async.png",
            "image/png",
        );

        let cover = ingestor.process_cover(&upload).await.unwrap();
        assert_eq!((cover.width, cover.height), (40, 30));
        assert_eq!(cover.content_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_process_cover_propagates_decode_failure() {
        let ingestor = CoverImageIngestor::default();
        let upload = UploadedAsset::new(b"garbage".to_vec(), "x.png", "image/png");

        let err = ingestor.process_cover(&upload).await.unwrap_err();
        assert!(matches!(err, Error::DecodeFailure(_)));
    }

    #[tokio::test]
    async fn test_process_cover_times_out_on_slow_ingest() {
        let limit = Duration::from_nanos(1);
        let ingestor = CoverImageIngestor::new(IngestConfig::default().with_timeout(limit)).unwrap();
        let upload = UploadedAsset::new(
            encode(gradient(3000, 2000), ImageFormat::Png),
            "huge.png",
            "image/png",
        );

        let err = ingestor.process_cover(&upload).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == limit), "{:?}", err);
    }
}
