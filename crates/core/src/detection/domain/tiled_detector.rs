use std::sync::Arc;

use crate::detection::domain::detection_merger::merge_overlapping;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::config::DetectionConfig;
use crate::shared::detection::Detection;
use crate::shared::error::StageError;
use crate::shared::frame::Frame;

/// Decorator that slices large crops into overlapping square tiles.
///
/// Crops smaller than one tile in either dimension go to the inner detector
/// in a single pass. Larger crops are covered by tiles at a stride of
/// `tile_size * (1 - overlap)`, with the last tile in each direction aligned
/// to the far edge; detections are mapped back to crop coordinates and
/// seam duplicates are merged.
pub struct TiledDetector {
    inner: Arc<dyn ObjectDetector>,
    tile_size: u32,
    overlap: f64,
    merge_threshold: f64,
}

impl TiledDetector {
    pub fn new(inner: Arc<dyn ObjectDetector>, config: &DetectionConfig) -> Self {
        let overlap = config.overlap.clamp(0.0, 0.9);
        if overlap != config.overlap {
            log::warn!(
                "Tile overlap {} out of range, using {overlap}",
                config.overlap
            );
        }
        Self {
            inner,
            tile_size: config.tile_size.max(1),
            overlap,
            merge_threshold: config.merge_threshold,
        }
    }

    fn stride(&self) -> u32 {
        ((self.tile_size as f64 * (1.0 - self.overlap)).round() as u32).max(1)
    }

    fn detect_tiled(
        &self,
        image: &Frame,
        slot: usize,
        confidence: f64,
    ) -> Result<Vec<Detection>, StageError> {
        let stride = self.stride();
        let xs = tile_origins(image.width(), self.tile_size, stride);
        let ys = tile_origins(image.height(), self.tile_size, stride);
        log::debug!(
            "Tiling {}x{} crop into {} tile(s)",
            image.width(),
            image.height(),
            xs.len() * ys.len()
        );

        let mut all = Vec::new();
        for &y in &ys {
            for &x in &xs {
                let tile = image.crop(x, y, self.tile_size, self.tile_size);
                let found = self.inner.detect(&tile, slot, confidence)?;
                all.extend(
                    found
                        .into_iter()
                        .map(|d| d.translated(x as f64, y as f64)),
                );
            }
        }

        Ok(merge_overlapping(all, self.merge_threshold))
    }
}

impl ObjectDetector for TiledDetector {
    fn detect(
        &self,
        image: &Frame,
        slot: usize,
        confidence: f64,
    ) -> Result<Vec<Detection>, StageError> {
        let mut detections = if image.width() < self.tile_size || image.height() < self.tile_size {
            self.inner.detect(image, slot, confidence)?
        } else {
            self.detect_tiled(image, slot, confidence)?
        };

        detections.retain(|d| d.confidence >= confidence);
        Detection::sort_by_confidence(&mut detections);
        Ok(detections)
    }
}

/// Tile start offsets along one axis of `length ≥ tile` pixels.
///
/// Steps by `stride`; the final tile is placed flush with the far edge so
/// no pixels are left uncovered.
pub fn tile_origins(length: u32, tile: u32, stride: u32) -> Vec<u32> {
    let mut origins = Vec::new();
    let mut pos = 0u32;
    loop {
        if pos + tile >= length {
            origins.push(length.saturating_sub(tile));
            break;
        }
        origins.push(pos);
        pos += stride;
    }
    origins
}
