use crate::error::Result;
use crate::shapes::{Rect, crop, safe_rect, squareify};
use image::RgbImage;
use image::imageops::{FilterType, resize};
use std::sync::Arc;
use tracing::{Level, span, trace};

/// Locates the face to work on.
pub trait BoundingBoxFinder: Send + Sync {
    /// Largest face in `img`, `None` when there is none.
    fn find(&self, img: &RgbImage) -> Result<Option<Rect>>;
}

impl<F: BoundingBoxFinder + ?Sized> BoundingBoxFinder for Arc<F> {
    fn find(&self, img: &RgbImage) -> Result<Option<Rect>> {
        (**self).find(img)
    }
}

/// Cuts a fixed-size face image out of a frame.
pub trait FaceExtractor: Send + Sync {
    fn extract(&self, img: &RgbImage, bounds: Rect) -> Result<RgbImage>;
}

/// Square crop around the (enlarged) face box, resized to `output_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleFaceExtractor {
    pub output_size: u32,
    pub bb_scale: f64,
}

impl Default for SimpleFaceExtractor {
    fn default() -> Self {
        SimpleFaceExtractor {
            output_size: 512,
            bb_scale: 1.5,
        }
    }
}

impl SimpleFaceExtractor {
    pub fn new(output_size: u32, bb_scale: f64) -> SimpleFaceExtractor {
        SimpleFaceExtractor {
            output_size,
            bb_scale,
        }
    }

    /// Region of `img` the face crop is taken from.
    pub fn crop_rect(&self, img: &RgbImage, bounds: Rect) -> Result<Rect> {
        let scaled = squareify(bounds.scale(self.bb_scale, None));
        safe_rect(scaled, img.dimensions(), true)
    }
}

impl FaceExtractor for SimpleFaceExtractor {
    fn extract(&self, img: &RgbImage, bounds: Rect) -> Result<RgbImage> {
        let span = span!(Level::DEBUG, "face_extractor");
        let _guard = span.enter();

        let rect = self.crop_rect(img, bounds)?;
        trace!(?bounds, ?rect, "face crop");
        let face = crop(img, rect);
        Ok(resize(
            &face,
            self.output_size,
            self.output_size,
            FilterType::Triangle,
        ))
    }
}
