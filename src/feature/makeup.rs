use crate::cluster::{ClusterOrder, Clustering, Knn};
use crate::color::{ColorExtractor, rgb_to_lab_pixel};
use crate::error::Result;
use crate::segment::{ClusteringSegmenter, SegmentInput};
use crate::shapes::{Mask, biggest_contour, contour_area, dilate, fill_contour};
use crate::stage::Stage;
use image::RgbImage;
use ndarray::{Array2, Zip};
use palette::Lab;
use tracing::{Level, span, trace};

/// Finds eyeshadow on the skin ring around the larger eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeshadowShapeExtractor {
    pub skin_color: ColorExtractor,
    pub clustering: Clustering,
    pub classifier: Knn,
    pub outer_eye_factor: f64,
    pub inner_eye_factor: f64,
}

impl Default for EyeshadowShapeExtractor {
    fn default() -> Self {
        EyeshadowShapeExtractor {
            skin_color: ColorExtractor::Median,
            clustering: Clustering::agglomerative(6),
            classifier: Knn::new(3),
            outer_eye_factor: 2.25,
            inner_eye_factor: 0.25,
        }
    }
}

impl EyeshadowShapeExtractor {
    /// Skin pixels around the eye, outside a thin margin hugging it.
    pub fn area_around_eye(&self, skin_mask: &Mask, eyes_mask: &Mask) -> Mask {
        let (h, w) = eyes_mask.dim();
        let contour = biggest_contour(eyes_mask);
        if contour.is_empty() {
            return eyes_mask.mapv(|_| false);
        }
        let eye = fill_contour(&contour, (w as u32, h as u32));
        let side = contour_area(&contour).sqrt();

        // side-k kernels grow the eye by k/2 on each side
        let outer = ((side * self.outer_eye_factor) as usize).max(2);
        let inner = ((side * self.inner_eye_factor) as usize).max(1);
        trace!(outer, inner, "eye ring kernels");

        let outer = dilate(&eye, outer / 2);
        let inner = dilate(&eye, inner / 2);
        Zip::from(&outer)
            .and(&inner)
            .and(skin_mask)
            .map_collect(|o, i, s| *o && !*i && *s)
    }

    pub fn extract(&self, img: &RgbImage, skin_mask: &Mask, eyes_mask: &Mask) -> Result<Mask> {
        let span = span!(Level::DEBUG, "eyeshadow_shape");
        let _guard = span.enter();

        let nothing = eyes_mask.mapv(|_| false);
        let ring = self.area_around_eye(skin_mask, eyes_mask);

        let skin = self.skin_color.extract(img, skin_mask);
        if skin.nrows() == 0 {
            return Ok(nothing);
        }
        let skin_lab = rgb_to_lab_pixel([skin[[0, 0]], skin[[0, 1]], skin[[0, 2]]]);
        let black_lab = rgb_to_lab_pixel([0, 0, 0]);

        let segmenter = ClusteringSegmenter::new(self.clustering, ClusterOrder::Numerical, None, -1);
        let clustered = segmenter.call(SegmentInput::masked(img, &ring))?;

        let mut samples: Vec<Lab> = Vec::new();
        let mut labels: Vec<usize> = Vec::new();
        for ((y, x), label) in clustered.indexed_iter() {
            if *label != -1 {
                samples.push(rgb_to_lab_pixel(img.get_pixel(x as u32, y as u32).0));
                labels.push(*label as usize);
            }
        }
        if samples.is_empty() {
            return Ok(nothing);
        }

        let Some(predicted) = self
            .classifier
            .predict(&samples, &labels, &[skin_lab, black_lab])
        else {
            return Ok(nothing);
        };
        let (skin_cluster, lash_cluster) = (predicted[0] as i32, predicted[1] as i32);
        trace!(skin_cluster, lash_cluster, "dropping clusters");

        Ok(clustered.mapv(|l| l != -1 && l != skin_cluster && l != lash_cluster))
    }
}

/// Eyeshadow band colors, darkest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeshadowColorExtractor {
    pub shape: EyeshadowShapeExtractor,
    pub color: ColorExtractor,
}

impl Default for EyeshadowColorExtractor {
    fn default() -> Self {
        EyeshadowColorExtractor {
            shape: EyeshadowShapeExtractor::default(),
            color: ColorExtractor::clustering(Clustering::kmeans(3)),
        }
    }
}

impl EyeshadowColorExtractor {
    pub fn extract(&self, img: &RgbImage, skin_mask: &Mask, eyes_mask: &Mask) -> Result<Array2<u8>> {
        let area = self.shape.extract(img, skin_mask, eyes_mask)?;
        Ok(self.color.extract(img, &area))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LipstickColorExtractor {
    pub color: ColorExtractor,
}

impl LipstickColorExtractor {
    pub fn extract(&self, img: &RgbImage, lips_mask: &Mask) -> Array2<u8> {
        self.color.extract(img, lips_mask)
    }
}
