use crate::cluster::{ClusterOrder, Clustering};
use crate::color::image_to_lab;
use crate::error::{Error, Result};
use crate::segment::{ClusteringSegmenter, SegmentInput};
use crate::shapes::{Mask, Point, circle_mask, quantile_sorted};
use crate::stage::Stage;
use image::RgbImage;
use imageproc::edges::canny;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use ndarray::{Array3, Zip};
use std::f32::consts::PI;
use tracing::trace;

/// Iris as a band of lightness-ranked color clusters inside the eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringIris {
    pub clustering: Clustering,
    pub ordering: ClusterOrder,
    pub lower_cut: f32,
    pub upper_cut: f32,
}

impl Default for ClusteringIris {
    fn default() -> Self {
        ClusteringIris {
            clustering: Clustering::kmeans(11),
            ordering: ClusterOrder::FirstChannel,
            lower_cut: 0.1,
            upper_cut: 0.6,
        }
    }
}

/// Iris as the pixels between two lightness quantiles of the eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdIris {
    pub lower_quantile: f32,
    pub upper_quantile: f32,
}

impl Default for ThresholdIris {
    fn default() -> Self {
        ThresholdIris {
            lower_quantile: 0.1,
            upper_quantile: 0.5,
        }
    }
}

/// Iris as the strongest circle found by a gradient Hough vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughIris {
    pub canny_low: f32,
    pub canny_high: f32,
    pub min_radius: u32,
    /// Largest radius as a fraction of the image height.
    pub max_radius_ratio: f32,
    pub pupil_ratio: f32,
    /// Minimum share of the circumference backed by edge votes.
    pub min_score: f32,
}

impl Default for HoughIris {
    fn default() -> Self {
        HoughIris {
            canny_low: 20.,
            canny_high: 60.,
            min_radius: 2,
            max_radius_ratio: 0.5,
            pupil_ratio: 0.2,
            min_score: 0.2,
        }
    }
}

/// Refines an eye mask to the iris.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IrisExtractor {
    Clustering(ClusteringIris),
    Threshold(ThresholdIris),
    HoughCircle(HoughIris),
}

impl Default for IrisExtractor {
    fn default() -> Self {
        IrisExtractor::Clustering(ClusteringIris::default())
    }
}

fn check_mask(img: &RgbImage, mask: &Mask) -> Result<()> {
    let (h, w) = mask.dim();
    if (w as u32, h as u32) != img.dimensions() {
        return Err(Error::MaskShape {
            expected: img.dimensions(),
            actual: (w as u32, h as u32),
        });
    }
    Ok(())
}

impl IrisExtractor {
    /// Iris pixels within `eye_mask`; all `false` when no iris can be told apart.
    pub fn extract(&self, img: &RgbImage, eye_mask: &Mask) -> Result<Mask> {
        check_mask(img, eye_mask)?;
        match self {
            IrisExtractor::Clustering(params) => params.extract(img, eye_mask),
            IrisExtractor::Threshold(params) => Ok(params.extract(img, eye_mask)),
            IrisExtractor::HoughCircle(params) => Ok(params.extract(img, eye_mask)),
        }
    }
}

impl ClusteringIris {
    fn extract(&self, img: &RgbImage, eye_mask: &Mask) -> Result<Mask> {
        let segmenter = ClusteringSegmenter::new(self.clustering, self.ordering, None, -1);
        let ranks = segmenter.call(SegmentInput::masked(img, eye_mask))?;

        let k = ranks.iter().copied().max().unwrap_or(-1) + 1;
        if k <= 1 {
            return Ok(ranks.mapv(|_| false));
        }

        let all_ranks: Vec<f32> = (0..k).map(|r| r as f32).collect();
        let lower = quantile_sorted(&all_ranks, self.lower_cut).unwrap_or(0.);
        let upper = quantile_sorted(&all_ranks, self.upper_cut).unwrap_or(0.);
        trace!(k, lower, upper, "iris cluster band");

        Ok(ranks.mapv(|r| r != -1 && r as f32 >= lower && r as f32 <= upper))
    }
}

impl ThresholdIris {
    fn extract(&self, img: &RgbImage, eye_mask: &Mask) -> Mask {
        let lab = image_to_lab(img);
        let mut lightness: Vec<f32> = Zip::from(&lab)
            .and(eye_mask)
            .fold(Vec::new(), |mut acc, px, on| {
                if *on {
                    acc.push(px.l);
                }
                acc
            });
        lightness.sort_by(f32::total_cmp);

        let (Some(lower), Some(upper)) = (
            quantile_sorted(&lightness, self.lower_quantile),
            quantile_sorted(&lightness, self.upper_quantile),
        ) else {
            return eye_mask.mapv(|_| false);
        };

        Zip::from(&lab)
            .and(eye_mask)
            .map_collect(|px, on| *on && px.l >= lower && px.l <= upper)
    }
}

impl HoughIris {
    /// Best `(center, radius, score)` over all radii.
    fn strongest_circle(&self, img: &RgbImage) -> Option<(Point, i32, f32)> {
        let gray = image::imageops::grayscale(img);
        let (w, h) = gray.dimensions();
        let max_radius = (self.max_radius_ratio * h as f32) as u32;
        if max_radius < self.min_radius.max(1) {
            return None;
        }

        let edges = canny(&gray, self.canny_low, self.canny_high);
        let gx = horizontal_sobel(&gray);
        let gy = vertical_sobel(&gray);

        let radii = self.min_radius.max(1)..=max_radius;
        let mut votes = Array3::<u32>::zeros((radii.clone().count(), h as usize, w as usize));
        for (x, y, e) in edges.enumerate_pixels() {
            if e[0] == 0 {
                continue;
            }
            let dx = gx.get_pixel(x, y)[0] as f32;
            let dy = gy.get_pixel(x, y)[0] as f32;
            let norm = (dx * dx + dy * dy).sqrt();
            if norm == 0. {
                continue;
            }
            let (ux, uy) = (dx / norm, dy / norm);

            for (ri, r) in radii.clone().enumerate() {
                for sign in [-1f32, 1.] {
                    let cx = (x as f32 + sign * ux * r as f32).round();
                    let cy = (y as f32 + sign * uy * r as f32).round();
                    if cx >= 0. && cy >= 0. && (cx as u32) < w && (cy as u32) < h {
                        votes[[ri, cy as usize, cx as usize]] += 1;
                    }
                }
            }
        }

        let mut best: Option<(Point, i32, f32)> = None;
        for ((ri, cy, cx), v) in votes.indexed_iter() {
            if *v == 0 {
                continue;
            }
            let r = self.min_radius.max(1) + ri as u32;
            let score = *v as f32 / (2. * PI * r as f32);
            if best.is_none_or(|(_, _, s)| score > s) {
                best = Some((Point::new(cx as i32, cy as i32), r as i32, score));
            }
        }
        best.filter(|(_, _, score)| *score >= self.min_score)
    }

    fn extract(&self, img: &RgbImage, eye_mask: &Mask) -> Mask {
        if !eye_mask.iter().any(|on| *on) {
            return eye_mask.mapv(|_| false);
        }
        let Some((center, radius, score)) = self.strongest_circle(img) else {
            return eye_mask.mapv(|_| false);
        };
        trace!(?center, radius, score, "iris circle");

        let dims = img.dimensions();
        let iris = circle_mask(dims, center, radius);
        let pupil = circle_mask(dims, center, (self.pupil_ratio * radius as f32) as i32);
        Zip::from(eye_mask)
            .and(&iris)
            .and(&pupil)
            .map_collect(|e, i, p| *e && *i && !*p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::empty_mask;
    use image::Rgb;

    fn extractors() -> Vec<IrisExtractor> {
        vec![
            IrisExtractor::Clustering(ClusteringIris::default()),
            IrisExtractor::Threshold(ThresholdIris::default()),
            IrisExtractor::HoughCircle(HoughIris::default()),
        ]
    }

    #[test]
    fn solid_eye_has_no_clustered_iris() -> Result<()> {
        let img = RgbImage::from_pixel(40, 40, Rgb([90, 60, 40]));
        let eye = Mask::from_elem((40, 40), true);
        let iris = IrisExtractor::default().extract(&img, &eye)?;
        assert!(iris.iter().all(|v| !*v));

        let hough = IrisExtractor::HoughCircle(HoughIris::default()).extract(&img, &eye)?;
        assert!(hough.iter().all(|v| !*v));
        Ok(())
    }

    #[test]
    fn empty_eye_mask() -> Result<()> {
        let img = RgbImage::from_fn(30, 30, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 100]));
        for extractor in extractors() {
            let iris = extractor.extract(&img, &empty_mask(30, 30))?;
            assert!(iris.iter().all(|v| !*v), "{extractor:?}");
        }
        Ok(())
    }

    #[test]
    fn hough_skips_voting_without_eye() -> Result<()> {
        // a vote volume for this size would not fit in memory
        let img = RgbImage::from_fn(2048, 2048, |x, _| Rgb([(x % 256) as u8, 90, 60]));
        let iris = IrisExtractor::HoughCircle(HoughIris::default())
            .extract(&img, &empty_mask(2048, 2048))?;
        assert_eq!(iris.dim(), (2048, 2048));
        assert!(iris.iter().all(|v| !*v));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_mask() {
        let img = RgbImage::new(10, 10);
        assert!(matches!(
            IrisExtractor::default().extract(&img, &empty_mask(5, 10)),
            Err(Error::MaskShape { .. })
        ));
    }

    // white sclera, brown iris disc, black pupil
    fn drawn_eye() -> RgbImage {
        RgbImage::from_fn(60, 60, |x, y| {
            let d = ((x as f32 - 30.).powi(2) + (y as f32 - 30.).powi(2)).sqrt();
            if d <= 4. {
                Rgb([5, 5, 5])
            } else if d <= 14. {
                Rgb([110, 70, 30])
            } else {
                Rgb([240, 240, 235])
            }
        })
    }

    #[test]
    fn clustering_keeps_middle_band() -> Result<()> {
        let img = drawn_eye();
        let eye = Mask::from_elem((60, 60), true);
        let extractor = IrisExtractor::Clustering(ClusteringIris {
            clustering: Clustering::kmeans(3),
            ..ClusteringIris::default()
        });
        let iris = extractor.extract(&img, &eye)?;
        // ranks 0..3, band [0.2, 1.2] keeps rank 1 only
        assert!(iris[[30, 40]]);
        assert!(!iris[[30, 30]]);
        assert!(!iris[[2, 2]]);
        Ok(())
    }

    #[test]
    fn threshold_selects_quantile_band() -> Result<()> {
        let img = RgbImage::from_fn(10, 1, |x, _| {
            let v = (x * 25) as u8;
            Rgb([v, v, v])
        });
        let eye = Mask::from_elem((1, 10), true);
        let iris = IrisExtractor::Threshold(ThresholdIris::default()).extract(&img, &eye)?;
        let selected: Vec<usize> = (0..10).filter(|x| iris[[0, *x]]).collect();
        assert_eq!(selected, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn hough_finds_drawn_iris() -> Result<()> {
        let img = drawn_eye();
        let eye = Mask::from_elem((60, 60), true);
        let iris = IrisExtractor::HoughCircle(HoughIris::default()).extract(&img, &eye)?;
        assert!(iris.iter().any(|v| *v));
        assert!(!iris[[2, 2]]);
        assert!(!iris[[57, 57]]);
        Ok(())
    }
}
