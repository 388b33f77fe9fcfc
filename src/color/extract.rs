use super::conversion::{lab8_to_rgb, rgb_to_lab8, scaled_to_lab};
use crate::cluster::{ClusterOrder, Clustering};
use crate::shapes::{Mask, quantile_sorted};
use image::RgbImage;
use ndarray::Array2;
use palette::Lab;
use tracing::trace;

const WEISZFELD_ITERATIONS: usize = 200;
const WEISZFELD_EPS: f64 = 1e-5;

/// Summarises the colors of a masked region as a list of RGB colors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ColorExtractor {
    Mean,
    #[default]
    Median,
    GeometricMedian,
    /// Per-cluster medians, ranked by `ordering`.
    Clustering {
        clustering: Clustering,
        ordering: ClusterOrder,
    },
    /// Mean of the per-cluster medians.
    MeanClustering { clustering: Clustering },
}

pub(crate) fn masked_pixels(img: &RgbImage, mask: &Mask) -> Vec<[u8; 3]> {
    mask.indexed_iter()
        .filter(|(_, on)| **on)
        .filter_map(|((y, x), _)| img.get_pixel_checked(x as u32, y as u32))
        .map(|p| p.0)
        .collect()
}

/// 8-bit Lab values of the pixels; all statistics below run on these.
fn to_lab8(pixels: &[[u8; 3]]) -> Vec<[f64; 3]> {
    pixels
        .iter()
        .map(|p| rgb_to_lab8(*p).map(f64::from))
        .collect()
}

fn to_rows(colors: &[[f64; 3]]) -> Array2<u8> {
    let rgb: Vec<[u8; 3]> = colors
        .iter()
        .map(|c| lab8_to_rgb(c.map(|v| v.round_ties_even().clamp(0., 255.) as u8)))
        .collect();
    Array2::from_shape_fn((rgb.len(), 3), |(i, c)| rgb[i][c])
}

fn mean(points: &[[f64; 3]]) -> [f64; 3] {
    let n = points.len() as f64;
    let mut acc = [0f64; 3];
    for p in points {
        for c in 0..3 {
            acc[c] += p[c];
        }
    }
    acc.map(|v| v / n)
}

fn median(points: &[[f64; 3]]) -> [f64; 3] {
    let mut out = [0f64; 3];
    for (c, o) in out.iter_mut().enumerate() {
        let mut channel: Vec<f32> = points.iter().map(|p| p[c] as f32).collect();
        channel.sort_by(f32::total_cmp);
        *o = quantile_sorted(&channel, 0.5).unwrap_or_default() as f64;
    }
    out
}

fn geometric_median(points: &[[f64; 3]]) -> [f64; 3] {
    let mut estimate = mean(points);

    for _ in 0..WEISZFELD_ITERATIONS {
        let mut num = [0f64; 3];
        let mut denom = 0f64;
        for p in points {
            let d = ((p[0] - estimate[0]).powi(2)
                + (p[1] - estimate[1]).powi(2)
                + (p[2] - estimate[2]).powi(2))
            .sqrt();
            // sitting on a sample
            if d < WEISZFELD_EPS {
                return estimate;
            }
            for c in 0..3 {
                num[c] += p[c] / d;
            }
            denom += 1. / d;
        }
        if denom == 0. {
            break;
        }

        let next = num.map(|v| v / denom);
        let shift = (0..3).map(|c| (next[c] - estimate[c]).abs()).fold(0., f64::max);
        estimate = next;
        if shift < WEISZFELD_EPS {
            break;
        }
    }
    estimate
}

fn cluster_medians(
    points: &[[f64; 3]],
    clustering: &Clustering,
    ordering: ClusterOrder,
) -> Vec<[f64; 3]> {
    let lab: Vec<Lab> = points
        .iter()
        .map(|p| scaled_to_lab(p.map(|v| v as f32)))
        .collect();
    let Some(fit) = clustering.fit(&lab) else {
        trace!(pixels = points.len(), "can't fit clustering");
        return Vec::new();
    };

    let members = fit.members();
    ordering
        .order(&fit)
        .into_iter()
        .map(|label| {
            let cluster: Vec<[f64; 3]> = members[label].iter().map(|i| points[*i]).collect();
            median(&cluster)
        })
        .collect()
}

impl ColorExtractor {
    /// Default clustering extractor with the given algorithm, darkest first.
    pub fn clustering(clustering: Clustering) -> ColorExtractor {
        ColorExtractor::Clustering {
            clustering,
            ordering: ClusterOrder::FirstChannel,
        }
    }

    /// Colors of the pixels under `mask`, shape `(n, 3)`; `n == 0` when
    /// nothing is selected.
    pub fn extract(&self, img: &RgbImage, mask: &Mask) -> Array2<u8> {
        self.extract_from_pixels(&masked_pixels(img, mask))
    }

    /// Statistics are taken on 8-bit Lab values and rounded before going back to RGB.
    pub fn extract_from_pixels(&self, pixels: &[[u8; 3]]) -> Array2<u8> {
        if pixels.is_empty() {
            return Array2::zeros((0, 3));
        }

        let points = to_lab8(pixels);
        let colors = match self {
            ColorExtractor::Mean => vec![mean(&points)],
            ColorExtractor::Median => vec![median(&points)],
            ColorExtractor::GeometricMedian => vec![geometric_median(&points)],
            ColorExtractor::Clustering {
                clustering,
                ordering,
            } => cluster_medians(&points, clustering, *ordering),
            ColorExtractor::MeanClustering { clustering } => {
                let medians = cluster_medians(&points, clustering, ClusterOrder::Numerical);
                if medians.is_empty() {
                    Vec::new()
                } else {
                    vec![mean(&medians)]
                }
            }
        };
        to_rows(&colors)
    }
}
