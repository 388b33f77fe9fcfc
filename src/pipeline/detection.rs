use super::model::{Session, initialize_model};
use crate::error::{Error, Result};
use crate::face::BoundingBoxFinder;
use crate::shapes::{PointF32, Rect};
use anchors::{NUM_ANCHORS, gen_anchors};
use image::RgbImage;
use image::imageops::{FilterType, resize};
use ndarray::{Array4, ArrayView2};
use ort::session::SessionOutputs;
use ort::value::Tensor;
use std::path::Path;
use tracing::{Level, span, trace};

mod anchors;

const WIDTH: u32 = 128;
const HEIGHT: u32 = 128;
const MIN_SCORE: f32 = 0.5;
const MAX_OVERLAP: f32 = 30.;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bounds: Rect,
    pub confidence: f32,
}

/// BlazeFace short-range detector.
///
/// Model input: 1x128x128x3 f32 image in [-1, 1].
/// Model output:
/// - `classificators`: 896 raw scores, one per anchor
/// - `regressors`: 896x16 values, the first 4 being the box center offset
///   and size in input pixels relative to the anchor. The remaining 12 are
///   keypoints and are not used here.
pub struct BlazeFaceFinder {
    model: Session,
    anchors: Vec<PointF32>,
}

impl BlazeFaceFinder {
    pub fn new(model_file_path: &Path, threads: usize) -> Result<BlazeFaceFinder> {
        Ok(BlazeFaceFinder {
            model: initialize_model(model_file_path, threads)?,
            anchors: gen_anchors(),
        })
    }

    /// All faces above the score threshold, overlapping boxes suppressed.
    pub fn detect(&self, img: &RgbImage) -> Result<Vec<Detection>> {
        let span = span!(Level::DEBUG, "face_detector");
        let _guard = span.enter();

        let input = Tensor::from_array(to_input(img))?;
        let outputs = self.model.run(ort::inputs!["input" => input]?)?;
        self.extract_results(outputs, img.width(), img.height())
    }

    fn extract_results(
        &self,
        outputs: SessionOutputs,
        input_width: u32,
        input_height: u32,
    ) -> Result<Vec<Detection>> {
        let regressors = outputs["regressors"].try_extract_tensor::<f32>()?;
        let classificators = outputs["classificators"].try_extract_tensor::<f32>()?;

        let scores: Vec<f32> = classificators.iter().copied().collect();
        let regressors = regressors
            .to_shape((scores.len(), regressors.len() / scores.len().max(1)))?
            .to_owned();

        decode(
            regressors.view(),
            &scores,
            &self.anchors,
            input_width,
            input_height,
        )
    }
}

impl BoundingBoxFinder for BlazeFaceFinder {
    fn find(&self, img: &RgbImage) -> Result<Option<Rect>> {
        Ok(largest(&self.detect(img)?))
    }
}

fn to_input(img: &RgbImage) -> Array4<f32> {
    let resized = resize(img, WIDTH, HEIGHT, FilterType::Triangle);
    Array4::from_shape_fn((1, HEIGHT as usize, WIDTH as usize, 3), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 127.5 - 1.
    })
}

fn decode(
    regressors: ArrayView2<f32>,
    scores: &[f32],
    anchors: &[PointF32],
    input_width: u32,
    input_height: u32,
) -> Result<Vec<Detection>> {
    if scores.len() != NUM_ANCHORS || regressors.nrows() != NUM_ANCHORS {
        return Err(Error::DimensionMismatch {
            what: "face detector output",
            expected: NUM_ANCHORS,
            actual: scores.len().min(regressors.nrows()),
        });
    }
    if regressors.ncols() < 4 {
        return Err(Error::DimensionMismatch {
            what: "face detector regressors",
            expected: 16,
            actual: regressors.ncols(),
        });
    }

    let mut results: Vec<Detection> = Vec::new();
    for ((res, raw), anchor) in regressors.rows().into_iter().zip(scores).zip(anchors) {
        let confidence = sigmoid_stable(*raw);
        if confidence <= MIN_SCORE {
            continue;
        }

        let cx = (res[0] / WIDTH as f32 + anchor.x) * input_width as f32;
        let cy = (res[1] / HEIGHT as f32 + anchor.y) * input_height as f32;
        let w = res[2] / WIDTH as f32 * input_width as f32;
        let h = res[3] / HEIGHT as f32 * input_height as f32;
        let bounds = Rect::new(
            (cy - h / 2.) as i32,
            (cy + h / 2.) as i32,
            (cx - w / 2.) as i32,
            (cx + w / 2.) as i32,
        );

        let mut better_found = false;
        if let Some(i) = results
            .iter()
            .position(|d| d.bounds.overlap_pct(&bounds) > MAX_OVERLAP)
        {
            if results[i].confidence > confidence {
                better_found = true;
            } else {
                results.swap_remove(i);
            }
        }
        if !better_found {
            results.push(Detection { bounds, confidence });
        }
    }

    trace!("Detected {} faces", results.len());
    Ok(results)
}

fn largest(detections: &[Detection]) -> Option<Rect> {
    detections
        .iter()
        .map(|d| d.bounds)
        .max_by_key(|b| b.area())
}

fn sigmoid_stable(x: f32) -> f32 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        x.exp() / (1. + x.exp())
    }
}
