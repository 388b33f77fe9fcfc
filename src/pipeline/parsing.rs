use super::model::{Session, initialize_model, to_nchw};
use crate::error::{Error, Result};
use crate::segment::FaceParser;
use crate::shapes::LabelMap;
use image::imageops::{FilterType, resize};
use image::{GrayImage, Luma, RgbImage};
use ndarray::{ArrayView3, Axis};
use ort::value::Tensor;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{Level, span, trace};

const SIZE: u32 = 512;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// CelebAMask-HQ part names, in network output order.
pub const PARTS: [&str; 19] = [
    "background",
    "skin",
    "l_brow",
    "r_brow",
    "l_eye",
    "r_eye",
    "eye_g",
    "l_ear",
    "r_ear",
    "ear_r",
    "nose",
    "mouth",
    "u_lip",
    "l_lip",
    "neck",
    "neck_l",
    "cloth",
    "hair",
    "hat",
];

/// BiSeNet face parser.
///
/// Model input: Nx3x512x512 ImageNet-normalized image.
/// Model output: Nx19x512x512 part logits.
pub struct BiSeNetParser {
    model: Session,
    codes: BTreeMap<i32, String>,
}

impl BiSeNetParser {
    pub fn new(model_file_path: &Path, threads: usize) -> Result<BiSeNetParser> {
        Ok(BiSeNetParser {
            model: initialize_model(model_file_path, threads)?,
            codes: part_codes(),
        })
    }
}

fn part_codes() -> BTreeMap<i32, String> {
    PARTS
        .iter()
        .enumerate()
        .map(|(code, name)| (code as i32, name.to_string()))
        .collect()
}

impl FaceParser for BiSeNetParser {
    fn codes(&self) -> &BTreeMap<i32, String> {
        &self.codes
    }

    fn parse(&self, images: &[&RgbImage]) -> Result<Vec<LabelMap>> {
        let span = span!(Level::DEBUG, "face_parser", n = images.len());
        let _guard = span.enter();

        if images.is_empty() {
            return Ok(Vec::new());
        }

        let batch = to_nchw(images, SIZE, |c, v| (v as f32 / 255. - MEAN[c]) / STD[c]);
        let input = Tensor::from_array(batch)?;
        let outputs = self.model.run(ort::inputs!["input" => input]?)?;
        let logits = outputs["output"].try_extract_tensor::<f32>()?;
        let logits = logits.into_dimensionality::<ndarray::Ix4>()?;
        if logits.len_of(Axis(0)) != images.len() {
            return Err(Error::StageOutput {
                expected: images.len(),
                actual: logits.len_of(Axis(0)),
            });
        }
        trace!(shape = ?logits.shape(), "parser output");

        Ok(images
            .iter()
            .zip(logits.outer_iter())
            .map(|(img, logits)| resize_labels(&argmax(logits), img.dimensions()))
            .collect())
    }
}

/// Per-pixel index of the largest logit of a `channels x h x w` volume.
fn argmax(logits: ArrayView3<f32>) -> LabelMap {
    let (_, h, w) = logits.dim();
    LabelMap::from_shape_fn((h, w), |(y, x)| {
        let mut best = 0;
        for c in 1..logits.len_of(Axis(0)) {
            if logits[[c, y, x]] > logits[[best, y, x]] {
                best = c;
            }
        }
        best as i32
    })
}

fn resize_labels(labels: &LabelMap, (width, height): (u32, u32)) -> LabelMap {
    let (h, w) = labels.dim();
    if (w as u32, h as u32) == (width, height) {
        return labels.clone();
    }
    let gray = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([labels[[y as usize, x as usize]].clamp(0, u8::MAX as i32) as u8])
    });
    let resized = resize(&gray, width, height, FilterType::Nearest);
    LabelMap::from_shape_fn((height as usize, width as usize), |(y, x)| {
        resized.get_pixel(x as u32, y as u32)[0] as i32
    })
}
