use super::model::{Session, initialize_model, to_nchw};
use crate::error::{Error, Result};
use crate::feature::Embedder;
use image::RgbImage;
use ndarray::{Array2, Ix2};
use ort::value::Tensor;
use std::path::Path;
use tracing::{Level, span};

const SIZE: u32 = 160;
const WIDTH: usize = 512;

/// InceptionResnetV1 (VGGFace2) face embeddings.
pub struct FacenetEmbedder {
    model: Session,
}

impl FacenetEmbedder {
    pub fn new(model_file_path: &Path, threads: usize) -> Result<FacenetEmbedder> {
        Ok(FacenetEmbedder {
            model: initialize_model(model_file_path, threads)?,
        })
    }
}

fn whiten(v: u8) -> f32 {
    (v as f32 - 127.5) / 128.
}

impl Embedder for FacenetEmbedder {
    fn width(&self) -> usize {
        WIDTH
    }

    fn embed(&self, faces: &[&RgbImage]) -> Result<Array2<f32>> {
        let span = span!(Level::DEBUG, "facenet", n = faces.len());
        let _guard = span.enter();

        if faces.is_empty() {
            return Ok(Array2::zeros((0, WIDTH)));
        }

        let input = Tensor::from_array(to_nchw(faces, SIZE, |_, v| whiten(v)))?;
        let outputs = self.model.run(ort::inputs!["input" => input]?)?;
        let embedded = outputs["output"]
            .try_extract_tensor::<f32>()?
            .into_dimensionality::<Ix2>()?
            .to_owned();
        if embedded.nrows() != faces.len() {
            return Err(Error::StageOutput {
                expected: faces.len(),
                actual: embedded.nrows(),
            });
        }
        Ok(embedded)
    }
}
