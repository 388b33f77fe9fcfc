use crate::error::{Error, Result};
use image::RgbImage;
use image::imageops::{FilterType, resize};
use ndarray::Array4;
use ort::execution_providers;
use ort::session::builder::GraphOptimizationLevel;
pub use ort::session::Session;
use std::path::Path;
use tracing::debug;

fn builder(threads: usize) -> Result<ort::session::builder::SessionBuilder> {
    ort::init()
        .with_execution_providers([execution_providers::XNNPACKExecutionProvider::default().build()])
        .commit()?;

    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(threads.max(1))?)
}

pub fn initialize_model(model_file_path: &Path, threads: usize) -> Result<Session> {
    debug!(model = %model_file_path.display(), threads, "loading model");
    if !model_file_path.is_file() {
        return Err(Error::MissingModel(model_file_path.to_path_buf()));
    }
    Ok(builder(threads)?.commit_from_file(model_file_path)?)
}

pub fn initialize_model_from_memory(model: &[u8], threads: usize) -> Result<Session> {
    debug!(bytes = model.len(), threads, "loading model from memory");
    Ok(builder(threads)?.commit_from_memory(model)?)
}

/// Resize every image to `size` x `size` and stack them into an NCHW batch,
/// mapping each `(channel, value)` through `normalize`.
pub fn to_nchw(images: &[&RgbImage], size: u32, normalize: impl Fn(usize, u8) -> f32) -> Array4<f32> {
    let side = size as usize;
    let mut batch = Array4::zeros((images.len(), 3, side, side));
    for (mut out, img) in batch.outer_iter_mut().zip(images) {
        let resized = if img.dimensions() == (size, size) {
            (*img).clone()
        } else {
            resize(*img, size, size, FilterType::Triangle)
        };
        for (x, y, px) in resized.enumerate_pixels() {
            for c in 0..3 {
                out[[c, y as usize, x as usize]] = normalize(c, px[c]);
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn nchw_layout() {
        let a = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let b = RgbImage::from_pixel(8, 8, Rgb([40, 50, 60]));
        let batch = to_nchw(&[&a, &b], 4, |c, v| v as f32 + c as f32 * 1000.);
        assert_eq!(batch.dim(), (2, 3, 4, 4));
        assert_eq!(batch[[0, 0, 1, 2]], 10.);
        assert_eq!(batch[[0, 2, 3, 3]], 2030.);
        assert_eq!(batch[[1, 1, 0, 0]], 1050.);
    }

    #[test]
    fn empty_batch() {
        let batch = to_nchw(&[], 16, |_, v| v as f32);
        assert_eq!(batch.dim(), (0, 3, 16, 16));
    }
}
