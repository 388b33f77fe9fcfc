use super::model::{Session, initialize_model_from_memory};
use crate::error::{Error, Result};
use crate::sampler::ConditionalSampler;
use ndarray::{Array2, ArrayView2, Axis, Ix2, concatenate};
use ort::value::Tensor;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::{Level, span, trace};

/// Exported conditional generator network run on `[z, y]` rows.
///
/// Training happens outside of this crate, so [`ConditionalSampler::fit`]
/// is not available.
pub struct OnnxGenerator {
    model: Session,
    bytes: Vec<u8>,
    latent_size: usize,
}

/// Latent rows for `n` samples; the same `random_state` gives the same rows.
pub(crate) fn latent(n: usize, latent_size: usize, random_state: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(random_state);
    Array2::from_shape_simple_fn((n, latent_size), || rng.sample::<f32, _>(StandardNormal))
}

impl OnnxGenerator {
    pub fn from_bytes(bytes: Vec<u8>, latent_size: usize, threads: usize) -> Result<OnnxGenerator> {
        Ok(OnnxGenerator {
            model: initialize_model_from_memory(&bytes, threads)?,
            bytes,
            latent_size,
        })
    }

    pub fn latent_size(&self) -> usize {
        self.latent_size
    }

    fn io_names(&self) -> Result<(&str, &str)> {
        match (self.model.inputs.first(), self.model.outputs.first()) {
            (Some(input), Some(output)) => Ok((input.name.as_str(), output.name.as_str())),
            _ => Err(Error::Unsupported("generator without inputs or outputs")),
        }
    }
}

impl ConditionalSampler for OnnxGenerator {
    fn fit(&mut self, _x: ArrayView2<f32>, _y: ArrayView2<f32>) -> Result<()> {
        Err(Error::Unsupported("fitting an exported generator"))
    }

    fn sample(&self, y: ArrayView2<f32>, random_state: u64) -> Result<Array2<f32>> {
        let span = span!(Level::DEBUG, "generator", n = y.nrows());
        let _guard = span.enter();

        let z = latent(y.nrows(), self.latent_size, random_state);
        let g_in = concatenate(Axis(1), &[z.view(), y.view()])?;
        trace!(shape = ?g_in.shape(), "generator input");

        let (input_name, output_name) = self.io_names()?;
        let input = Tensor::from_array(g_in)?;
        let outputs = self.model.run(ort::inputs![input_name => input]?)?;
        let x = outputs[output_name]
            .try_extract_tensor::<f32>()?
            .into_dimensionality::<Ix2>()?
            .to_owned();
        if x.nrows() != y.nrows() {
            return Err(Error::InconsistentSamples(y.nrows(), x.nrows()));
        }
        Ok(x)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latent_is_seeded() {
        let a = latent(3, 4, 7);
        assert_eq!(a.dim(), (3, 4));
        assert_eq!(a, latent(3, 4, 7));
        assert_ne!(a, latent(3, 4, 8));
        assert!(a.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn latent_is_standard_normal() {
        let z = latent(1, 4000, 3);
        let n = z.len() as f32;
        let mean = z.sum() / n;
        let var = z.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 0.1, "mean {mean}");
        assert!((0.9..1.1).contains(&var), "var {var}");
    }
}
