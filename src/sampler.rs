use crate::error::{Error, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, span};

const SCORE_SEED: u64 = 0;

/// Generative model of `x` conditioned on `y`.
pub trait ConditionalSampler: Send + Sync {
    fn fit(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<()>;

    /// One sample of `x` per row of `y`. Same `random_state`, same output.
    fn sample(&self, y: ArrayView2<f32>, random_state: u64) -> Result<Array2<f32>>;

    /// Negated energy distance between `x` and samples drawn for `y`; 0 means
    /// indistinguishable.
    fn score(&self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        if x.nrows() != y.nrows() {
            return Err(Error::InconsistentSamples(x.nrows(), y.nrows()));
        }
        let generated = self.sample(y, SCORE_SEED)?;
        if generated.ncols() != x.ncols() {
            return Err(Error::DimensionMismatch {
                what: "x",
                expected: generated.ncols(),
                actual: x.ncols(),
            });
        }
        Ok(-energy_distance(x, generated.view()))
    }

    fn to_bytes(&self) -> Result<Vec<u8>>;
}

fn mean_distance(a: ArrayView2<f32>, b: ArrayView2<f32>) -> f64 {
    let mut total = 0f64;
    for ra in a.axis_iter(Axis(0)) {
        for rb in b.axis_iter(Axis(0)) {
            let d: f64 = ra
                .iter()
                .zip(rb.iter())
                .map(|(p, q)| (*p as f64 - *q as f64).powi(2))
                .sum();
            total += d.sqrt();
        }
    }
    total / (a.nrows() * b.nrows()) as f64
}

/// Energy distance between two samples (rows), never negative.
pub fn energy_distance(a: ArrayView2<f32>, b: ArrayView2<f32>) -> f32 {
    if a.nrows() == 0 || b.nrows() == 0 {
        return 0.;
    }
    let e = 2. * mean_distance(a, b) - mean_distance(a, a) - mean_distance(b, b);
    e.max(0.) as f32
}

/// Per-column z-scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Standardizer {
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Result<Standardizer> {
        if mean.len() != scale.len() {
            return Err(Error::DimensionMismatch {
                what: "scale",
                expected: mean.len(),
                actual: scale.len(),
            });
        }
        Ok(Standardizer {
            mean,
            scale: scale.into_iter().map(|s| if s == 0. { 1. } else { s }).collect(),
        })
    }

    pub fn fit(&mut self, x: ArrayView2<f32>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(Error::InconsistentSamples(0, 1));
        }
        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let m = column.iter().map(|v| *v as f64).sum::<f64>() / n;
            let var = column.iter().map(|v| (*v as f64 - m).powi(2)).sum::<f64>() / n;
            mean.push(m as f32);
            scale.push(var.sqrt() as f32);
        }
        *self = Standardizer::new(mean, scale)?;
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    fn check(&self, x: &ArrayView2<f32>) -> Result<()> {
        if self.mean.is_empty() {
            return Err(Error::NotFitted("standardizer"));
        }
        if x.ncols() != self.width() {
            return Err(Error::DimensionMismatch {
                what: "standardizer input",
                expected: self.width(),
                actual: x.ncols(),
            });
        }
        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check(&x)?;
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| (v - self.mean[j]) / self.scale[j]);
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check(&x)?;
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| v * self.scale[j] + self.mean[j]);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GaussianState {
    condition_size: usize,
    output_size: usize,
    /// `(condition_size + 1) x output_size`, row-major, intercept last.
    weights: Vec<f64>,
    /// `output_size x latent_size`, row-major.
    loadings: Vec<f64>,
}

/// Linear conditional mean plus low-rank Gaussian noise.
///
/// The mean is a ridge regression of `x` on `y`; the residual covariance is
/// approximated by its top `latent_size` principal directions, which a
/// standard normal latent vector drives at sampling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianSampler {
    pub latent_size: usize,
    pub ridge: f64,
    state: Option<GaussianState>,
}

impl Default for GaussianSampler {
    fn default() -> Self {
        GaussianSampler::new(4, 1e-3)
    }
}

impl GaussianSampler {
    pub fn new(latent_size: usize, ridge: f64) -> GaussianSampler {
        GaussianSampler {
            latent_size,
            ridge,
            state: None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<GaussianSampler> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

impl ConditionalSampler for GaussianSampler {
    fn fit(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<()> {
        let span = span!(Level::DEBUG, "gaussian_fit", n = x.nrows());
        let _guard = span.enter();

        let (n, dx) = x.dim();
        let dy = y.ncols();
        if y.nrows() != n {
            return Err(Error::InconsistentSamples(n, y.nrows()));
        }
        if n == 0 {
            return Err(Error::InconsistentSamples(0, 1));
        }

        let design = DMatrix::from_fn(n, dy + 1, |i, j| if j < dy { y[[i, j]] as f64 } else { 1. });
        let target = DMatrix::from_fn(n, dx, |i, j| x[[i, j]] as f64);

        let mut gram = design.transpose() * &design;
        for i in 0..dy {
            gram[(i, i)] += self.ridge;
        }
        let weights = gram
            .cholesky()
            .ok_or(Error::Singular)?
            .solve(&(design.transpose() * &target));

        let residuals = &target - &design * &weights;
        let covariance = residuals.transpose() * &residuals / n as f64;
        let eigen = SymmetricEigen::new(covariance);

        let mut order: Vec<usize> = (0..dx).collect();
        order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));

        let mut loadings = vec![0f64; dx * self.latent_size];
        for (l, idx) in order.iter().take(self.latent_size).enumerate() {
            let std = eigen.eigenvalues[*idx].max(0.).sqrt();
            for j in 0..dx {
                loadings[j * self.latent_size + l] = eigen.eigenvectors[(j, *idx)] * std;
            }
        }

        let mut flat_weights = Vec::with_capacity((dy + 1) * dx);
        for i in 0..dy + 1 {
            for j in 0..dx {
                flat_weights.push(weights[(i, j)]);
            }
        }
        debug!(condition = dy, output = dx, "fitted gaussian sampler");

        self.state = Some(GaussianState {
            condition_size: dy,
            output_size: dx,
            weights: flat_weights,
            loadings,
        });
        Ok(())
    }

    fn sample(&self, y: ArrayView2<f32>, random_state: u64) -> Result<Array2<f32>> {
        let state = self
            .state
            .as_ref()
            .ok_or(Error::NotFitted("gaussian sampler"))?;
        let (dy, dx) = (state.condition_size, state.output_size);
        if y.ncols() != dy {
            return Err(Error::DimensionMismatch {
                what: "condition",
                expected: dy,
                actual: y.ncols(),
            });
        }

        let mut rng = StdRng::seed_from_u64(random_state);
        let mut out = Array2::<f32>::zeros((y.nrows(), dx));
        for (row, mut sample) in y.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let z: Vec<f64> = (0..self.latent_size)
                .map(|_| rng.sample(StandardNormal))
                .collect();
            for j in 0..dx {
                let mut v = state.weights[dy * dx + j];
                for (i, c) in row.iter().enumerate() {
                    v += *c as f64 * state.weights[i * dx + j];
                }
                for (l, zl) in z.iter().enumerate() {
                    v += state.loadings[j * self.latent_size + l] * zl;
                }
                sample[j] = v as f32;
            }
        }
        Ok(out)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
