use crate::color::{lab_to_rgb_pixel, lab_to_scaled, rgb_to_lab_pixel, scaled_to_lab};
use crate::error::{Error, Result};
use crate::sampler::{ConditionalSampler, GaussianSampler, Standardizer};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{Level, span, trace};

/// Maps a face feature vector to a makeup vector.
pub trait EncodedRecommender: Send + Sync {
    fn recommend(&self, features: &Array1<f32>) -> Result<Array1<f32>>;
}

impl<R: EncodedRecommender + ?Sized> EncodedRecommender for Box<R> {
    fn recommend(&self, features: &Array1<f32>) -> Result<Array1<f32>> {
        (**self).recommend(features)
    }
}

fn triples(values: &[f32], what: &'static str) -> Result<()> {
    if values.len() % 3 != 0 {
        return Err(Error::DimensionMismatch {
            what,
            expected: values.len().next_multiple_of(3),
            actual: values.len(),
        });
    }
    Ok(())
}

/// RGB triples to the 8-bit-scaled Lab layout. Missing components (negative
/// sentinels) are treated as black.
pub fn rgb_features_to_lab(features: &[f32]) -> Result<Vec<f32>> {
    triples(features, "color features")?;
    Ok(features
        .chunks_exact(3)
        .flat_map(|c| {
            let rgb = [c[0], c[1], c[2]].map(|v| v.round().clamp(0., 255.) as u8);
            lab_to_scaled(rgb_to_lab_pixel(rgb))
        })
        .collect())
}

/// Inverse of [`rgb_features_to_lab`].
pub fn lab_features_to_rgb(features: &[f32]) -> Result<Vec<f32>> {
    triples(features, "lab features")?;
    Ok(features
        .chunks_exact(3)
        .flat_map(|c| lab_to_rgb_pixel(scaled_to_lab([c[0], c[1], c[2]])).map(|v| v as f32))
        .collect())
}

/// Samples makeup colors conditioned on face colors.
///
/// Face colors go through Lab and `y_scaler` before sampling; samples come
/// back through `x_scaler` and Lab into RGB, laid out like the makeup
/// feature extractor output.
pub struct SamplerRecommender<S> {
    pub sampler: S,
    pub x_scaler: Standardizer,
    pub y_scaler: Standardizer,
    pub random_state: u64,
}

impl<S: ConditionalSampler> SamplerRecommender<S> {
    pub fn new(sampler: S, x_scaler: Standardizer, y_scaler: Standardizer, random_state: u64) -> Self {
        SamplerRecommender {
            sampler,
            x_scaler,
            y_scaler,
            random_state,
        }
    }
}

impl<S: ConditionalSampler> EncodedRecommender for SamplerRecommender<S> {
    fn recommend(&self, features: &Array1<f32>) -> Result<Array1<f32>> {
        let span = span!(Level::DEBUG, "encoded_recommender");
        let _guard = span.enter();

        let lab = rgb_features_to_lab(&features.to_vec())?;
        let y = Array2::from_shape_vec((1, lab.len()), lab)?;
        let y = self.y_scaler.transform(y.view())?;

        let x = self.sampler.sample(y.view(), self.random_state)?;
        let x = self.x_scaler.inverse_transform(x.view())?;
        trace!(?x, "sampled");

        let row = x
            .axis_iter(Axis(0))
            .next()
            .ok_or(Error::StageOutput {
                expected: 1,
                actual: 0,
            })?
            .to_vec();
        Ok(Array1::from(lab_features_to_rgb(&row)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerKind {
    /// [`GaussianSampler`] bytes.
    Gaussian,
    /// Exported generator network taking `latent_size` noise columns.
    Onnx { latent_size: usize },
}

/// Sampler state plus the scalers it was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedModel {
    pub sampler_kind: SamplerKind,
    pub sampler: Vec<u8>,
    pub x_scaler: Standardizer,
    pub y_scaler: Standardizer,
}

impl EncodedModel {
    pub fn new<S: ConditionalSampler>(
        sampler_kind: SamplerKind,
        sampler: &S,
        x_scaler: Standardizer,
        y_scaler: Standardizer,
    ) -> Result<EncodedModel> {
        Ok(EncodedModel {
            sampler_kind,
            sampler: sampler.to_bytes()?,
            x_scaler,
            y_scaler,
        })
    }

    pub fn load(bytes: &[u8]) -> Result<EncodedModel> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn save(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Recommender over a sampler rebuilt from the stored bytes.
    pub fn into_recommender<S: ConditionalSampler>(
        self,
        decode: impl FnOnce(Vec<u8>) -> Result<S>,
        random_state: u64,
    ) -> Result<SamplerRecommender<S>> {
        Ok(SamplerRecommender::new(
            decode(self.sampler)?,
            self.x_scaler,
            self.y_scaler,
            random_state,
        ))
    }

    pub fn gaussian_recommender(self, random_state: u64) -> Result<SamplerRecommender<GaussianSampler>> {
        if self.sampler_kind != SamplerKind::Gaussian {
            return Err(Error::Unsupported("non-gaussian sampler as gaussian"));
        }
        self.into_recommender(|bytes| GaussianSampler::from_bytes(&bytes), random_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayView2, array};

    /// Returns the condition (first `width` columns) unchanged.
    struct Echo {
        width: usize,
    }

    impl ConditionalSampler for Echo {
        fn fit(&mut self, _x: ArrayView2<f32>, _y: ArrayView2<f32>) -> Result<()> {
            Ok(())
        }

        fn sample(&self, y: ArrayView2<f32>, _random_state: u64) -> Result<Array2<f32>> {
            Ok(y.slice(ndarray::s![.., ..self.width]).to_owned())
        }

        fn to_bytes(&self) -> Result<Vec<u8>> {
            Ok(vec![self.width as u8])
        }
    }

    fn identity(width: usize) -> Standardizer {
        Standardizer::new(vec![0.; width], vec![1.; width]).unwrap()
    }

    #[test]
    fn lab_layout_round_trip() -> Result<()> {
        let rgb = [200., 30., 60., 10., 250., 128.];
        let back = lab_features_to_rgb(&rgb_features_to_lab(&rgb)?)?;
        for (a, b) in rgb.iter().zip(back) {
            assert!((a - b).abs() <= 1., "{a} vs {b}");
        }
        Ok(())
    }

    #[test]
    fn sentinels_become_black() -> Result<()> {
        let lab = rgb_features_to_lab(&[-1., -1., -1.])?;
        assert_eq!(lab, rgb_features_to_lab(&[0., 0., 0.])?);
        assert!(lab[0].abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn rejects_partial_triples() {
        assert!(matches!(
            rgb_features_to_lab(&[1., 2.]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn echo_recommends_the_face_colors() -> Result<()> {
        let recommender = SamplerRecommender::new(Echo { width: 6 }, identity(6), identity(12), 0);
        let features = Array1::from(vec![
            200., 100., 50., 20., 20., 20., 180., 40., 60., 90., 60., 30.,
        ]);
        let out = recommender.recommend(&features)?;
        assert_eq!(out.len(), 6);
        for (a, b) in out.iter().zip(features.iter()) {
            assert!((a - b).abs() <= 1., "{out}");
        }
        Ok(())
    }

    #[test]
    fn scaler_width_is_checked() {
        let recommender = SamplerRecommender::new(Echo { width: 3 }, identity(3), identity(6), 0);
        assert!(matches!(
            recommender.recommend(&Array1::zeros(12)),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn gaussian_model_round_trip() -> Result<()> {
        let y = Array::from_shape_fn((40, 3), |(i, j)| ((i * 7 + j * 13) % 11) as f32 / 10.);
        let x = Array::from_shape_fn((40, 3), |(i, j)| (i + j) as f32 / 5. + 1.);
        let mut sampler = GaussianSampler::new(2, 1e-3);
        sampler.fit(x.view(), y.view())?;

        let mut x_scaler = Standardizer::default();
        x_scaler.fit(x.view())?;
        let mut y_scaler = Standardizer::default();
        y_scaler.fit(array![[10f32, 20., 30.], [40., 50., 60.]].view())?;

        let model = EncodedModel::new(SamplerKind::Gaussian, &sampler, x_scaler, y_scaler)?;
        let loaded = EncodedModel::load(&model.save()?)?;
        assert_eq!(loaded, model);

        let recommender = loaded.gaussian_recommender(5)?;
        let features = Array1::from(vec![30.; 3]);
        let a = recommender.recommend(&features)?;
        let b = recommender.recommend(&features)?;
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|v| (0. ..=255.).contains(v)));
        Ok(())
    }

    #[test]
    fn onnx_model_is_not_gaussian() -> Result<()> {
        let model = EncodedModel::new(
            SamplerKind::Onnx { latent_size: 4 },
            &Echo { width: 3 },
            identity(3),
            identity(3),
        )?;
        assert_eq!(model.sampler, vec![3]);
        assert!(matches!(
            model.gaussian_recommender(0),
            Err(Error::Unsupported(_))
        ));
        Ok(())
    }
}
