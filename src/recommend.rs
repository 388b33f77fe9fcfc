use crate::error::{Error, Result};
use crate::face::{BoundingBoxFinder, FaceExtractor};
use crate::feature::FeatureExtractor;
use image::RgbImage;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{Level, debug, span};

pub mod encoded;

pub use encoded::{
    EncodedModel, EncodedRecommender, SamplerKind, SamplerRecommender, lab_features_to_rgb,
    rgb_features_to_lab,
};

/// Output keys, makeup colors first, then the face colors they were
/// conditioned on.
pub const KEYS: [&str; 8] = [
    "lipstick_color",
    "eyeshadow_outer_color",
    "eyeshadow_middle_color",
    "eyeshadow_inner_color",
    "skin",
    "hair",
    "lips",
    "eyes",
];

/// Named colors in a fixed order. Serializes as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    colors: Vec<(String, [u8; 3])>,
}

impl Recommendation {
    /// Pairs `names` with consecutive RGB triples of `values`, clamped and
    /// rounded into byte range.
    pub fn from_values(names: &[&str], values: &[f32]) -> Result<Recommendation> {
        if values.len() != names.len() * 3 {
            return Err(Error::DimensionMismatch {
                what: "recommendation",
                expected: names.len() * 3,
                actual: values.len(),
            });
        }
        let colors = names
            .iter()
            .zip(values.chunks_exact(3))
            .map(|(name, c)| {
                let rgb = [c[0], c[1], c[2]].map(|v| v.round().clamp(0., 255.) as u8);
                (name.to_string(), rgb)
            })
            .collect();
        Ok(Recommendation { colors })
    }

    pub fn get(&self, name: &str) -> Option<[u8; 3]> {
        self.colors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rgb)| *rgb)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, [u8; 3])> {
        self.colors.iter().map(|(n, rgb)| (n.as_str(), *rgb))
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Serialize for Recommendation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.colors.len()))?;
        for (name, rgb) in &self.colors {
            map.serialize_entry(name, rgb)?;
        }
        map.end()
    }
}

/// Recommends makeup for a photo.
pub trait Recommender: Send + Sync {
    fn recommend(&self, img: &RgbImage) -> Result<Recommendation>;
}

/// Fixed answer, for wiring things up without models.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyRecommender;

impl Recommender for DummyRecommender {
    fn recommend(&self, _img: &RgbImage) -> Result<Recommendation> {
        let values = [
            [180., 30., 50.],
            [90., 60., 110.],
            [150., 110., 160.],
            [230., 200., 210.],
            [224., 172., 140.],
            [60., 40., 30.],
            [190., 100., 100.],
            [90., 60., 40.],
        ];
        Recommendation::from_values(&KEYS, values.as_flattened())
    }
}

/// Detect, crop, describe, recommend.
pub struct EncodingRecommender<B, F, X, E> {
    pub bb_finder: B,
    pub face_extractor: F,
    pub feature_extractor: X,
    pub encoded_recommender: E,
}

impl<B, F, X, E> EncodingRecommender<B, F, X, E>
where
    B: BoundingBoxFinder,
    F: FaceExtractor,
    X: FeatureExtractor + Send + Sync,
    E: EncodedRecommender,
{
    pub fn new(bb_finder: B, face_extractor: F, feature_extractor: X, encoded_recommender: E) -> Self {
        EncodingRecommender {
            bb_finder,
            face_extractor,
            feature_extractor,
            encoded_recommender,
        }
    }
}

impl<B, F, X, E> Recommender for EncodingRecommender<B, F, X, E>
where
    B: BoundingBoxFinder,
    F: FaceExtractor,
    X: FeatureExtractor + Send + Sync,
    E: EncodedRecommender,
{
    fn recommend(&self, img: &RgbImage) -> Result<Recommendation> {
        let span = span!(Level::DEBUG, "recommend");
        let _guard = span.enter();

        let bounds = self.bb_finder.find(img)?.ok_or(Error::NoFace)?;
        debug!(?bounds, "face found");
        let face = self.face_extractor.extract(img, bounds)?;

        let features = self.feature_extractor.extract(&face)?;
        let makeup = self.encoded_recommender.recommend(&features)?;
        debug!(?features, ?makeup, "encoded");

        let values: Vec<f32> = makeup.iter().chain(features.iter()).copied().collect();
        Recommendation::from_values(&KEYS, &values)
    }
}
