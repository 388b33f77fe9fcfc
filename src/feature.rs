pub mod extract;
pub mod iris;
pub mod makeup;

pub use extract::{
    ColorsFeatureExtractor, Embedder, EmbeddingFeatureExtractor, FeatureExtractor,
    MakeupFeatureExtractor,
};
pub use iris::{ClusteringIris, HoughIris, IrisExtractor, ThresholdIris};
pub use makeup::{EyeshadowColorExtractor, EyeshadowShapeExtractor, LipstickColorExtractor};
