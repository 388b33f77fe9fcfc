use crate::color::{distinct_colors, recolor};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::face::{BoundingBoxFinder, FaceExtractor, SimpleFaceExtractor};
use crate::feature::{ColorsFeatureExtractor, EmbeddingFeatureExtractor};
use crate::recommend::{
    EncodedModel, EncodedRecommender, EncodingRecommender, Recommendation, Recommender, SamplerKind,
};
use image::{Rgb, RgbImage};
use imageproc::drawing;
use tracing::{Level, debug, info, span};

pub use detection::{BlazeFaceFinder, Detection};
pub use embedding::FacenetEmbedder;
pub use generator::OnnxGenerator;
pub use model::{Session, initialize_model, initialize_model_from_memory};
pub use parsing::BiSeNetParser;

mod detection;
mod embedding;
mod generator;
mod model;
mod parsing;

type Colors = ColorsFeatureExtractor<BiSeNetParser>;

/// Face detector, cropper, color features and encoded model wired together.
pub struct Pipeline {
    recommender: EncodingRecommender<BlazeFaceFinder, SimpleFaceExtractor, Colors, Box<dyn EncodedRecommender>>,
}

/// Encoded recommender of the kind stored in `model`.
pub fn encoded_recommender(
    model: EncodedModel,
    random_state: u64,
    threads: usize,
) -> Result<Box<dyn EncodedRecommender>> {
    let encoded: Box<dyn EncodedRecommender> = match model.sampler_kind {
        SamplerKind::Gaussian => Box::new(model.gaussian_recommender(random_state)?),
        SamplerKind::Onnx { latent_size } => Box::new(model.into_recommender(
            |bytes| OnnxGenerator::from_bytes(bytes, latent_size, threads),
            random_state,
        )?),
    };
    Ok(encoded)
}

/// 512-wide FaceNet embeddings, for hosts that condition on embeddings.
pub fn embedding_extractor(config: &PipelineConfig) -> Result<EmbeddingFeatureExtractor<FacenetEmbedder>> {
    let embedder = FacenetEmbedder::new(&config.model_path(&config.embedder_model), config.threads)?;
    Ok(EmbeddingFeatureExtractor::new(embedder))
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Pipeline> {
        let span = span!(Level::DEBUG, "pipeline_init");
        let _guard = span.enter();

        let bb_finder = BlazeFaceFinder::new(&config.model_path(&config.detector_model), config.threads)?;
        let face_extractor = SimpleFaceExtractor::new(config.face_size, config.bb_scale);
        let parser = BiSeNetParser::new(&config.model_path(&config.parser_model), config.threads)?;
        let feature_extractor = ColorsFeatureExtractor::new(parser)?;

        let encoded_path = config.model_path(&config.encoded_model);
        let model = EncodedModel::load(&std::fs::read(&encoded_path)?)?;
        debug!(path = %encoded_path.display(), kind = ?model.sampler_kind, "loaded encoded model");
        let encoded = encoded_recommender(model, config.random_state, config.threads)?;

        Ok(Pipeline {
            recommender: EncodingRecommender::new(bb_finder, face_extractor, feature_extractor, encoded),
        })
    }

    pub fn run(&self, img: &RgbImage) -> Result<Recommendation> {
        self.recommender.recommend(img)
    }

    /// The face crop with every region the colors were taken from tinted.
    pub fn run_trace(&self, img: &RgbImage) -> Result<RgbImage> {
        let bounds = self.recommender.bb_finder.find(img)?.ok_or(Error::NoFace)?;
        let mut face = self.recommender.face_extractor.extract(img, bounds)?;
        let labels = self.recommender.feature_extractor.segment(&face)?;

        let palette = distinct_colors(4);
        for (code, color) in [Colors::SKIN, Colors::HAIR, Colors::LIPS, Colors::EYES]
            .into_iter()
            .zip(palette)
        {
            face = recolor(&face, &labels.mapv(|l| l == code), color, 0.4);
        }

        let (w, h) = face.dimensions();
        drawing::draw_hollow_rect_mut(
            &mut face,
            imageproc::rect::Rect::at(0, 0).of_size(w, h),
            Rgb([255u8, 0u8, 0u8]),
        );
        info!(?bounds, "traced face");
        Ok(face)
    }
}

impl Recommender for Pipeline {
    fn recommend(&self, img: &RgbImage) -> Result<Recommendation> {
        self.run(img)
    }
}
