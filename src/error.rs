use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid number of dimensions: {0}, expected {1}")]
    InvalidDimensions(usize, &'static str),

    #[error("invalid number of channels: {0}, expected 3")]
    InvalidChannels(usize),

    #[error("invalid pixel value {0}, expected a finite value in [0.0, 1.0]")]
    InvalidPixelValue(f32),

    #[error("can't fit rect when rect {dimension} {size} is bigger than image {dimension} {limit}")]
    RectTooLarge {
        dimension: &'static str,
        size: i32,
        limit: i32,
    },

    #[error("mask is {actual:?} but image is {expected:?}")]
    MaskShape {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("unknown face part {0:?}")]
    UnknownPart(String),

    #[error("{what} has {actual} features, but {expected} features were expected")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("inconsistent number of samples: {0} and {1}")]
    InconsistentSamples(usize, usize),

    #[error("linear system is singular")]
    Singular,

    #[error("{0} is not fitted yet")]
    NotFitted(&'static str),

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("no face detected")]
    NoFace,

    #[error("stage produced {actual} outputs for {expected} inputs")]
    StageOutput { expected: usize, actual: usize },

    #[error("model file {0:?} not found")]
    MissingModel(std::path::PathBuf),

    #[error("model error: {0}")]
    Model(#[from] ort::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
