//! Makeup color recommendation from face images.
//!
//! A photo goes through face detection, cropping, face parsing and color
//! extraction; the resulting face colors condition a generative model that
//! samples lipstick and eyeshadow colors.

pub mod cluster;
pub mod color;
pub mod config;
pub mod error;
pub mod face;
pub mod feature;
pub mod pipeline;
pub mod recommend;
pub mod sampler;
pub mod segment;
pub mod shapes;
pub mod stage;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use recommend::{Recommendation, Recommender};
