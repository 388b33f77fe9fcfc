use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to assemble the recommendation pipeline.
///
/// Missing fields fall back to their defaults, so a JSON file only has to
/// name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory the model files below are resolved against.
    pub models_dir: PathBuf,
    pub detector_model: String,
    pub parser_model: String,
    pub embedder_model: String,
    /// Serialized encoded model (sampler and scalers).
    pub encoded_model: String,
    pub face_size: u32,
    pub bb_scale: f64,
    pub threads: usize,
    pub random_state: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            models_dir: PathBuf::from("./models"),
            detector_model: "mediapipe_face_detection_short_range.onnx".to_string(),
            parser_model: "bisenet.onnx".to_string(),
            embedder_model: "facenet.onnx".to_string(),
            encoded_model: "encoded.json".to_string(),
            face_size: 512,
            bb_scale: 1.5,
            threads: (num_cpus::get() / 2).max(1),
            random_state: 0,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<PipelineConfig> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn model_path(&self, file: &str) -> PathBuf {
        self.models_dir.join(file)
    }
}
