//! facegate-core — Face detection and representation.
//!
//! Uses SCRFD for face detection and Facenet for face embeddings, both
//! running via ONNX Runtime on the CPU.

pub mod detector;
pub mod model;
pub mod representer;
pub mod types;

pub use detector::FaceDetector;
pub use model::{confidence, DistanceMetric, ModelName};
pub use representer::FaceRepresenter;
pub use types::{BoundingBox, Embedding, FaceRepresentation, MatchRow};

use std::path::PathBuf;

/// Default directory searched for ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/facegate/models")
}
