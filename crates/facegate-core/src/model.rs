//! Model and distance-metric catalogue.
//!
//! Thresholds are the published verification cut-offs for each
//! model/metric pair; a neighbor farther than the threshold is not the
//! same identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Face representation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelName {
    Facenet,
}

impl ModelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Facenet => "Facenet",
        }
    }

    /// Square input edge in pixels.
    pub fn input_size(&self) -> u32 {
        match self {
            ModelName::Facenet => 160,
        }
    }

    /// Embedding dimensionality.
    pub fn dimensions(&self) -> usize {
        match self {
            ModelName::Facenet => 128,
        }
    }

    /// File name of the ONNX export inside the model directory.
    pub fn onnx_file(&self) -> &'static str {
        match self {
            ModelName::Facenet => "facenet128.onnx",
        }
    }

    /// Maximum distance at which two faces count as the same identity.
    pub fn threshold(&self, metric: DistanceMetric) -> f32 {
        match (self, metric) {
            (ModelName::Facenet, DistanceMetric::Cosine) => 0.40,
            (ModelName::Facenet, DistanceMetric::EuclideanL2) => 0.80,
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance function used to rank stored embeddings against a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    EuclideanL2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }

    /// Largest value the metric can take between two unit vectors.
    pub fn max_distance(&self) -> f32 {
        match self {
            DistanceMetric::Cosine => 2.0,
            DistanceMetric::EuclideanL2 => 2.0,
        }
    }

    /// Convert a cosine distance between unit vectors into this metric.
    ///
    /// `|a - b|^2 = 2 - 2cos = 2 * cosine_distance` when `|a| = |b| = 1`.
    pub fn from_cosine(&self, cosine_distance: f32) -> f32 {
        let d = cosine_distance.clamp(0.0, 2.0);
        match self {
            DistanceMetric::Cosine => d,
            DistanceMetric::EuclideanL2 => (2.0 * d).sqrt(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a distance to a confidence score in [0, 1].
///
/// Distances inside the threshold land in [0.5, 1.0], linearly from a
/// perfect match down to the threshold; distances beyond it fall from 0.5
/// to 0.0 at `max_distance`.
pub fn confidence(distance: f32, threshold: f32, max_distance: f32) -> f32 {
    let distance = distance.max(0.0);
    let score = if distance <= threshold {
        if threshold > 0.0 {
            1.0 - 0.5 * (distance / threshold)
        } else {
            1.0
        }
    } else if max_distance > threshold {
        0.5 * (1.0 - (distance - threshold) / (max_distance - threshold))
    } else {
        0.0
    };
    score.clamp(0.0, 1.0)
}
