use serde::{Deserialize, Serialize};

use crate::model::ModelName;

/// Axis-aligned face region in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score in [0, 1].
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let overlap = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - overlap;
        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }

    /// Clamp the box to an image of the given size. Returns `None` if nothing
    /// of the box remains inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x.clamp(0.0, width as f32);
        let y1 = self.y.clamp(0.0, height as f32);
        let x2 = (self.x + self.width).clamp(0.0, width as f32);
        let y2 = (self.y + self.height).clamp(0.0, height as f32);
        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }
        Some(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: self.confidence,
        })
    }
}

/// Face embedding produced by a representation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: ModelName,
}

impl Embedding {
    /// Scale to unit length. Zero vectors are returned unchanged.
    pub fn l2_normalized(values: Vec<f32>, model: ModelName) -> Self {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            values.into_iter().map(|v| v / norm).collect()
        } else {
            values
        };
        Self { values, model }
    }
}

/// One detected face together with its embedding.
#[derive(Debug, Clone)]
pub struct FaceRepresentation {
    pub region: BoundingBox,
    pub embedding: Embedding,
}

/// One row of a search result batch.
///
/// Carries everything the identity service knows about a neighbor; callers
/// that only need the public triple project `img_name`, `distance` and
/// `confidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub id: String,
    pub img_name: String,
    pub model_name: String,
    pub distance: f32,
    pub threshold: f32,
    pub confidence: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub target_w: f32,
    pub target_h: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0 }
    }

    #[test]
    fn test_iou_identical() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_shifted() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0);
        // overlap 50, union 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_inside_image() {
        let clamped = bbox(-10.0, 5.0, 50.0, 200.0).clamp_to(100, 100).unwrap();
        assert_eq!(clamped.x, 0.0);
        assert_eq!(clamped.y, 5.0);
        assert_eq!(clamped.width, 40.0);
        assert_eq!(clamped.height, 95.0);
    }

    #[test]
    fn test_clamp_outside_image() {
        assert!(bbox(150.0, 150.0, 20.0, 20.0).clamp_to(100, 100).is_none());
    }

    #[test]
    fn test_l2_normalized_unit_length() {
        let e = Embedding::l2_normalized(vec![3.0, 4.0], ModelName::Facenet);
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalized_zero_vector() {
        let e = Embedding::l2_normalized(vec![0.0, 0.0], ModelName::Facenet);
        assert_eq!(e.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_match_row_serializes_all_columns() {
        let row = MatchRow {
            id: "7".into(),
            img_name: "alice".into(),
            model_name: "Facenet".into(),
            distance: 0.1,
            threshold: 0.4,
            confidence: 0.9,
            target_x: 1.0,
            target_y: 2.0,
            target_w: 3.0,
            target_h: 4.0,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 10);
        assert_eq!(json["img_name"], "alice");
    }
}
