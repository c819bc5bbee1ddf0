//! Facenet face representer via ONNX Runtime.
//!
//! Crops a detected face, fits it into the 160x160 model input with black
//! padding, standardizes per image and produces a unit-length 128-d
//! embedding.

use crate::model::ModelName;
use crate::types::{BoundingBox, Embedding};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepresenterError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region lies outside the image")]
    EmptyRegion,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Facenet-based face representer.
pub struct FaceRepresenter {
    session: Session,
    model: ModelName,
}

impl FaceRepresenter {
    pub fn load(model: ModelName, model_path: &Path) -> Result<Self, RepresenterError> {
        if !model_path.exists() {
            return Err(RepresenterError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            %model,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded representation model"
        );

        Ok(Self { session, model })
    }

    /// Compute the embedding of the face inside `region`.
    pub fn represent(&mut self, image: &RgbImage, region: &BoundingBox) -> Result<Embedding, RepresenterError> {
        let face = crop_face(image, region, self.model.input_size()).ok_or(RepresenterError::EmptyRegion)?;
        let input = preprocess(&face);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RepresenterError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let expected = self.model.dimensions();
        if raw.len() != expected {
            return Err(RepresenterError::InferenceFailed(format!(
                "expected {expected}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::l2_normalized(raw.to_vec(), self.model))
    }
}

/// Cut `region` out of the image and letterbox it into a black `size`x`size`
/// square, keeping the aspect ratio.
pub fn crop_face(image: &RgbImage, region: &BoundingBox, size: u32) -> Option<RgbImage> {
    let region = region.clamp_to(image.width(), image.height())?;
    let (x, y) = (region.x as u32, region.y as u32);
    let w = (region.width.round() as u32).min(image.width() - x).max(1);
    let h = (region.height.round() as u32).min(image.height() - y).max(1);
    let crop = imageops::crop_imm(image, x, y, w, h).to_image();

    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(&crop, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    imageops::overlay(
        &mut canvas,
        &resized,
        ((size - new_w) / 2) as i64,
        ((size - new_h) / 2) as i64,
    );
    Some(canvas)
}

/// Standardize a square face crop into an NHWC float tensor:
/// `(x - mean) / std` over all pixels and channels.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let (w, h) = (face.width() as usize, face.height() as usize);
    let raw = face.as_raw();
    let n = raw.len().max(1) as f32;

    let mean = raw.iter().map(|&v| v as f32).sum::<f32>() / n;
    let variance = raw.iter().map(|&v| (v as f32 - mean).powi(2)).sum::<f32>() / n;
    // Flat crops have zero variance; keep them finite.
    let std = variance.sqrt().max(1.0 / n.sqrt());

    let mut tensor = Array4::<f32>::zeros((1, h, w, 3));
    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = (pixel[c] as f32 - mean) / std;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    #[test]
    fn test_crop_face_is_square_model_input() {
        let image = RgbImage::from_pixel(300, 200, Rgb([200, 100, 50]));
        let face = crop_face(&image, &region(10.0, 20.0, 80.0, 40.0), 160).unwrap();
        assert_eq!(face.dimensions(), (160, 160));
    }

    #[test]
    fn test_crop_face_pads_wide_region_with_black() {
        let image = RgbImage::from_pixel(300, 200, Rgb([255, 255, 255]));
        // 2:1 region fills the full width and the middle half of the height.
        let face = crop_face(&image, &region(0.0, 0.0, 200.0, 100.0), 160).unwrap();
        assert_eq!(face.get_pixel(80, 0), &Rgb([0, 0, 0]));
        assert_eq!(face.get_pixel(80, 80), &Rgb([255, 255, 255]));
        assert_eq!(face.get_pixel(80, 159), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_face_outside_image() {
        let image = RgbImage::new(50, 50);
        assert!(crop_face(&image, &region(60.0, 60.0, 10.0, 10.0), 160).is_none());
    }

    #[test]
    fn test_preprocess_shape_is_nhwc() {
        let face = RgbImage::from_pixel(160, 160, Rgb([10, 20, 30]));
        let tensor = preprocess(&face);
        assert_eq!(tensor.shape(), &[1, 160, 160, 3]);
    }

    #[test]
    fn test_preprocess_standardizes() {
        let face = RgbImage::from_fn(16, 16, |x, y| {
            let v = ((x + y) * 8) as u8;
            Rgb([v, v / 2, 255 - v])
        });
        let tensor = preprocess(&face);
        let n = tensor.len() as f32;
        let mean = tensor.iter().sum::<f32>() / n;
        let var = tensor.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-4, "mean {mean}");
        assert!((var - 1.0).abs() < 1e-3, "variance {var}");
    }

    #[test]
    fn test_preprocess_flat_image_stays_finite() {
        let face = RgbImage::from_pixel(8, 8, Rgb([128, 128, 128]));
        let tensor = preprocess(&face);
        assert!(tensor.iter().all(|v| v.is_finite() && *v == 0.0));
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRepresenter::load(ModelName::Facenet, Path::new("/nonexistent/facenet128.onnx"))
            .err()
            .unwrap();
        assert!(matches!(err, RepresenterError::ModelNotFound(_)));
    }
}
