use facegate_core::detector::DetectorError;
use facegate_core::representer::RepresenterError;
use facegate_core::{FaceDetector, FaceRepresentation, FaceRepresenter, ModelName};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("representer error: {0}")]
    Representer(#[from] RepresenterError),
    #[error("face models unavailable: {0}")]
    Unavailable(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Represent {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<FaceRepresentation>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    model: ModelName,
}

impl EngineHandle {
    /// Model the engine computes embeddings with.
    pub fn model(&self) -> ModelName {
        self.model
    }

    /// Detect every face in the image and embed each one, highest detection
    /// confidence first.
    pub async fn represent(&self, image: RgbImage) -> Result<Vec<FaceRepresentation>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Represent { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

struct Models {
    detector: FaceDetector,
    representer: FaceRepresenter,
}

fn load_models(detector_path: &Path, representer_path: &Path, model: ModelName) -> Result<Models, EngineError> {
    let detector = FaceDetector::load(detector_path)?;
    let representer = FaceRepresenter::load(model, representer_path)?;
    Ok(Models { detector, representer })
}

/// Spawn the engine on a dedicated OS thread.
///
/// ONNX sessions need exclusive access, so every inference is funnelled
/// through this one thread. Models are loaded on the thread; if loading
/// fails the thread keeps running and answers each request with the load
/// error, so the HTTP surface stays up.
pub fn spawn_engine(
    detector_path: PathBuf,
    representer_path: PathBuf,
    model: ModelName,
) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            let mut models = match load_models(&detector_path, &representer_path, model) {
                Ok(models) => {
                    tracing::info!(%model, "engine thread started");
                    Ok(models)
                }
                Err(err) => {
                    tracing::error!(error = %err, "face models failed to load; identity requests will fail");
                    Err(err.to_string())
                }
            };

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Represent { image, reply } => {
                        let result = match models.as_mut() {
                            Ok(models) => run_represent(models, &image),
                            Err(reason) => Err(EngineError::Unavailable(reason.clone())),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, model })
}

fn run_represent(models: &mut Models, image: &RgbImage) -> Result<Vec<FaceRepresentation>, EngineError> {
    let faces = models.detector.detect(image)?;
    tracing::debug!(faces = faces.len(), "represent: faces detected");

    faces
        .into_iter()
        .map(|region| -> Result<FaceRepresentation, EngineError> {
            let embedding = models.representer.represent(image, &region)?;
            Ok(FaceRepresentation { region, embedding })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_models_reported_per_request() {
        let handle = spawn_engine(
            PathBuf::from("/nonexistent/det_10g.onnx"),
            PathBuf::from("/nonexistent/facenet128.onnx"),
            ModelName::Facenet,
        )
        .unwrap();

        assert_eq!(handle.model(), ModelName::Facenet);
        for _ in 0..2 {
            let err = handle.represent(RgbImage::new(4, 4)).await.unwrap_err();
            assert!(matches!(err, EngineError::Unavailable(_)));
            assert!(err.to_string().contains("model file not found"), "{err}");
        }
    }
}
