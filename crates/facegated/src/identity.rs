//! Face-identity service: the two operations the HTTP layer forwards to.

use async_trait::async_trait;
use chrono::Utc;
use facegate_core::{confidence, BoundingBox, DistanceMetric, FaceRepresentation, MatchRow, ModelName};
use facegate_store::{FaceRecord, Neighbor, StoreError, StoreKind, WeaviateStore};
use image::RgbImage;
use serde_json::{json, Value};
use thiserror::Error;

use crate::engine::{EngineError, EngineHandle};

/// Fixed model and backing-store settings sent with every identity call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_name: ModelName,
    pub store_kind: StoreKind,
    pub store_address: String,
}

/// Registers and searches faces.
///
/// `search` returns one batch per face found in the query image; each batch
/// is ordered closest first.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn register(&self, image: RgbImage, label: &str, model: &ModelConfig) -> anyhow::Result<Value>;

    async fn search(
        &self,
        image: RgbImage,
        model: &ModelConfig,
        metric: DistanceMetric,
    ) -> anyhow::Result<Vec<Vec<MatchRow>>>;
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("face could not be detected in the uploaded image")]
    NoFaceDetected,
    #[error("model {requested} is not loaded (engine runs {loaded})")]
    ModelNotLoaded { requested: ModelName, loaded: ModelName },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identity service backed by the local ONNX engine and a Weaviate store.
pub struct FaceIdentity {
    engine: EngineHandle,
    http: reqwest::Client,
    search_limit: usize,
}

impl FaceIdentity {
    pub fn new(engine: EngineHandle, http: reqwest::Client, search_limit: usize) -> Self {
        Self { engine, http, search_limit }
    }

    fn store(&self, model: &ModelConfig) -> WeaviateStore {
        match model.store_kind {
            StoreKind::Weaviate => WeaviateStore::new(self.http.clone(), &model.store_address, model.model_name.as_str()),
        }
    }

    async fn faces(&self, image: RgbImage, model: &ModelConfig) -> Result<Vec<FaceRepresentation>, IdentityError> {
        if model.model_name != self.engine.model() {
            return Err(IdentityError::ModelNotLoaded {
                requested: model.model_name,
                loaded: self.engine.model(),
            });
        }
        let faces = self.engine.represent(image).await?;
        if faces.is_empty() {
            return Err(IdentityError::NoFaceDetected);
        }
        Ok(faces)
    }

    async fn register_faces(&self, image: RgbImage, label: &str, model: &ModelConfig) -> Result<Value, IdentityError> {
        let faces = self.faces(image, model).await?;
        let store = self.store(model);
        store.ensure_class().await?;

        let mut ids = Vec::with_capacity(faces.len());
        for face in &faces {
            let record = FaceRecord {
                img_name: label.to_string(),
                model_name: model.model_name.to_string(),
                face_confidence: face.region.confidence,
                created_at: Utc::now(),
            };
            ids.push(store.insert(&record, &face.embedding.values).await?.to_string());
        }

        tracing::info!(img_name = label, inserted = ids.len(), class = store.class(), "registered faces");
        Ok(json!({
            "img_name": label,
            "model_name": model.model_name.as_str(),
            "inserted": ids.len(),
            "ids": ids,
        }))
    }

    async fn search_faces(
        &self,
        image: RgbImage,
        model: &ModelConfig,
        metric: DistanceMetric,
    ) -> Result<Vec<Vec<MatchRow>>, IdentityError> {
        let faces = self.faces(image, model).await?;
        let store = self.store(model);

        if !store.class_exists().await? {
            tracing::debug!(class = store.class(), "no faces registered yet");
            return Ok(vec![Vec::new(); faces.len()]);
        }

        let threshold = model.model_name.threshold(metric);
        let mut batches = Vec::with_capacity(faces.len());
        for face in &faces {
            let neighbors = store.near_vector(&face.embedding.values, self.search_limit).await?;
            batches.push(rank(neighbors, &face.region, metric, threshold));
        }
        Ok(batches)
    }
}

#[async_trait]
impl IdentityService for FaceIdentity {
    async fn register(&self, image: RgbImage, label: &str, model: &ModelConfig) -> anyhow::Result<Value> {
        Ok(self.register_faces(image, label, model).await?)
    }

    async fn search(
        &self,
        image: RgbImage,
        model: &ModelConfig,
        metric: DistanceMetric,
    ) -> anyhow::Result<Vec<Vec<MatchRow>>> {
        Ok(self.search_faces(image, model, metric).await?)
    }
}

/// Convert store neighbors into result rows: re-express the distance in
/// `metric`, keep only rows within `threshold`, closest first.
fn rank(neighbors: Vec<Neighbor>, target: &BoundingBox, metric: DistanceMetric, threshold: f32) -> Vec<MatchRow> {
    let mut rows: Vec<MatchRow> = neighbors
        .into_iter()
        .filter_map(|n| {
            let distance = metric.from_cosine(n.cosine_distance);
            (distance <= threshold).then(|| MatchRow {
                id: n.id,
                img_name: n.img_name,
                model_name: n.model_name,
                distance,
                threshold,
                confidence: confidence(distance, threshold, metric.max_distance()),
                target_x: target.x,
                target_y: target.y,
                target_w: target.width,
                target_h: target.height,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use std::path::PathBuf;

    fn neighbor(name: &str, cosine_distance: f32) -> Neighbor {
        Neighbor {
            id: format!("{name}-id"),
            img_name: name.into(),
            model_name: "Facenet".into(),
            cosine_distance,
        }
    }

    fn target() -> BoundingBox {
        BoundingBox { x: 10.0, y: 20.0, width: 30.0, height: 40.0, confidence: 0.99 }
    }

    fn model_config() -> ModelConfig {
        ModelConfig {
            model_name: ModelName::Facenet,
            store_kind: StoreKind::Weaviate,
            store_address: "http://127.0.0.1:1".into(),
        }
    }

    #[test]
    fn test_rank_filters_and_sorts() {
        let rows = rank(
            vec![neighbor("far", 0.7), neighbor("b", 0.3), neighbor("a", 0.1)],
            &target(),
            DistanceMetric::Cosine,
            0.4,
        );
        let names: Vec<_> = rows.iter().map(|r| r.img_name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(rows[0].confidence > rows[1].confidence);
        assert_eq!(rows[0].target_w, 30.0);
        assert_eq!(rows[0].threshold, 0.4);
    }

    #[test]
    fn test_rank_converts_metric() {
        let rows = rank(vec![neighbor("a", 0.08)], &target(), DistanceMetric::EuclideanL2, 0.8);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].distance - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank(Vec::new(), &target(), DistanceMetric::Cosine, 0.4).is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_surfaces_as_error() {
        let engine = spawn_engine(
            PathBuf::from("/nonexistent/det_10g.onnx"),
            PathBuf::from("/nonexistent/facenet128.onnx"),
            ModelName::Facenet,
        )
        .unwrap();
        let identity = FaceIdentity::new(engine, reqwest::Client::new(), 5);

        let err = identity
            .search(RgbImage::new(8, 8), &model_config(), DistanceMetric::Cosine)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("face models unavailable"), "{err}");

        let err = identity
            .register(RgbImage::new(8, 8), "alice", &model_config())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("face models unavailable"), "{err}");
    }
}
