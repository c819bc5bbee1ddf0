use crate::StoreError;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Properties stored alongside each face vector.
#[derive(Debug, Clone, Serialize)]
pub struct FaceRecord {
    pub img_name: String,
    pub model_name: String,
    pub face_confidence: f32,
    pub created_at: DateTime<Utc>,
}

/// A stored face returned by a near-vector query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub img_name: String,
    pub model_name: String,
    /// Weaviate cosine distance, in [0, 2].
    pub cosine_distance: f32,
}

/// Weaviate class holding the embeddings of one model.
///
/// Class names must start with an uppercase letter and contain only
/// `[A-Za-z0-9_]`.
pub fn class_name(model: &str) -> String {
    let sanitized: String = model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("Embeddings_{sanitized}")
}

/// Client for one embeddings class on a Weaviate instance.
#[derive(Clone)]
pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    class: String,
}

impl WeaviateStore {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            class: class_name(model),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub async fn class_exists(&self) -> Result<bool, StoreError> {
        let url = format!("{}/v1/schema/{}", self.base_url, self.class);
        let resp = self.client.get(&url).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(status_error(status, resp).await),
        }
    }

    /// Create the class if it does not exist yet. Vectors are supplied by the
    /// caller and indexed with cosine distance.
    pub async fn ensure_class(&self) -> Result<(), StoreError> {
        if self.class_exists().await? {
            return Ok(());
        }

        let schema = json!({
            "class": self.class,
            "vectorizer": "none",
            "vectorIndexConfig": { "distance": "cosine" },
            "properties": [
                { "name": "img_name", "dataType": ["text"] },
                { "name": "model_name", "dataType": ["text"] },
                { "name": "face_confidence", "dataType": ["number"] },
                { "name": "created_at", "dataType": ["date"] },
            ],
        });

        let url = format!("{}/v1/schema", self.base_url);
        let resp = self.client.post(&url).json(&schema).send().await?;
        let status = resp.status();
        if status.is_success() {
            tracing::info!(class = %self.class, "created weaviate class");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        // A concurrent writer created it between our check and our create.
        if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already exists") {
            tracing::debug!(class = %self.class, "weaviate class created concurrently");
            return Ok(());
        }
        Err(StoreError::Status { status: status.as_u16(), body })
    }

    /// Insert one face vector, returning the new object id.
    pub async fn insert(&self, record: &FaceRecord, vector: &[f32]) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let object = json!({
            "class": self.class,
            "id": id,
            "properties": record,
            "vector": vector,
        });

        let url = format!("{}/v1/objects", self.base_url);
        let resp = self.client.post(&url).json(&object).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), resp).await);
        }

        tracing::debug!(class = %self.class, %id, img_name = %record.img_name, "inserted face vector");
        Ok(id)
    }

    /// Nearest stored faces to `vector`, closest first, at most `limit`.
    pub async fn near_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>, StoreError> {
        let query = near_vector_query(&self.class, vector, limit);
        let url = format!("{}/v1/graphql", self.base_url);
        let resp = self.client.post(&url).json(&json!({ "query": query })).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), resp).await);
        }

        let body: GraphQlResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        parse_neighbors(body, &self.class)
    }
}

fn near_vector_query(class: &str, vector: &[f32], limit: usize) -> String {
    let vector = serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{{ Get {{ {class}(nearVector: {{ vector: {vector} }}, limit: {limit}) \
         {{ img_name model_name _additional {{ id distance }} }} }} }}"
    )
}

async fn status_error(status: StatusCode, resp: reqwest::Response) -> StoreError {
    StoreError::Status {
        status: status.as_u16(),
        body: resp.text().await.unwrap_or_default(),
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlData {
    #[serde(rename = "Get")]
    get: HashMap<String, Option<Vec<RawNeighbor>>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct RawNeighbor {
    img_name: Option<String>,
    model_name: Option<String>,
    #[serde(rename = "_additional")]
    additional: Additional,
}

#[derive(Deserialize)]
struct Additional {
    id: String,
    distance: f32,
}

fn parse_neighbors(body: GraphQlResponse, class: &str) -> Result<Vec<Neighbor>, StoreError> {
    if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
        let message = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
        return Err(StoreError::Query(message));
    }

    let mut get = body
        .data
        .ok_or_else(|| StoreError::Malformed("missing data".into()))?
        .get;
    let rows = get.remove(class).flatten().unwrap_or_default();

    Ok(rows
        .into_iter()
        .map(|raw| Neighbor {
            id: raw.additional.id,
            img_name: raw.img_name.unwrap_or_default(),
            model_name: raw.model_name.unwrap_or_default(),
            cosine_distance: raw.additional.distance,
        })
        .collect())
}
