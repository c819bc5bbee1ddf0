//! HTTP surface: `GET /`, `POST /register`, `POST /search`.

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::MatchRow;
use image::RgbImage;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, DISTANCE_METRIC};
use crate::decode::decode_image;
use crate::error::GatewayError;
use crate::identity::IdentityService;

pub const HEALTH_MESSAGE: &str = "DeepFace API is running";

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn IdentityService>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/register", post(register))
        .route("/search", post(search))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    status: &'static str,
    result: Value,
}

/// Public projection of a result row.
#[derive(Debug, Serialize, PartialEq)]
struct Match {
    img_name: String,
    distance: f32,
    confidence: f32,
}

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Self {
        Self {
            img_name: row.img_name,
            distance: row.distance,
            confidence: row.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    matches: Vec<Match>,
}

async fn root() -> Json<Value> {
    Json(json!({ "message": HEALTH_MESSAGE }))
}

async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RegisterResponse>, GatewayError> {
    let UploadForm { img_name, file } = UploadForm::read(multipart).await?;
    let label = required(img_name.filter(|name| !name.is_empty()), "img_name")?;
    let image = decode(required(file, "file")?).await?;

    let result = state
        .service
        .register(image, &label, &state.config.model)
        .await
        .map_err(|e| GatewayError::backend(e, state.config.expose_backend_errors))?;

    tracing::info!(img_name = %label, "register: ok");
    Ok(Json(RegisterResponse { status: "success", result }))
}

async fn search(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SearchResponse>, GatewayError> {
    let form = UploadForm::read(multipart).await?;
    let image = decode(required(form.file, "file")?).await?;

    let batches = state
        .service
        .search(image, &state.config.model, DISTANCE_METRIC)
        .await
        .map_err(|e| GatewayError::backend(e, state.config.expose_backend_errors))?;

    let matches = flatten_batches(batches);
    tracing::info!(matches = matches.len(), "search: ok");
    Ok(Json(SearchResponse { matches }))
}

/// Concatenate batches in order, skipping empty ones, keeping row order.
fn flatten_batches(batches: Vec<Vec<MatchRow>>) -> Vec<Match> {
    batches
        .into_iter()
        .filter(|batch| !batch.is_empty())
        .flatten()
        .map(Match::from)
        .collect()
}

/// Decode off the async workers; large images take a while.
async fn decode(bytes: Bytes) -> Result<RgbImage, GatewayError> {
    let decoded = tokio::task::spawn_blocking(move || decode_image(&bytes))
        .await
        .map_err(|e| GatewayError::Backend(format!("image decoder task failed: {e}")))?;
    Ok(decoded?)
}

#[derive(Default)]
struct UploadForm {
    img_name: Option<String>,
    file: Option<Bytes>,
}

impl UploadForm {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, GatewayError> {
        let mut multipart = multipart.map_err(|rejection| GatewayError::Form(rejection.body_text()))?;
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await.map_err(form_error)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("img_name") => form.img_name = Some(field.text().await.map_err(form_error)?),
                Some("file") => form.file = Some(field.bytes().await.map_err(form_error)?),
                _ => {}
            }
        }
        Ok(form)
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, GatewayError> {
    value.ok_or_else(|| GatewayError::Form(format!("field required: {field}")))
}

/// Body-limit overruns keep their 413; everything else is a malformed form.
fn form_error(err: MultipartError) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::debug!(error = %err, "upload over body limit");
        GatewayError::PayloadTooLarge
    } else {
        GatewayError::Form(err.body_text())
    }
}
