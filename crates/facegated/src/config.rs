use facegate_core::{DistanceMetric, ModelName};
use facegate_store::StoreKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::identity::ModelConfig;

/// Representation model used for every request.
pub const MODEL_NAME: ModelName = ModelName::Facenet;
/// Backing store used for every request.
pub const STORE_KIND: StoreKind = StoreKind::Weaviate;
/// Distance metric used by `/search`.
pub const DISTANCE_METRIC: DistanceMetric = DistanceMetric::Cosine;

const DEFAULT_CONNECTION_DETAILS: &str = "http://weaviate_db:8080";

/// Daemon configuration, loaded once from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model, store type and store address forwarded with each identity call.
    pub model: ModelConfig,
    /// Listen address (default: 0.0.0.0:8000).
    pub bind_addr: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Stored neighbors fetched per query face.
    pub search_limit: usize,
    /// Upper bound on request bodies.
    pub max_upload_bytes: usize,
    /// Whether 500 responses carry the identity-service error text.
    pub expose_backend_errors: bool,
}

impl Config {
    /// Load configuration from `DEEPFACE_CONNECTION_DETAILS` and `FACEGATE_*`
    /// environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let store_address = lookup("DEEPFACE_CONNECTION_DETAILS")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONNECTION_DETAILS.to_string());

        let default_bind = SocketAddr::from(([0, 0, 0, 0], 8000));

        Self {
            model: ModelConfig {
                model_name: MODEL_NAME,
                store_kind: STORE_KIND,
                store_address,
            },
            bind_addr: parse_or(&lookup, "FACEGATE_BIND", default_bind),
            model_dir: lookup("FACEGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facegate_core::default_model_dir),
            search_limit: parse_or(&lookup, "FACEGATE_SEARCH_LIMIT", 10usize).max(1),
            max_upload_bytes: parse_or(&lookup, "FACEGATE_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
            expose_backend_errors: lookup("FACEGATE_EXPOSE_BACKEND_ERRORS")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(facegate_core::detector::SCRFD_MODEL_FILE)
    }

    /// Path to the representation model.
    pub fn representer_model_path(&self) -> PathBuf {
        self.model_dir.join(self.model.model_name.onnx_file())
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable setting, using default");
            default
        }),
        None => default,
    }
}
