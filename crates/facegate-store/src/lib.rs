//! facegate-store — Vector store access for face embeddings.
//!
//! Talks to Weaviate over its REST and GraphQL endpoints. Similarity search
//! and indexing happen inside Weaviate; this crate only shapes requests and
//! responses.

pub mod weaviate;

pub use weaviate::{class_name, FaceRecord, Neighbor, WeaviateStore};

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("weaviate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("weaviate returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("weaviate query failed: {0}")]
    Query(String),
    #[error("unexpected weaviate response: {0}")]
    Malformed(String),
}

/// Backing-store flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Weaviate,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Weaviate => "weaviate",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_name() {
        assert_eq!(StoreKind::Weaviate.as_str(), "weaviate");
        assert_eq!(StoreKind::Weaviate.to_string(), "weaviate");
    }
}
