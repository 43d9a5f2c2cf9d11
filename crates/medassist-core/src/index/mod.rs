//! Vector index: storage contract, backends, chunking and ingestion

mod chunker;
mod ingest;
mod qdrant;
mod sqlite;

pub use chunker::{chunk_by_tokens, token_count, truncate_to_tokens, MAX_CHUNK_TOKENS};
pub use ingest::{
    demo_doctors, ingest_articles, ingest_doctors, load_doctor_records, load_rss_articles,
    DoctorRecord, IngestReport, KnowledgeArticle,
};
pub use qdrant::QdrantIndex;
pub use sqlite::SqliteIndex;

use crate::config::{VectorBackend, VectorStoreConfig};
use crate::error::{MedAssistError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Point identifier; stable across re-ingestion
pub type PointId = u64;

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
}

impl Distance {
    pub fn as_str(self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Cosine" | "cosine" => Some(Distance::Cosine),
            "Dot" | "dot" => Some(Distance::Dot),
            _ => None,
        }
    }

    /// Higher is more similar for both metrics
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Dot => dot_product(a, b),
        }
    }
}

/// A vector with its payload, ready to store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// A stored point matched by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// Vector database contract
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if absent. Returns true when it was created.
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<bool>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Insert or overwrite points by id
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize>;

    /// Top `limit` points by descending score, excluding scores below `score_threshold`
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>>;

    async fn count(&self, collection: &str) -> Result<usize>;

    /// Remove every point whose string payload `field` equals `value`
    async fn delete_by_payload(&self, collection: &str, field: &str, value: &str) -> Result<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &str;
}

/// Open the configured backend
pub fn open_index(config: &VectorStoreConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend {
        VectorBackend::Sqlite => {
            tracing::info!("Opening SQLite vector index at {}", config.sqlite_path.display());
            Ok(Arc::new(SqliteIndex::open(&config.sqlite_path)?))
        }
        VectorBackend::Qdrant => {
            tracing::info!("Using Qdrant at {}", config.qdrant_url);
            Ok(Arc::new(QdrantIndex::new(
                &config.qdrant_url,
                config.qdrant_api_key.clone(),
            )?))
        }
    }
}

/// Stable point id from `(collection, source key, chunk index)`
pub fn point_id(collection: &str, source_key: &str, chunk_index: usize) -> PointId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(collection.as_bytes());
    hasher.update(&[0]);
    hasher.update(source_key.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(chunk_index as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    // Ids must fit a SQLite INTEGER
    u64::from_le_bytes(bytes) >> 1
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn check_dimensions(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(MedAssistError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}
