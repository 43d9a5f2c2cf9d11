//! Qdrant REST backend

use super::{check_dimensions, Distance, Point, PointId, ScoredPoint, VectorIndex};
use crate::error::{MedAssistError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// [`VectorIndex`] over the Qdrant HTTP API
pub struct QdrantIndex {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Dimensions of collections seen so far
    dimensions: RwLock<HashMap<String, usize>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<QdrantPoint>,
}

#[derive(Deserialize)]
struct QdrantPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

impl QdrantIndex {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MedAssistError::Index(format!("failed to build client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            dimensions: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http_client.request(method, self.url(path));
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        collection: &str,
    ) -> Result<T> {
        let response = req
            .send()
            .await
            .map_err(|e| MedAssistError::Index(format!("Qdrant request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MedAssistError::CollectionNotFound(collection.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MedAssistError::Index(format!(
                "Qdrant error (HTTP {}): {}",
                status, body
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| MedAssistError::Index(format!("malformed Qdrant response: {}", e)))?;
        Ok(envelope.result)
    }

    fn cached_dimensions(&self, collection: &str) -> Option<usize> {
        self.dimensions
            .read()
            .ok()
            .and_then(|map| map.get(collection).copied())
    }

    fn remember_dimensions(&self, collection: &str, dimensions: usize) {
        if let Ok(mut map) = self.dimensions.write() {
            map.insert(collection.to_string(), dimensions);
        }
    }

    /// Vector size of an existing collection
    async fn collection_dimensions(&self, collection: &str) -> Result<usize> {
        if let Some(dims) = self.cached_dimensions(collection) {
            return Ok(dims);
        }

        let info: serde_json::Value = self
            .send(
                self.request(reqwest::Method::GET, &format!("collections/{}", collection)),
                collection,
            )
            .await?;
        let dims = info["config"]["params"]["vectors"]["size"]
            .as_u64()
            .ok_or_else(|| {
                MedAssistError::Index(format!("collection {} has no single vector size", collection))
            })? as usize;

        self.remember_dimensions(collection, dims);
        Ok(dims)
    }
}

fn parse_point_id(value: &serde_json::Value) -> Result<PointId> {
    value
        .as_u64()
        .ok_or_else(|| MedAssistError::Index(format!("unsupported point id {}", value)))
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<bool> {
        if self.collection_exists(name).await? {
            return Ok(false);
        }

        let body = json!({
            "vectors": { "size": dimensions, "distance": distance.as_str() }
        });
        let _: serde_json::Value = self
            .send(
                self.request(reqwest::Method::PUT, &format!("collections/{}", name))
                    .json(&body),
                name,
            )
            .await?;

        self.remember_dimensions(name, dimensions);
        tracing::info!("Created Qdrant collection {} ({} dims)", name, dimensions);
        Ok(true)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let result: ExistsResult = self
            .send(
                self.request(reqwest::Method::GET, &format!("collections/{}/exists", name)),
                name,
            )
            .await?;
        Ok(result.exists)
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize> {
        let dimensions = self.collection_dimensions(collection).await?;
        for point in &points {
            check_dimensions(dimensions, &point.vector)?;
        }

        let count = points.len();
        let body = json!({ "points": points });
        let _: serde_json::Value = self
            .send(
                self.request(
                    reqwest::Method::PUT,
                    &format!("collections/{}/points?wait=true", collection),
                )
                .json(&body),
                collection,
            )
            .await?;

        tracing::debug!("Upserted {} points into Qdrant collection {}", count, collection);
        Ok(count)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let dimensions = self.collection_dimensions(collection).await?;
        check_dimensions(dimensions, vector)?;

        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }

        let result: QueryResult = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("collections/{}/points/query", collection),
                )
                .json(&body),
                collection,
            )
            .await?;

        result
            .points
            .into_iter()
            .map(|p| {
                Ok(ScoredPoint {
                    id: parse_point_id(&p.id)?,
                    score: p.score,
                    payload: p.payload.unwrap_or(serde_json::Value::Null),
                })
            })
            .collect()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let result: CountResult = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("collections/{}/points/count", collection),
                )
                .json(&json!({ "exact": true })),
                collection,
            )
            .await?;
        Ok(result.count)
    }

    async fn delete_by_payload(&self, collection: &str, field: &str, value: &str) -> Result<()> {
        let body = json!({
            "filter": {
                "must": [{ "key": field, "match": { "value": value } }]
            }
        });
        let _: serde_json::Value = self
            .send(
                self.request(
                    reqwest::Method::POST,
                    &format!("collections/{}/points/delete?wait=true", collection),
                )
                .json(&body),
                collection,
            )
            .await?;
        tracing::debug!("Deleted points from Qdrant collection {} where {} = {:?}", collection, field, value);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "qdrant"
    }
}
