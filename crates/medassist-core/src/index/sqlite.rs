//! Local vector index on SQLite
//!
//! Vectors are stored as little-endian f32 BLOBs; similarity is computed in Rust.

use super::{check_dimensions, Distance, Point, PointId, ScoredPoint, VectorIndex};
use crate::error::{MedAssistError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimensions INTEGER NOT NULL,
    distance TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS points (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id INTEGER NOT NULL,
    vector BLOB NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);
"#;

/// SQLite-backed [`VectorIndex`]
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open index at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::initialize(conn)
    }

    /// Open in-memory index (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MedAssistError::Index("index connection lock poisoned".to_string()))
    }

    fn collection_info(conn: &Connection, name: &str) -> Result<Option<(usize, Distance)>> {
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT dimensions, distance FROM collections WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((dims, distance)) => {
                let distance = Distance::parse(&distance).ok_or_else(|| {
                    MedAssistError::Index(format!("unknown distance '{}' for {}", distance, name))
                })?;
                Ok(Some((dims as usize, distance)))
            }
        }
    }

    fn require_collection(conn: &Connection, name: &str) -> Result<(usize, Distance)> {
        Self::collection_info(conn, name)?
            .ok_or_else(|| MedAssistError::CollectionNotFound(name.to_string()))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<bool> {
        let conn = self.lock()?;
        if let Some((existing, _)) = Self::collection_info(&conn, name)? {
            if existing != dimensions {
                tracing::warn!(
                    "Collection {} exists with {} dimensions (requested {})",
                    name,
                    existing,
                    dimensions
                );
            }
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO collections (name, dimensions, distance, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                dimensions as i64,
                distance.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        tracing::info!("Created collection {} ({} dims, {})", name, dimensions, distance.as_str());
        Ok(true)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        Ok(Self::collection_info(&conn, name)?.is_some())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize> {
        let mut conn = self.lock()?;
        let (dimensions, _) = Self::require_collection(&conn, collection)?;
        for point in &points {
            check_dimensions(dimensions, &point.vector)?;
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO points (collection, id, vector, payload)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for point in &points {
                stmt.execute(params![
                    collection,
                    point.id as i64,
                    vector_to_bytes(&point.vector),
                    serde_json::to_string(&point.payload)?,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Upserted {} points into {}", points.len(), collection);
        Ok(points.len())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let conn = self.lock()?;
        let (dimensions, distance) = Self::require_collection(&conn, collection)?;
        check_dimensions(dimensions, vector)?;

        let mut stmt = conn.prepare("SELECT id, vector, payload FROM points WHERE collection = ?1")?;
        let rows = stmt
            .query_map(params![collection], |row| {
                let id: i64 = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                let payload: String = row.get(2)?;
                Ok((id as PointId, bytes_to_vector(&bytes), payload))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut scored = Vec::new();
        for (id, stored, payload) in rows {
            let score = distance.score(vector, &stored);
            if score_threshold.is_some_and(|t| score < t) {
                continue;
            }
            scored.push(ScoredPoint {
                id,
                score,
                payload: serde_json::from_str(&payload)?,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.lock()?;
        Self::require_collection(&conn, collection)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn delete_by_payload(&self, collection: &str, field: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::require_collection(&conn, collection)?;
        let removed = conn.execute(
            "DELETE FROM points WHERE collection = ?1 AND json_extract(payload, ?2) = ?3",
            params![collection, format!("$.\"{}\"", field), value],
        )?;
        tracing::debug!("Deleted {} points from {} where {} = {:?}", removed, collection, field, value);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

/// Convert f32 vector to bytes for storage
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 vector
pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
