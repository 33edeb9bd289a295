//! Local vector store on SQLite.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use super::{IndexInfo, IndexSpec, Metric, QueryMatch, StoreError, VectorRecord, VectorStore};
use crate::loader::Metadata;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS indexes (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    metric TEXT NOT NULL,
    cloud TEXT,
    region TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS vectors (
    index_name TEXT NOT NULL,
    id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (index_name, id),
    FOREIGN KEY (index_name) REFERENCES indexes(name) ON DELETE CASCADE
);
"#;

/// A SQLite connection initialized with the vector store schema.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening local vector store: {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Malformed(format!("connection lock poisoned: {e}")))
    }

    /// Number of records stored in `index`.
    pub fn count(&self, index: &str) -> Result<usize, StoreError> {
        let n: i64 = self.conn()?.query_row(
            "SELECT count(*) FROM vectors WHERE index_name = ?",
            params![index],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn read_index(conn: &Connection, name: &str) -> Result<Option<IndexInfo>, StoreError> {
    let row: Option<(String, i64, String)> = conn
        .query_row(
            "SELECT name, dimension, metric FROM indexes WHERE name = ?",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    row.map(|(name, dimension, metric)| {
        Ok(IndexInfo {
            name,
            dimension: dimension as usize,
            metric: metric.parse()?,
            ready: true,
        })
    })
    .transpose()
}

/// Little-endian f32 bytes, four per dimension.
fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn deserialize_vector(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Malformed(format!(
            "embedding blob of {} bytes",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl VectorStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn list_indexes(&self) -> Result<Vec<IndexInfo>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, dimension, metric FROM indexes ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut indexes = Vec::new();
        for row in rows {
            let (name, dimension, metric) = row?;
            indexes.push(IndexInfo {
                name,
                dimension: dimension as usize,
                metric: metric.parse()?,
                ready: true,
            });
        }
        Ok(indexes)
    }

    fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO indexes (name, dimension, metric, cloud, region) VALUES (?, ?, ?, ?, ?)",
            params![
                spec.name,
                spec.dimension as i64,
                spec.metric.as_str(),
                spec.cloud,
                spec.region
            ],
        )?;
        Ok(())
    }

    fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>, StoreError> {
        read_index(&*self.conn()?, name)
    }

    /// Local indexes are usable as soon as they are created.
    fn wait_until_ready(&self, name: &str) -> Result<IndexInfo, StoreError> {
        read_index(&*self.conn()?, name)?.ok_or_else(|| StoreError::IndexNotFound(name.to_string()))
    }

    fn upsert(&self, index: &str, records: &[VectorRecord]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let info = read_index(&conn, index)?
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;

        for record in records {
            if record.values.len() != info.dimension {
                return Err(StoreError::DimensionMismatch {
                    id: record.id.clone(),
                    expected: info.dimension,
                    actual: record.values.len(),
                });
            }
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO vectors (index_name, id, embedding, metadata, updated_at)
                VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(index_name, id) DO UPDATE SET
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;
            for record in records {
                let metadata = serde_json::to_string(&record.metadata)
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                stmt.execute(params![
                    index,
                    record.id,
                    serialize_vector(&record.values),
                    metadata
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let conn = self.conn()?;
        let info = read_index(&conn, index)?
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
        if vector.len() != info.dimension {
            return Err(StoreError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        let mut stmt =
            conn.prepare("SELECT id, embedding, metadata FROM vectors WHERE index_name = ?")?;
        let rows = stmt.query_map(params![index], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut matches = Vec::new();
        for row in rows {
            let (id, blob, metadata) = row?;
            let values = deserialize_vector(&blob)?;
            let metadata: Metadata = serde_json::from_str(&metadata)
                .map_err(|e| StoreError::Malformed(format!("metadata of {id}: {e}")))?;
            matches.push(QueryMatch {
                score: info.metric.score(vector, &values),
                id,
                metadata,
            });
        }

        sort_matches(&mut matches, info.metric);
        matches.truncate(top_k);
        Ok(matches)
    }
}

fn sort_matches(matches: &mut [QueryMatch], metric: Metric) {
    if metric.higher_is_closer() {
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    } else {
        matches.sort_by(|a, b| a.score.total_cmp(&b.score));
    }
}
