//! Vector store abstraction.
//!
//! Two backends implement [`VectorStore`]: [`pinecone::PineconeStore`] talks
//! to the hosted service over REST, [`sqlite::SqliteStore`] keeps indexes in a
//! local SQLite file and answers queries by brute-force scan.

pub mod pinecone;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::loader::Metadata;

/// Metadata key holding the chunk text of a stored record.
pub const TEXT_KEY: &str = "text";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("record {id} has {actual} dimensions, index expects {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("index {0} did not become ready in time")]
    NotReady(String),

    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Similarity metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Dotproduct,
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dotproduct => "dotproduct",
            Self::Euclidean => "euclidean",
        }
    }

    /// Score two vectors. Higher is closer for cosine and dot product;
    /// euclidean returns the squared distance, where lower is closer.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    0.0
                } else {
                    dot / (na * nb)
                }
            }
            Self::Dotproduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        }
    }

    pub fn higher_is_closer(&self) -> bool {
        !matches!(self, Self::Euclidean)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dotproduct" => Ok(Self::Dotproduct),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(StoreError::Malformed(format!("unknown metric {other:?}"))),
        }
    }
}

/// Desired configuration of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
}

/// An index as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl QueryMatch {
    /// The chunk text stored alongside the vector.
    pub fn text(&self) -> Option<&str> {
        self.metadata.get(TEXT_KEY).and_then(Value::as_str)
    }
}

/// Operations the ingestion and retrieval code needs from a vector store.
pub trait VectorStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    fn list_indexes(&self) -> Result<Vec<IndexInfo>, StoreError>;

    /// Create an index. Implementations wait until it can accept writes.
    fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError>;

    fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>, StoreError>;

    /// Block until the index reports ready and return its description.
    fn wait_until_ready(&self, name: &str) -> Result<IndexInfo, StoreError>;

    /// Insert or overwrite records by id; returns the number written.
    fn upsert(&self, index: &str, records: &[VectorRecord]) -> Result<usize, StoreError>;

    /// Nearest records to `vector`, closest first.
    fn query(&self, index: &str, vector: &[f32], top_k: usize)
    -> Result<Vec<QueryMatch>, StoreError>;
}
