//! Pinecone serverless client over the REST API.
//!
//! Index management goes through the control plane; upserts and queries go
//! to the per-index host reported by `describe_index`, which is cached.
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{IndexInfo, IndexSpec, Metric, QueryMatch, StoreError, VectorRecord, VectorStore};
use crate::loader::Metadata;

pub const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
pub const API_VERSION: &str = "2024-07";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct PineconeStore {
    client: Client,
    api_key: String,
    control_url: String,
    hosts: Mutex<HashMap<String, String>>,
    ready_timeout: Duration,
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    metric: Metric,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl From<IndexModel> for IndexInfo {
    fn from(model: IndexModel) -> Self {
        Self {
            name: model.name,
            dimension: model.dimension,
            metric: model.metric,
            ready: model.status.ready,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

impl<'a> From<&'a IndexSpec> for CreateIndexRequest<'a> {
    fn from(spec: &'a IndexSpec) -> Self {
        Self {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredVector>,
}

#[derive(Debug, Deserialize)]
struct ScoredVector {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl From<ScoredVector> for QueryMatch {
    fn from(v: ScoredVector) -> Self {
        Self {
            id: v.id,
            score: v.score,
            metadata: v.metadata.unwrap_or_default(),
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────

impl PineconeStore {
    pub fn new(
        api_key: impl Into<String>,
        request_timeout: Duration,
        ready_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            control_url: CONTROL_PLANE_URL.to_string(),
            hosts: Mutex::new(HashMap::new()),
            ready_timeout,
        })
    }

    /// Point the control plane at another base URL (local emulators).
    #[must_use]
    pub fn with_control_url(mut self, url: impl Into<String>) -> Self {
        self.control_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn fetch_index(&self, name: &str) -> Result<Option<IndexModel>, StoreError> {
        let url = format!("{}/indexes/{name}", self.control_url);
        let resp = self.authorized(self.client.get(&url)).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let model: IndexModel = check(resp)?.json()?;
        if let Some(host) = &model.host {
            self.remember_host(name, host);
        }
        Ok(Some(model))
    }

    fn remember_host(&self, name: &str, host: &str) {
        if let Ok(mut hosts) = self.hosts.lock() {
            hosts.insert(name.to_string(), normalize_host(host));
        }
    }

    fn data_url(&self, index: &str, path: &str) -> Result<String, StoreError> {
        let cached = self
            .hosts
            .lock()
            .ok()
            .and_then(|hosts| hosts.get(index).cloned());

        let host = match cached {
            Some(host) => host,
            None => {
                let model = self
                    .fetch_index(index)?
                    .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))?;
                let host = model.host.ok_or_else(|| {
                    StoreError::Malformed(format!("index {index} has no host"))
                })?;
                normalize_host(&host)
            }
        };
        Ok(format!("{host}{path}"))
    }
}

fn check(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        body,
    })
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    fn list_indexes(&self) -> Result<Vec<IndexInfo>, StoreError> {
        let url = format!("{}/indexes", self.control_url);
        let list: IndexList = check(self.authorized(self.client.get(&url)).send()?)?.json()?;
        Ok(list
            .indexes
            .into_iter()
            .map(|model| {
                if let Some(host) = &model.host {
                    self.remember_host(&model.name, host);
                }
                IndexInfo::from(model)
            })
            .collect())
    }

    fn create_index(&self, spec: &IndexSpec) -> Result<(), StoreError> {
        let url = format!("{}/indexes", self.control_url);
        let resp = self
            .authorized(self.client.post(&url))
            .json(&CreateIndexRequest::from(spec))
            .send()?;

        // Another process may have created it between list and create
        if resp.status() == StatusCode::CONFLICT {
            info!("Index {} already exists", spec.name);
        } else {
            check(resp)?;
            info!("Created index {}, waiting until ready", spec.name);
        }

        self.wait_until_ready(&spec.name).map(|_| ())
    }

    fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>, StoreError> {
        Ok(self.fetch_index(name)?.map(IndexInfo::from))
    }

    fn wait_until_ready(&self, name: &str) -> Result<IndexInfo, StoreError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if let Some(model) = self.fetch_index(name)? {
                if model.status.ready {
                    return Ok(IndexInfo::from(model));
                }
            }
            if Instant::now() >= deadline {
                return Err(StoreError::NotReady(name.to_string()));
            }
            debug!("Waiting for index {name} to become ready");
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn upsert(&self, index: &str, records: &[VectorRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let url = self.data_url(index, "/vectors/upsert")?;
        let resp: UpsertResponse = check(
            self.authorized(self.client.post(&url))
                .json(&UpsertRequest { vectors: records })
                .send()?,
        )?
        .json()?;
        Ok(resp.upserted_count)
    }

    fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let url = self.data_url(index, "/query")?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };
        let resp: QueryResponse = check(
            self.authorized(self.client.post(&url))
                .json(&request)
                .send()?,
        )?
        .json()?;
        Ok(resp.matches.into_iter().map(QueryMatch::from).collect())
    }
}
