/// Configuration module for legalbot.
///
/// Handles loading, validating, and providing default configuration values.
/// Credentials never live in the config file; see [`Config::api_key`].
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedder::download;
use crate::error::Error;
use crate::indexer::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
use crate::store::{IndexSpec, Metric};

pub const DEFAULT_CONFIG_PATH: &str = "legalbot.json";
pub const API_KEY_VAR: &str = "PINECONE_API_KEY";

// ── Default value functions ──────────────────────────────────────────

fn default_data_dir() -> String {
    "pineconedata".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_index_name() -> String {
    "legal-chatbot".to_string()
}

fn default_dimensions() -> usize {
    crate::embedder::MINILM_DIMENSIONS
}

fn default_metric() -> Metric {
    Metric::Cosine
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_sqlite_path() -> String {
    "./vectors.db".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_ready_timeout_secs() -> u64 {
    120
}

fn default_model_name() -> String {
    download::DEFAULT_MODEL_NAME.to_string()
}

fn default_embed_batch_size() -> usize {
    crate::indexer::core::DEFAULT_BATCH_SIZE
}

fn default_search_top_k() -> usize {
    5
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Directory whose files are ingested.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Optional JSON override of the keyword lists and templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimension: usize,

    #[serde(default = "default_metric")]
    pub metric: Metric,

    #[serde(default = "default_cloud")]
    pub cloud: String,

    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Pinecone,
    Sqlite,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long to wait for a newly created index to become ready.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Where model files live; the per-user cache when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            store: StoreConfig::default(),
            model: ModelConfig::default(),
            embed_batch_size: default_embed_batch_size(),
            search_top_k: default_search_top_k(),
            profile_path: None,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            dimension: default_dimensions(),
            metric: default_metric(),
            cloud: default_cloud(),
            region: default_region(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            sqlite_path: default_sqlite_path(),
            request_timeout_secs: default_request_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
            model_dir: None,
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `legalbot.json`. A missing file
    /// yields the defaults (and a generated template for the default path);
    /// invalid JSON is logged and also yields the defaults.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.chunking.chunk_size > 0,
            "chunking.chunk_size must be positive"
        );
        anyhow::ensure!(
            self.chunking.chunk_overlap < self.chunking.chunk_size,
            "chunking.chunk_overlap must be smaller than chunking.chunk_size"
        );
        anyhow::ensure!(self.index.dimension > 0, "index.dimension must be positive");
        anyhow::ensure!(
            self.model.dimensions == self.index.dimension,
            "model.dimensions ({}) must equal index.dimension ({})",
            self.model.dimensions,
            self.index.dimension
        );
        anyhow::ensure!(self.embed_batch_size > 0, "embed_batch_size must be positive");
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(!self.data_dir.is_empty(), "data_dir must not be empty");

        // Serverless index names: lowercase alphanumerics and inner hyphens
        let name_pattern = Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,43}[a-z0-9])?$")
            .context("invalid index name pattern")?;
        anyhow::ensure!(
            name_pattern.is_match(&self.index.name),
            "index.name {:?} must be 1-45 lowercase letters, digits or hyphens",
            self.index.name
        );
        Ok(())
    }

    /// The configured splitter; invalid chunk parameters are an error.
    pub fn splitter(&self) -> crate::error::Result<TextSplitter> {
        TextSplitter::new(self.chunking.chunk_size, self.chunking.chunk_overlap)
    }

    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            name: self.index.name.clone(),
            dimension: self.index.dimension,
            metric: self.index.metric,
            cloud: self.index.cloud.clone(),
            region: self.index.region.clone(),
        }
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.model
            .model_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(download::default_model_dir)
    }

    /// The Pinecone API key from the process environment.
    pub fn api_key(&self) -> crate::error::Result<String> {
        api_key_from(|name| std::env::var(name).ok())
    }
}

/// Look up the API key through `lookup`; blank values count as missing.
pub fn api_key_from<F>(lookup: F) -> crate::error::Result<String>
where
    F: FnOnce(&str) -> Option<String>,
{
    match lookup(API_KEY_VAR) {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::ConfigurationMissing(API_KEY_VAR.to_string())),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
