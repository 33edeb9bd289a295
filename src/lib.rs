//! # legalbot: legal research RAG toolkit
//!
//! Loads legal documents, splits them into overlapping chunks, embeds them
//! with `all-MiniLM-L6-v2` and upserts them into a vector index. Queries are
//! screened by a keyword classifier that picks between the legal assistant
//! system prompt and a fixed refusal.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with defaults and validation
//! - **[`loader`]**: Extension dispatch to PDF, DOCX, HTML and text loaders
//! - **[`indexer`]**: Recursive chunking and the ingestion workflow
//! - **[`embedder`]**: Text embedding via ONNX Runtime (all-MiniLM-L6-v2)
//! - **[`store`]**: Vector stores: Pinecone over REST, local SQLite
//! - **[`legal`]**: Query classifier, system prompt and refusal templates

pub mod config;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod legal;
pub mod loader;
pub mod store;

pub use error::{Error, Result};
