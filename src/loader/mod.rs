//! Document loading: extension dispatch over a closed set of formats.
//!
//! Every loader returns a list of [`Document`]s carrying at least a `source`
//! metadata entry. PDFs yield one document per page; the other formats yield
//! a single document per file.

mod docx;
mod html;
mod pdf;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Metadata attached to documents and inherited by their chunks.
pub type Metadata = BTreeMap<String, Value>;

/// A unit of loaded text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, source: &Path) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(
            "source".to_string(),
            Value::String(source.to_string_lossy().replace('\\', "/")),
        );
        Self {
            content: content.into(),
            metadata,
        }
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The `source` metadata entry, if present.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

/// Supported input formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Html,
    Text,
    /// Anything else; carries the lowercased extension (empty when absent).
    Unsupported(String),
}

impl FileKind {
    /// Classify a path by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "html" | "htm" => Self::Html,
            "txt" => Self::Text,
            _ => Self::Unsupported(ext),
        }
    }
}

/// Load a file into documents, dispatching on its extension.
pub fn load_document(path: &Path) -> Result<Vec<Document>> {
    match FileKind::from_path(path) {
        FileKind::Pdf => pdf::load(path),
        FileKind::Docx => docx::load(path),
        FileKind::Html => html::load(path),
        FileKind::Text => load_text(path),
        FileKind::Unsupported(ext) => Err(Error::UnsupportedFileType(format!(".{ext}"))),
    }
}

fn load_text(path: &Path) -> Result<Vec<Document>> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8(bytes).map_err(|e| Error::load(path, e))?;
    Ok(vec![Document::new(content, path)])
}
