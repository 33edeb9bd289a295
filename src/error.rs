/// Crate-wide error type.
///
/// Provider failures (embedding model, vector store) keep their own error
/// enums and convert into [`Error`] so the ingestion loop can decide which
/// failures are per-file and which abort the run.
use std::path::PathBuf;

use thiserror::Error;

use crate::embedder::EmbedderError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported file type: {0:?}")]
    UnsupportedFileType(String),

    #[error("required configuration value missing: {0}")]
    ConfigurationMissing(String),

    #[error("invalid chunk parameters: chunk_size={chunk_size}, chunk_overlap={chunk_overlap}")]
    InvalidChunkParameters {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error("index {name:?} mismatch: {detail}")]
    IndexMismatch { name: String, detail: String },

    #[error("failed to load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    #[error("embedding provider: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("vector store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failure came from an external provider call.
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_classification() {
        let err = Error::from(EmbedderError::InferenceFailed("boom".into()));
        assert!(err.is_provider_error());

        let err = Error::from(StoreError::Api {
            status: 500,
            body: "oops".into(),
        });
        assert!(err.is_provider_error());

        assert!(!Error::UnsupportedFileType("xyz".into()).is_provider_error());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::InvalidChunkParameters {
            chunk_size: 10,
            chunk_overlap: 10,
        };
        assert_eq!(
            err.to_string(),
            "invalid chunk parameters: chunk_size=10, chunk_overlap=10"
        );

        let err = Error::load("docs/a.pdf", "bad xref");
        assert_eq!(err.to_string(), "failed to load docs/a.pdf: bad xref");
    }
}
