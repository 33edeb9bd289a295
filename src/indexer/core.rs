use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::embedder::{Embedder, EmbedderError};
use crate::error::{Error, Result};
use crate::indexer::splitter::{Chunk, TextSplitter};
use crate::loader;
use crate::store::{IndexInfo, IndexSpec, StoreError, TEXT_KEY, VectorRecord, VectorStore};

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// What `ensure_index` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Indexed {
        documents: usize,
        chunks: usize,
        upserted: usize,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Indexed { .. })
    }
}

/// Per-file results of one ingestion run, in processing order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files: Vec<FileOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    pub fn total_chunks(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.status {
                FileStatus::Indexed { chunks, .. } => chunks,
                FileStatus::Failed(_) => 0,
            })
            .sum()
    }
}

/// Load → chunk → embed → upsert pipeline over one target index.
pub struct Indexer<'a, E: Embedder + ?Sized, S: VectorStore + ?Sized> {
    pub embedder: &'a E,
    pub store: &'a S,
    pub splitter: TextSplitter,
    pub index: IndexSpec,
    pub batch_size: usize,
}

impl<'a, E: Embedder + ?Sized, S: VectorStore + ?Sized> Indexer<'a, E, S> {
    pub fn new(embedder: &'a E, store: &'a S, splitter: TextSplitter, index: IndexSpec) -> Self {
        Self {
            embedder,
            store,
            splitter,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create the target index unless an index with that name exists.
    ///
    /// An existing index must agree with the configured dimension and
    /// metric, and the embedder must produce vectors of that dimension.
    pub fn ensure_index(&self) -> Result<EnsureOutcome> {
        let spec = &self.index;
        if self.embedder.dimensions() != spec.dimension {
            return Err(Error::IndexMismatch {
                name: spec.name.clone(),
                detail: format!(
                    "embedder produces {} dimensions, index is configured for {}",
                    self.embedder.dimensions(),
                    spec.dimension
                ),
            });
        }

        let existing = self
            .store
            .list_indexes()?
            .into_iter()
            .find(|info| info.name == spec.name);

        match existing {
            None => {
                info!(
                    "Creating index {} ({} dims, {}) on {}",
                    spec.name,
                    spec.dimension,
                    spec.metric,
                    self.store.name()
                );
                self.store.create_index(spec)?;
                // A concurrent creator may have won with another shape
                let info = self.store.wait_until_ready(&spec.name)?;
                self.verify_shape(&info)?;
                Ok(EnsureOutcome::Created)
            }
            Some(info) => {
                self.verify_shape(&info)?;
                if !info.ready {
                    info!("Index {} exists, waiting until ready", spec.name);
                    self.store.wait_until_ready(&spec.name)?;
                }
                info!("Index {} already exists", spec.name);
                Ok(EnsureOutcome::AlreadyExists)
            }
        }
    }

    fn verify_shape(&self, info: &IndexInfo) -> Result<()> {
        let spec = &self.index;
        let detail = if info.dimension != spec.dimension {
            format!(
                "existing index has {} dimensions, expected {}",
                info.dimension, spec.dimension
            )
        } else if info.metric != spec.metric {
            format!(
                "existing index uses {} metric, expected {}",
                info.metric, spec.metric
            )
        } else {
            return Ok(());
        };
        Err(Error::IndexMismatch {
            name: spec.name.clone(),
            detail,
        })
    }

    /// Ingest every regular file directly inside `dir`, sorted by path.
    ///
    /// Failures are recorded per file and never stop the run. Only a missing
    /// or unreadable directory is an error. The directory is canonicalized
    /// first, so each file's `source` does not depend on how `dir` is spelled.
    pub fn ingest_directory<P: AsRef<Path>>(&self, dir: P) -> Result<IngestReport> {
        let dir = fs::canonicalize(dir.as_ref())?;
        let dir = dir.as_path();
        if !fs::metadata(dir)?.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", dir.display()),
            )));
        }

        let mut report = IngestReport::default();
        for path in list_files(dir) {
            let outcome = self.ingest_path(&path);
            report.files.push(outcome);
        }

        info!(
            "Ingestion finished: {} succeeded, {} failed, {} chunks",
            report.succeeded(),
            report.failed(),
            report.total_chunks()
        );
        Ok(report)
    }

    /// Ingest one file, converting any error into a failed outcome.
    pub fn ingest_path(&self, path: &Path) -> FileOutcome {
        let status = match self.ingest_file(path) {
            Ok(status) => {
                if let FileStatus::Indexed {
                    documents,
                    chunks,
                    upserted,
                } = status
                {
                    info!(
                        "Indexed {}: {documents} documents, {chunks} chunks, {upserted} upserted",
                        path.display()
                    );
                }
                status
            }
            Err(e) => {
                error!("Failed to ingest {}: {e}", path.display());
                FileStatus::Failed(e.to_string())
            }
        };
        FileOutcome {
            path: path.to_path_buf(),
            status,
        }
    }

    /// Load, split, embed and upsert a single file.
    pub fn ingest_file(&self, path: &Path) -> Result<FileStatus> {
        let documents = loader::load_document(path)?;
        let chunks = self.splitter.split_documents(&documents);
        debug!(
            "{}: {} documents, {} chunks",
            path.display(),
            documents.len(),
            chunks.len()
        );

        let mut upserted = 0;
        for batch in chunks.chunks(self.batch_size) {
            upserted += self.upsert_batch(batch)?;
        }

        Ok(FileStatus::Indexed {
            documents: documents.len(),
            chunks: chunks.len(),
            upserted,
        })
    }

    fn upsert_batch(&self, batch: &[Chunk]) -> Result<usize> {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != batch.len() {
            return Err(EmbedderError::InferenceFailed(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            ))
            .into());
        }

        let mut records = Vec::with_capacity(batch.len());
        for (chunk, values) in batch.iter().zip(vectors) {
            let id = record_id(chunk);
            if values.len() != self.index.dimension {
                return Err(StoreError::DimensionMismatch {
                    id,
                    expected: self.index.dimension,
                    actual: values.len(),
                }
                .into());
            }
            let mut metadata = chunk.metadata.clone();
            metadata.insert(TEXT_KEY.to_string(), Value::String(chunk.content.clone()));
            records.push(VectorRecord {
                id,
                values,
                metadata,
            });
        }

        Ok(self.store.upsert(&self.index.name, &records)?)
    }
}

/// Regular files directly inside `dir`, hidden ones included, sorted.
fn list_files(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .max_depth(Some(1))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry: {e}"),
        }
    }
    files.sort();
    files
}

/// Stable record id: SHA-256 of source, page and chunk ordinal.
///
/// Re-ingesting an unchanged file therefore overwrites its records.
pub fn record_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    let source = chunk
        .metadata
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or_default();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    if let Some(page) = chunk.metadata.get("page") {
        hasher.update(page.to_string().as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(chunk.position.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::loader::Metadata;
    use crate::store::sqlite::SqliteStore;
    use crate::store::{Metric, QueryMatch};
    use std::sync::Mutex;
    use std::result::Result;
    use tempfile::tempdir;

    /// Store whose listing and readiness answers are scripted.
    struct ScriptedStore {
        listed: Vec<IndexInfo>,
        after_wait: IndexInfo,
        creates: Mutex<usize>,
        waits: Mutex<usize>,
    }

    impl ScriptedStore {
        fn new(listed: Vec<IndexInfo>, after_wait: IndexInfo) -> Self {
            Self {
                listed,
                after_wait,
                creates: Mutex::new(0),
                waits: Mutex::new(0),
            }
        }

        fn creates(&self) -> usize {
            *self.creates.lock().unwrap()
        }

        fn waits(&self) -> usize {
            *self.waits.lock().unwrap()
        }
    }

    impl VectorStore for ScriptedStore {
        fn name(&self) -> &str {
            "scripted"
        }

        fn list_indexes(&self) -> Result<Vec<IndexInfo>, StoreError> {
            Ok(self.listed.clone())
        }

        fn create_index(&self, _spec: &IndexSpec) -> Result<(), StoreError> {
            *self.creates.lock().unwrap() += 1;
            Ok(())
        }

        fn describe_index(&self, _name: &str) -> Result<Option<IndexInfo>, StoreError> {
            Ok(Some(self.after_wait.clone()))
        }

        fn wait_until_ready(&self, _name: &str) -> Result<IndexInfo, StoreError> {
            *self.waits.lock().unwrap() += 1;
            Ok(self.after_wait.clone())
        }

        fn upsert(&self, _index: &str, records: &[VectorRecord]) -> Result<usize, StoreError> {
            Ok(records.len())
        }

        fn query(
            &self,
            _index: &str,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<QueryMatch>, StoreError> {
            Ok(Vec::new())
        }
    }

    /// Embedder that drops the last vector of every batch.
    struct ShortEmbedder(MockEmbedder);

    impl Embedder for ShortEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            self.0.embed(text)
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            let mut vectors = self.0.embed_batch(texts)?;
            vectors.pop();
            Ok(vectors)
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions()
        }
    }

    fn info(dimension: usize, metric: Metric, ready: bool) -> IndexInfo {
        IndexInfo {
            name: "legal-chatbot".into(),
            dimension,
            metric,
            ready,
        }
    }

    fn spec(dimension: usize) -> IndexSpec {
        IndexSpec {
            name: "legal-chatbot".into(),
            dimension,
            metric: Metric::Cosine,
            cloud: "aws".into(),
            region: "us-east-1".into(),
        }
    }

    fn chunk(source: &str, page: Option<u64>, position: usize) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), Value::from(source));
        if let Some(page) = page {
            metadata.insert("page".into(), Value::from(page));
        }
        Chunk {
            content: "text".into(),
            metadata,
            position,
        }
    }

    #[test]
    fn test_record_id_is_stable() {
        let a = record_id(&chunk("data/a.pdf", Some(0), 1));
        assert_eq!(a.len(), 64);
        assert_eq!(a, record_id(&chunk("data/a.pdf", Some(0), 1)));
        assert_ne!(a, record_id(&chunk("data/a.pdf", Some(1), 1)));
        assert_ne!(a, record_id(&chunk("data/a.pdf", Some(0), 2)));
        assert_ne!(a, record_id(&chunk("data/b.pdf", Some(0), 1)));
        assert_ne!(
            record_id(&chunk("data/a.txt", None, 0)),
            record_id(&chunk("data/a.txt", Some(0), 0))
        );
    }

    #[test]
    fn test_ensure_index_create_then_exists() {
        let embedder = MockEmbedder::new(8);
        let store = SqliteStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));

        assert_eq!(indexer.ensure_index().unwrap(), EnsureOutcome::Created);
        assert_eq!(indexer.ensure_index().unwrap(), EnsureOutcome::AlreadyExists);
        assert_eq!(store.list_indexes().unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_index_mismatch() {
        let embedder = MockEmbedder::new(8);
        let store = SqliteStore::open_in_memory().unwrap();
        let mut other = spec(4);
        store.create_index(&other).unwrap();

        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        let err = indexer.ensure_index().unwrap_err();
        assert!(matches!(err, Error::IndexMismatch { .. }));

        other.name = "dot".into();
        other.dimension = 8;
        other.metric = Metric::Dotproduct;
        store.create_index(&other).unwrap();
        let mut wanted = spec(8);
        wanted.name = "dot".into();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), wanted);
        assert!(matches!(
            indexer.ensure_index().unwrap_err(),
            Error::IndexMismatch { .. }
        ));
    }

    #[test]
    fn test_ensure_index_waits_for_existing_index() {
        let embedder = MockEmbedder::new(8);
        let store = ScriptedStore::new(
            vec![info(8, Metric::Cosine, false)],
            info(8, Metric::Cosine, true),
        );
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));

        assert_eq!(indexer.ensure_index().unwrap(), EnsureOutcome::AlreadyExists);
        assert_eq!(store.waits(), 1);
        assert_eq!(store.creates(), 0);

        let ready = ScriptedStore::new(
            vec![info(8, Metric::Cosine, true)],
            info(8, Metric::Cosine, true),
        );
        let indexer = Indexer::new(&embedder, &ready, TextSplitter::default(), spec(8));
        assert_eq!(indexer.ensure_index().unwrap(), EnsureOutcome::AlreadyExists);
        assert_eq!(ready.waits(), 0);
    }

    #[test]
    fn test_ensure_index_verifies_shape_after_create() {
        // Not listed, but a concurrent creator made it with other dimensions
        let embedder = MockEmbedder::new(8);
        let store = ScriptedStore::new(Vec::new(), info(4, Metric::Cosine, true));
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        assert!(matches!(
            indexer.ensure_index().unwrap_err(),
            Error::IndexMismatch { .. }
        ));
        assert_eq!(store.creates(), 1);

        let store = ScriptedStore::new(Vec::new(), info(8, Metric::Euclidean, true));
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        assert!(matches!(
            indexer.ensure_index().unwrap_err(),
            Error::IndexMismatch { detail, .. } if detail.contains("euclidean")
        ));

        let store = ScriptedStore::new(Vec::new(), info(8, Metric::Cosine, true));
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        assert_eq!(indexer.ensure_index().unwrap(), EnsureOutcome::Created);
        assert_eq!(store.waits(), 1);
    }

    #[test]
    fn test_ensure_index_rejects_embedder_width() {
        let embedder = MockEmbedder::new(16);
        let store = SqliteStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        assert!(matches!(
            indexer.ensure_index().unwrap_err(),
            Error::IndexMismatch { .. }
        ));
        // Nothing was created
        assert!(store.list_indexes().unwrap().is_empty());
    }

    #[test]
    fn test_ingest_batches_and_text_metadata() {
        let dir = tempdir().unwrap();
        let body = "word ".repeat(600);
        fs::write(dir.path().join("act.txt"), &body).unwrap();

        let embedder = MockEmbedder::new(8);
        let store = SqliteStore::open_in_memory().unwrap();
        let splitter = TextSplitter::new(100, 10).unwrap();
        let indexer = Indexer::new(&embedder, &store, splitter, spec(8)).with_batch_size(4);
        indexer.ensure_index().unwrap();

        let report = indexer.ingest_directory(dir.path()).unwrap();
        assert_eq!(report.succeeded(), 1);
        let FileStatus::Indexed {
            documents,
            chunks,
            upserted,
        } = report.files[0].status
        else {
            panic!("expected success: {:?}", report.files[0]);
        };
        assert_eq!(documents, 1);
        assert!(chunks > 4);
        assert_eq!(upserted, chunks);
        assert_eq!(embedder.batch_calls(), chunks.div_ceil(4));
        assert_eq!(store.count("legal-chatbot").unwrap(), chunks);

        let hit = store.query("legal-chatbot", &embedder.embed("x").unwrap(), 1).unwrap();
        assert!(hit[0].text().unwrap().starts_with("word"));
        assert!(hit[0].metadata.contains_key("source"));
    }

    #[test]
    fn test_ingest_isolates_failures() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "Section 302 of the IPC").unwrap();
        fs::write(dir.path().join("b.xyz"), "unknown format").unwrap();
        fs::write(dir.path().join("c.txt"), "this one is POISON").unwrap();
        fs::write(dir.path().join("d.htm"), "<p>Article 21</p>").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("e.txt"), "skipped").unwrap();

        let embedder = MockEmbedder::new(8).failing_on("POISON");
        let store = SqliteStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        indexer.ensure_index().unwrap();

        let report = indexer.ingest_directory(dir.path()).unwrap();
        let names: Vec<String> = report
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.xyz", "c.txt", "d.htm"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert!(
            matches!(&report.files[1].status, FileStatus::Failed(msg) if msg.contains("unsupported"))
        );
        assert_eq!(store.count("legal-chatbot").unwrap(), 2);
    }

    #[test]
    fn test_short_embedding_batch_fails_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "word ".repeat(100)).unwrap();
        fs::write(dir.path().join("b.txt"), "Section 302 of the IPC").unwrap();

        let embedder = ShortEmbedder(MockEmbedder::new(8));
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_index(&spec(8)).unwrap();
        let splitter = TextSplitter::new(100, 10).unwrap();
        let indexer = Indexer::new(&embedder, &store, splitter, spec(8));

        let report = indexer.ingest_directory(dir.path()).unwrap();
        assert_eq!(report.failed(), 2);
        assert!(
            matches!(&report.files[0].status, FileStatus::Failed(msg) if msg.contains("returned"))
        );
        assert_eq!(store.count("legal-chatbot").unwrap(), 0);

        let err = indexer.ingest_file(&dir.path().join("a.txt")).unwrap_err();
        assert!(matches!(
            err,
            Error::Embedding(EmbedderError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_reingest_through_other_path_spelling() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("act.txt"), "word ".repeat(300)).unwrap();

        let embedder = MockEmbedder::new(8);
        let store = SqliteStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        indexer.ensure_index().unwrap();

        let first = indexer.ingest_directory(dir.path()).unwrap();
        let count = store.count("legal-chatbot").unwrap();
        assert!(count > 1);

        for spelling in [dir.path().join("."), dir.path().join("sub").join("..")] {
            let again = indexer.ingest_directory(&spelling).unwrap();
            assert_eq!(again.files[0].path, first.files[0].path);
            assert_eq!(store.count("legal-chatbot").unwrap(), count);
        }
    }

    #[test]
    fn test_ingest_missing_directory() {
        let embedder = MockEmbedder::new(8);
        let store = SqliteStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        let err = indexer
            .ingest_directory("/nonexistent/pineconedata")
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_empty_file_indexes_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), "").unwrap();

        let embedder = MockEmbedder::new(8);
        let store = SqliteStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&embedder, &store, TextSplitter::default(), spec(8));
        indexer.ensure_index().unwrap();

        let report = indexer.ingest_directory(dir.path()).unwrap();
        assert_eq!(
            report.files[0].status,
            FileStatus::Indexed {
                documents: 1,
                chunks: 0,
                upserted: 0
            }
        );
        assert_eq!(embedder.batch_calls(), 0);
    }
}
