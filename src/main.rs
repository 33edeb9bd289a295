use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use legalbot::config::{Backend, Config};
use legalbot::embedder::Embedder;
use legalbot::embedder::download::download_model_files;
use legalbot::embedder::onnx::OnnxEmbedder;
use legalbot::indexer::{FileStatus, IngestReport, Indexer};
use legalbot::legal::{LegalProfile, Response, build_context};
use legalbot::store::VectorStore;
use legalbot::store::pinecone::PineconeStore;
use legalbot::store::sqlite::SqliteStore;

#[derive(Parser)]
#[command(name = "legalbot")]
#[command(about = "Legal research RAG toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, global = true, default_value = legalbot::config::DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk, embed and upsert every file of the data directory
    Ingest {
        /// Directory to ingest (default: `data_dir` from the config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Report whether a query is treated as a legal question
    Classify {
        query: Vec<String>,
    },

    /// Retrieve context for a query and print the prompt or the refusal
    Ask {
        query: Vec<String>,

        /// Number of passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// File with earlier conversation lines, one per line
        #[arg(long)]
        context_file: Option<PathBuf>,
    },

    /// Download the embedding model files
    DownloadModel,
}

fn main() -> Result<()> {
    // .env is optional; real environment variables take precedence
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Ingest { dir } => cmd_ingest(&config, dir),
        Commands::Classify { query } => cmd_classify(&config, &query.join(" ")),
        Commands::Ask {
            query,
            top_k,
            context_file,
        } => cmd_ask(
            &config,
            &query.join(" "),
            top_k.unwrap_or(config.search_top_k),
            context_file.as_deref(),
        ),
        Commands::DownloadModel => {
            download_model_files(&config.model.name, &config.model_dir())?;
            println!("Model files ready in {}", config.model_dir().display());
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<Box<dyn VectorStore>> {
    match config.store.backend {
        Backend::Pinecone => {
            let api_key = config.api_key()?;
            let store = PineconeStore::new(
                api_key,
                Duration::from_secs(config.store.request_timeout_secs),
                Duration::from_secs(config.store.ready_timeout_secs),
            )?;
            Ok(Box::new(store))
        }
        Backend::Sqlite => Ok(Box::new(
            SqliteStore::open(&config.store.sqlite_path)
                .context("failed to open local vector store")?,
        )),
    }
}

fn load_embedder(config: &Config) -> Result<OnnxEmbedder> {
    let model_dir = config.model_dir();
    download_model_files(&config.model.name, &model_dir)?;
    OnnxEmbedder::new(&model_dir).context("failed to load embedding model")
}

fn load_profile(config: &Config) -> Result<LegalProfile> {
    match &config.profile_path {
        Some(path) => LegalProfile::load(path),
        None => Ok(LegalProfile::default()),
    }
}

fn cmd_ingest(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from(&config.data_dir));
    let splitter = config.splitter()?;

    // Credentials are checked before any model or file work
    let store = open_store(config)?;
    let embedder = load_embedder(config)?;

    let indexer = Indexer::new(&embedder, store.as_ref(), splitter, config.index_spec())
        .with_batch_size(config.embed_batch_size);
    let outcome = indexer.ensure_index()?;
    info!("Index {}: {outcome:?}", config.index.name);

    let report = indexer
        .ingest_directory(&dir)
        .with_context(|| format!("failed to read data directory {}", dir.display()))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    for file in &report.files {
        match &file.status {
            FileStatus::Indexed {
                documents,
                chunks,
                upserted,
            } => println!(
                "ok    {}  documents={documents} chunks={chunks} upserted={upserted}",
                file.path.display()
            ),
            FileStatus::Failed(message) => {
                println!("error {}  {message}", file.path.display());
            }
        }
    }
    println!(
        "{} files: {} succeeded, {} failed, {} chunks",
        report.files.len(),
        report.succeeded(),
        report.failed(),
        report.total_chunks()
    );
}

fn cmd_classify(config: &Config, query: &str) -> Result<()> {
    let profile = load_profile(config)?;
    println!("{}", profile.classify(query));
    Ok(())
}

fn cmd_ask(config: &Config, query: &str, top_k: usize, context_file: Option<&Path>) -> Result<()> {
    let profile = load_profile(config)?;
    let response = profile.respond(query, || -> Result<String> {
        let history: Vec<String> = match context_file {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?
                .lines()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        let store = open_store(config)?;
        let embedder = load_embedder(config)?;
        let vector = embedder.embed(query)?;
        let matches = store.query(&config.index.name, &vector, top_k)?;
        if matches.is_empty() {
            warn!("No passages retrieved from {}", config.index.name);
        }
        Ok(build_context(&history, &matches))
    })?;

    match response {
        Response::Prompt(prompt) => println!("{prompt}"),
        Response::Refusal(refusal) => println!("{refusal}"),
    }
    Ok(())
}
