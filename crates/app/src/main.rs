use chrono::Utc;
use clap::{Parser, Subcommand};
use report_rag_core::{
    assemble_context, Embedder, HashingEmbedder, HttpEmbedder, RetrievalConfig,
    RetrievalCoordinator, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::fs;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "report-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the vector index and store files
    #[arg(long, env = "RAG_DATA_DIR", default_value = "data/vectors")]
    data_dir: String,

    /// Remote embedding endpoint (OpenAI-compatible /embeddings); uses the
    /// local hashing embedder when unset
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Model id sent to the remote embedding endpoint
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "all-MiniLM-L6-v2")]
    embedding_model: String,

    /// Bearer token for the remote embedding endpoint
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Embedding dimension; must match any existing index on disk
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest extracted report text, replacing any previous vectors for the document.
    Ingest {
        /// File containing the extracted text
        #[arg(long)]
        file: String,
        /// Document id; generated when omitted
        #[arg(long)]
        document_id: Option<String>,
        /// Original filename recorded in metadata; defaults to the input file name
        #[arg(long)]
        filename: Option<String>,
        /// Extraction method tag (e.g. pdf_text, pdf_ocr, image_ocr)
        #[arg(long, default_value = "pdf_text")]
        method: String,
    },
    /// Retrieve the chunks of one document most similar to a query.
    Query {
        /// Document id to search within
        #[arg(long)]
        document_id: String,
        /// Query text
        #[arg(long)]
        query: String,
        /// Number of chunks to return
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Print one joined context bounded to this many characters instead of a list
        #[arg(long)]
        context_chars: Option<usize>,
    },
    /// Delete all vectors for a document.
    Delete {
        /// Document id to delete
        #[arg(long)]
        document_id: String,
    },
    /// Store unscoped reference knowledge alongside document vectors.
    Feed {
        /// File containing the knowledge text
        #[arg(long)]
        file: String,
        /// Source label recorded in metadata
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Print store and index counters.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir,
        "report-rag boot"
    );

    let config = RetrievalConfig::new(&cli.data_dir);

    match &cli.embedding_endpoint {
        Some(endpoint) => {
            let embedder = HttpEmbedder::new(
                endpoint,
                &cli.embedding_model,
                cli.embedding_api_key.clone(),
                cli.embedding_dimensions,
            )?;
            let engine = RetrievalCoordinator::open(config, embedder)?;
            run(engine, cli.command).await
        }
        None => {
            let embedder = HashingEmbedder {
                dimensions: cli.embedding_dimensions,
            };
            let engine = RetrievalCoordinator::open(config, embedder)?;
            run(engine, cli.command).await
        }
    }
}

async fn run<E>(mut engine: RetrievalCoordinator<E>, command: Command) -> anyhow::Result<()>
where
    E: Embedder + Send + Sync,
{
    match command {
        Command::Ingest {
            file,
            document_id,
            filename,
            method,
        } => {
            let text = fs::read_to_string(&file)?;
            let document_id = document_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let filename = filename.unwrap_or_else(|| {
                Path::new(&file)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("unknown")
                    .to_string()
            });

            let count = engine
                .ingest_text(&document_id, &filename, &text, &method)
                .await?;
            if count == 0 {
                println!("0 chunks ingested (no usable text in {file})");
            } else {
                println!("{count} chunks ingested for document {document_id}");
            }
        }
        Command::Query {
            document_id,
            query,
            top_k,
            context_chars,
        } => {
            let snippets = engine.retrieve(&document_id, &query, top_k).await?;
            if snippets.is_empty() {
                println!("no grounding found for document {document_id}");
            } else if let Some(budget) = context_chars {
                println!("{}", assemble_context(&snippets, budget));
            } else {
                for (rank, text) in snippets.iter().enumerate() {
                    println!("[{}] {text}", rank + 1);
                }
            }
        }
        Command::Delete { document_id } => {
            let removed = engine.delete_document(&document_id)?;
            println!("{removed} vectors removed for document {document_id}");
        }
        Command::Feed { file, source } => {
            let text = fs::read_to_string(&file)?;
            let count = engine.feed_knowledge(&source, &text).await?;
            println!("{count} knowledge chunks stored from source {source}");
        }
        Command::Stats => {
            let stats = engine.stats();
            println!(
                "vectors={} documents={} next_id={}",
                stats.vectors, stats.documents, stats.next_id
            );
        }
    }

    Ok(())
}
