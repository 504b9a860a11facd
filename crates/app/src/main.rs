mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{ingest_path, DocumentStore, IngestionReport, RagConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file; RAG_* environment variables override it.
    #[arg(long, env = "RAG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "RAG_BIND", default_value = "0.0.0.0:8070")]
        bind: String,
        /// Document or folder to ingest before accepting requests.
        #[arg(long)]
        preload: Option<PathBuf>,
    },
    /// Upload a document, or every supported document under a folder.
    Upload {
        #[arg(long)]
        path: PathBuf,
    },
    /// List registered documents.
    List,
    /// Ask a question about one document.
    Query {
        #[arg(long)]
        doc_id: String,
        #[arg(long)]
        question: String,
        /// Number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Delete a document together with its vectors and stored file.
    Delete {
        #[arg(long)]
        doc_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index = ?config.index.backend,
        embedding = ?config.embedding.backend,
        "pdf-rag boot"
    );

    let store = config
        .open_store()
        .await
        .context("failed to open document store")?;

    match cli.command {
        Command::Serve { bind, preload } => serve(store, &bind, preload.as_deref()).await?,
        Command::Upload { path } => {
            let report = ingest_path(&store, &path).await?;
            print_report(&report);
        }
        Command::List => {
            let documents = store.list_documents().await;
            if documents.is_empty() {
                println!("no documents registered");
            }
            for document in documents {
                println!(
                    "{} chunks={} filename={}",
                    document.doc_id, document.chunk_count, document.filename
                );
            }
        }
        Command::Query {
            doc_id,
            question,
            top_k,
        } => {
            let answer = store.query(&question, &doc_id, top_k).await?;
            println!("answer: {}", answer.answer);
            for (rank, source) in answer.sources.iter().enumerate() {
                println!("[{}] {source}", rank + 1);
            }
        }
        Command::Delete { doc_id } => {
            if store.delete_document(&doc_id).await? {
                println!("deleted {doc_id}");
            } else {
                println!("document not found: {doc_id}");
            }
        }
    }

    Ok(())
}

async fn serve(store: DocumentStore, bind: &str, preload: Option<&Path>) -> anyhow::Result<()> {
    let mut preloaded = Vec::new();
    if let Some(path) = preload {
        match ingest_path(&store, path).await {
            Ok(report) => {
                print_report(&report);
                preloaded = report.added.into_iter().map(|document| document.doc_id).collect();
            }
            Err(error) => warn!(path = %path.display(), %error, "preload failed"),
        }
    }

    let state = server::AppState::new(store).with_preloaded(preloaded);
    let app = server::router(Arc::new(state));
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind to {bind}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

fn print_report(report: &IngestionReport) {
    for document in &report.added {
        println!(
            "{} chunks={} filename={}",
            document.doc_id, document.chunk_count, document.filename
        );
    }
    for skipped in &report.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
    }
    println!(
        "{} document(s) ingested, {} skipped at {}",
        report.added.len(),
        report.skipped_files.len(),
        Utc::now().to_rfc3339()
    );
}
