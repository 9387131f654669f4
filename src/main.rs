use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfchat::chat::{ConversationalSession, OpenAIChat, RagSession};
use pdfchat::cli::{run_loop, TerminalInput};
use pdfchat::db::Db;
use pdfchat::embeddings::{OpenAIEmbedder, QueryEmbeddingCache};
use pdfchat::knowledge::{KnowledgeStore, SqliteKnowledgeStore};
use pdfchat::library::{list_pdfs, pending_pdfs, sweep_stale, IngestionCoordinator};
use pdfchat::server::{self, ChatService};
use pdfchat::watch::run_watcher;
use pdfchat::Config;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser, Debug)]
#[command(name = "pdfchat", version)]
#[command(about = "Chat with a folder of PDF documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat in the terminal (default)
    Chat,
    /// Serve the chat HTTP API
    Serve {
        /// Port to listen on (defaults to http_server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ingest new PDFs once and exit
    Ingest,
    /// Watch the PDF folder and ingest new files as they arrive
    Watch {
        /// Quiet period in milliseconds before a change is acted on
        #[arg(long, default_value = "500")]
        debounce_ms: u64,
    },
    /// List processed and pending PDFs
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info"),
    )
    .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Serve { port } => run_server(config, port).await,
        Command::Ingest => run_ingest(config).await,
        Command::Watch { debounce_ms } => run_watch(config, debounce_ms).await,
        Command::List => run_list(&config),
    }
}

/// Embedder with the question cache attached when enabled
fn build_embedder(config: &Config) -> Result<OpenAIEmbedder> {
    let api_key = config.embeddings_api_key()?;
    let mut embedder = OpenAIEmbedder::new(
        api_key,
        config.embeddings.model.clone(),
        config.embeddings.batch_size,
    )?;
    if let Some(dimensions) = config.embeddings.dimensions {
        embedder = embedder.with_dimensions(dimensions);
    }

    Ok(if config.embeddings.cache_capacity > 0 {
        embedder.with_cache(Arc::new(QueryEmbeddingCache::new(config.embeddings.cache_capacity)))
    } else {
        embedder
    })
}

/// Clear leftovers of a crashed run, then open the store and its coordinator
async fn open_library(
    config: &Config,
) -> Result<(Arc<dyn KnowledgeStore>, Arc<IngestionCoordinator>)> {
    sweep_stale(config.staging_folder())
        .with_context(|| format!("Failed to clear {}", config.staging_folder().display()))?;

    let embedder = Arc::new(build_embedder(config)?);
    let store: Arc<dyn KnowledgeStore> = Arc::new(
        SqliteKnowledgeStore::create_or_open(
            Db::new(config.db_path()),
            config.knowledge.table_name.clone(),
            embedder,
            config.performance.clone(),
        )
        .await?,
    );
    let coordinator = Arc::new(IngestionCoordinator::new(&config.library, Arc::clone(&store)));
    Ok((store, coordinator))
}

fn build_session(
    config: &Config,
    store: Arc<dyn KnowledgeStore>,
) -> Result<Arc<dyn ConversationalSession>> {
    if !store.ready() {
        anyhow::bail!("Knowledge store is not ready");
    }
    let model = OpenAIChat::new(
        config.chat_api_key()?,
        config.chat.model.clone(),
        config.chat.temperature,
    )?;
    log::info!("Chat model: {}", model.model());
    Ok(Arc::new(RagSession::new(&config.chat, store, Arc::new(model))))
}

/// Run one ingestion, reporting rather than propagating a failure
async fn ingest_on_startup(coordinator: &IngestionCoordinator) {
    match coordinator.ingest_new_documents().await {
        Ok(report) if report.count() > 0 => log::info!("Ingested {} new PDF(s)", report.count()),
        Ok(_) => {}
        Err(e) => log::error!("Error processing PDFs: {}", e),
    }
}

async fn run_chat(config: Config) -> Result<()> {
    let (store, coordinator) = open_library(&config).await?;
    ingest_on_startup(&coordinator).await;

    let session = build_session(&config, Arc::clone(&store))?;
    log::info!(
        "Knowledge store holds {} document(s)",
        store.document_count().await?
    );

    // The line editor sees Ctrl+C at the prompt; this covers in-flight work
    let interrupt = Arc::new(Notify::new());
    let listener = {
        let interrupt = Arc::clone(&interrupt);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                interrupt.notify_one();
            }
        })
    };

    let mut input = TerminalInput::new()?;
    let mut stdout = std::io::stdout();
    let result =
        run_loop(&mut input, &mut stdout, &coordinator, session.as_ref(), &interrupt).await;
    listener.abort();
    result?;
    Ok(())
}

async fn run_server(config: Config, port: Option<u16>) -> Result<()> {
    log::info!("Starting PDF Chat API v{}", env!("CARGO_PKG_VERSION"));
    let (store, coordinator) = open_library(&config).await?;
    let service = Arc::new(ChatService::new(Arc::clone(&coordinator)));

    let init_config = config.clone();
    let init = async move {
        ingest_on_startup(&coordinator).await;
        build_session(&init_config, store)
            .map_err(|e| pdfchat::PdfChatError::Config(format!("{:#}", e)))
    };

    let port = port.unwrap_or(config.http_server.port);
    server::serve(&config.http_server, port, service, init).await?;
    Ok(())
}

async fn run_ingest(config: Config) -> Result<()> {
    let (store, coordinator) = open_library(&config).await?;
    let report = coordinator.ingest_new_documents().await?;

    println!("Ingested {} new PDF(s)", report.count());
    for name in &report.move_failures {
        println!("  {} was indexed but could not be moved to processed", name);
    }
    println!(
        "Knowledge store '{}' holds {} document(s)",
        config.knowledge.table_name,
        store.document_count().await?
    );
    Ok(())
}

async fn run_watch(config: Config, debounce_ms: u64) -> Result<()> {
    let (_store, coordinator) = open_library(&config).await?;
    ingest_on_startup(&coordinator).await;

    log::info!("Watching for new PDFs (Ctrl+C to stop)");
    run_watcher(coordinator, config.processed_folder().to_path_buf(), debounce_ms).await?;
    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    let processed = if config.processed_folder().is_dir() {
        list_pdfs(config.processed_folder())?
    } else {
        Vec::new()
    };
    let pending = pending_pdfs(config.pdf_folder(), config.processed_folder())?;

    println!("Processed PDFs ({}):", processed.len());
    for name in &processed {
        println!("  - {}", name);
    }
    println!("Pending PDFs ({}):", pending.len());
    for name in &pending {
        println!("  - {}", name);
    }
    Ok(())
}
