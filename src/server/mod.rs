//! HTTP front-end.

pub mod routes;

use crate::chat::ConversationalSession;
use crate::config::HttpServerConfig;
use crate::error::{Result, PdfChatError};
use crate::library::IngestionCoordinator;
use std::future::Future;
use std::sync::{Arc, RwLock};

pub use routes::router;

/// State behind the HTTP handlers.
///
/// Starts uninitialized; chat requests fail with `NotInitialized` until a
/// session is installed.
pub struct ChatService {
    session: RwLock<Option<Arc<dyn ConversationalSession>>>,
    coordinator: Arc<IngestionCoordinator>,
}

impl ChatService {
    pub fn new(coordinator: Arc<IngestionCoordinator>) -> Self {
        Self {
            session: RwLock::new(None),
            coordinator,
        }
    }

    /// Make the service ready to answer
    pub fn install(&self, session: Arc<dyn ConversationalSession>) {
        let mut slot = self.session.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(session);
        log::info!("Chat session initialized");
    }

    pub fn is_ready(&self) -> bool {
        self.session.read().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    pub fn coordinator(&self) -> &IngestionCoordinator {
        &self.coordinator
    }

    /// Answer one message through the installed session
    pub async fn chat(&self, message: &str) -> Result<String> {
        let session = self
            .session
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(PdfChatError::NotInitialized)?;

        if message.trim().is_empty() {
            return Err(PdfChatError::InvalidInput("message must not be empty".to_string()));
        }

        session.respond(message).await
    }
}

/// Bind the listener, then initialize in the background while already serving.
///
/// `init` typically ingests new PDFs and opens the session. If it fails the
/// server keeps running and chat requests keep answering 503.
pub async fn serve<F>(
    config: &HttpServerConfig,
    port: u16,
    service: Arc<ChatService>,
    init: F,
) -> Result<()>
where
    F: Future<Output = Result<Arc<dyn ConversationalSession>>> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        PdfChatError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;

    log::info!("PDF Chat API listening on http://{}", addr);
    log::info!("Endpoints: GET / | GET /health | GET /pdfs | POST /chat");

    let background = Arc::clone(&service);
    tokio::spawn(async move {
        match init.await {
            Ok(session) => background.install(session),
            Err(e) => log::error!("Initialization failed, chat stays unavailable: {}", e),
        }
    });

    let app = router(service, &config.allowed_origins);
    axum::serve(listener, app).await.map_err(|e| {
        PdfChatError::Io(std::io::Error::other(format!("HTTP server error: {}", e)))
    })?;

    Ok(())
}
