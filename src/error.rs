use thiserror::Error;

/// Main error type for pdfchat
#[derive(Error, Debug)]
pub enum PdfChatError {
    /// Knowledge store database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Chat completion errors (hosted model or session)
    #[error("Chat error: {0}")]
    Chat(String),

    /// PDF text extraction errors
    #[error("Extraction error: {0}")]
    Extract(String),

    /// Staging a batch failed before anything was submitted
    #[error("Staging error: {0}")]
    Staging(String),

    /// The chat service was used before initialization finished
    #[error("Agent not initialized")]
    NotInitialized,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using PdfChatError
pub type Result<T> = std::result::Result<T, PdfChatError>;
