pub mod config;
pub mod error;
pub mod db;
pub mod embeddings;
pub mod knowledge;
pub mod library;
pub mod chat;
pub mod cli;
pub mod server;
pub mod watch;

pub use config::Config;
pub use error::{PdfChatError, Result};
