use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Every section has defaults, so an absent `config.toml` yields a working
/// setup that mirrors the classic `pdf/` + `pdf/processed/` layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Filesystem layout of the PDF library
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Folder users drop new PDFs into
    #[serde(default = "default_pdf_folder")]
    pub pdf_folder: PathBuf,
    /// Append-only folder holding PDFs that are already in the knowledge store
    #[serde(default = "default_processed_folder")]
    pub processed_folder: PathBuf,
    /// Parent of the per-attempt staging directories
    #[serde(default = "default_staging_folder")]
    pub staging_folder: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            pdf_folder: default_pdf_folder(),
            processed_folder: default_processed_folder(),
            staging_folder: default_staging_folder(),
        }
    }
}

fn default_pdf_folder() -> PathBuf {
    PathBuf::from("pdf")
}

fn default_processed_folder() -> PathBuf {
    PathBuf::from("pdf/processed")
}

fn default_staging_folder() -> PathBuf {
    PathBuf::from("temp_pdf_processing")
}

/// Knowledge store location
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            table_name: default_table_name(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tmp/pdfchat.db")
}

fn default_table_name() -> String {
    "pdf_documents".to_string()
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Requested vector length; only text-embedding-3 models accept it, so it
    /// is left out of requests unless set
    #[serde(default)]
    pub dimensions: Option<usize>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            dimensions: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    1000
}

/// Conversational session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Number of previous question/answer turns sent along with a new question
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// System instructions; the built-in PDF-only instructions are used when unset
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            api_key_env: default_api_key_env(),
            history_turns: default_history_turns(),
            max_context_chunks: default_max_context_chunks(),
            min_score: default_min_score(),
            temperature: default_temperature(),
            instructions: None,
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_history_turns() -> usize {
    3
}

fn default_max_context_chunks() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.2
}

fn default_temperature() -> f32 {
    0.2
}

/// Performance tuning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_chunk_overlap_tokens")]
    pub chunk_overlap_tokens: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size_tokens(),
            chunk_overlap_tokens: default_chunk_overlap_tokens(),
        }
    }
}

fn default_chunk_size_tokens() -> usize {
    300
}

fn default_chunk_overlap_tokens() -> usize {
    50
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8001
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for a config file in this order:
    /// 1. Path specified in PDFCHAT_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory (optional)
    ///
    /// Model and store identifiers can then be overridden from the environment.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let mut config = match std::env::var("PDFCHAT_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let path = Path::new("config.toml");
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    log::debug!("No config.toml found, using defaults");
                    Config::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a config file without consulting the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("PDFCHAT_CHAT_MODEL") {
            self.chat.model = model;
        }
        if let Ok(model) = std::env::var("PDFCHAT_EMBEDDING_MODEL") {
            self.embeddings.model = model;
        }
        if let Ok(table) = std::env::var("PDFCHAT_TABLE_NAME") {
            self.knowledge.table_name = table;
        }
        if let Ok(path) = std::env::var("PDFCHAT_DB_PATH") {
            self.knowledge.db_path = PathBuf::from(path);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.knowledge.table_name.trim().is_empty() {
            anyhow::bail!("knowledge.table_name must not be empty");
        }

        if self.library.pdf_folder == self.library.processed_folder {
            anyhow::bail!("library.processed_folder must differ from library.pdf_folder");
        }

        if self.library.pdf_folder == self.library.staging_folder {
            anyhow::bail!("library.staging_folder must differ from library.pdf_folder");
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("embeddings.batch_size must be greater than 0");
        }

        if self.embeddings.dimensions == Some(0) {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.chat.max_context_chunks == 0 {
            anyhow::bail!("chat.max_context_chunks must be greater than 0");
        }

        if self.chat.min_score < 0.0 || self.chat.min_score > 1.0 {
            anyhow::bail!("chat.min_score must be between 0.0 and 1.0");
        }

        if self.performance.chunk_size_tokens == 0 {
            anyhow::bail!("performance.chunk_size_tokens must be greater than 0");
        }

        if self.performance.chunk_overlap_tokens >= self.performance.chunk_size_tokens {
            anyhow::bail!("performance.chunk_overlap_tokens must be less than chunk_size_tokens");
        }

        Ok(())
    }

    /// Read the embeddings API key from the configured environment variable
    pub fn embeddings_api_key(&self) -> Result<String> {
        read_api_key(&self.embeddings.api_key_env)
    }

    /// Read the chat API key from the configured environment variable
    pub fn chat_api_key(&self) -> Result<String> {
        read_api_key(&self.chat.api_key_env)
    }

    pub fn pdf_folder(&self) -> &Path {
        &self.library.pdf_folder
    }

    pub fn processed_folder(&self) -> &Path {
        &self.library.processed_folder
    }

    pub fn staging_folder(&self) -> &Path {
        &self.library.staging_folder
    }

    pub fn db_path(&self) -> &Path {
        &self.knowledge.db_path
    }
}

fn read_api_key(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| {
        format!(
            "Environment variable {} not set. Set it in your .env file \
             or as an environment variable with your OpenAI API key.",
            var
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn with_config_env(config_path: Option<&Path>, f: impl FnOnce()) {
        let original = std::env::var("PDFCHAT_CONFIG").ok();
        match config_path {
            Some(p) => std::env::set_var("PDFCHAT_CONFIG", p),
            None => std::env::remove_var("PDFCHAT_CONFIG"),
        }
        f();
        std::env::remove_var("PDFCHAT_CONFIG");
        if let Some(val) = original {
            std::env::set_var("PDFCHAT_CONFIG", val);
        }
    }

    #[test]
    fn test_defaults_match_classic_layout() {
        let config = Config::default();
        assert_eq!(config.pdf_folder(), Path::new("pdf"));
        assert_eq!(config.processed_folder(), Path::new("pdf/processed"));
        assert_eq!(config.knowledge.table_name, "pdf_documents");
        assert_eq!(config.embeddings.model, "text-embedding-3-small");
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.chat.history_turns, 3);
        assert_eq!(config.http_server.port, 8001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[library]
pdf_folder = "docs"

[chat]
model = "gpt-4o-mini"
history_turns = 5

[http_server]
port = 9000
"#,
        )
        .unwrap();

        with_config_env(Some(&config_path), || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.pdf_folder(), Path::new("docs"));
            assert_eq!(config.processed_folder(), Path::new("pdf/processed"));
            assert_eq!(config.chat.model, "gpt-4o-mini");
            assert_eq!(config.chat.history_turns, 5);
            assert_eq!(config.http_server.port, 9000);
            assert_eq!(config.embeddings.batch_size, 100);
        });
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[performance]\nchunk_size_tokens = 100\nchunk_overlap_tokens = 100\n",
        )
        .unwrap();

        with_config_env(Some(&config_path), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("chunk_overlap_tokens"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        with_config_env(Some(Path::new("nonexistent.toml")), || {
            assert!(Config::load().is_err());
        });
    }

    #[test]
    fn test_missing_api_key_names_variable() {
        let mut config = Config::default();
        config.chat.api_key_env = "PDFCHAT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = config.chat_api_key().unwrap_err();
        assert!(err.to_string().contains("PDFCHAT_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_dimensions_unset_by_default() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[embeddings]\nmodel = \"text-embedding-ada-002\"\n").unwrap();

        with_config_env(Some(&config_path), || {
            let config = Config::load().unwrap();
            assert_eq!(config.embeddings.model, "text-embedding-ada-002");
            assert_eq!(config.embeddings.dimensions, None);
        });
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut config = Config::default();
        config.embeddings.dimensions = Some(0);
        assert!(config.validate().is_err());

        config.embeddings.dimensions = Some(512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_processed_folder_must_differ_from_input() {
        let mut config = Config::default();
        config.library.processed_folder = config.library.pdf_folder.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("processed_folder"));
    }

    #[test]
    fn test_min_score_out_of_range() {
        let mut config = Config::default();
        config.chat.min_score = 1.5;
        assert!(config.validate().is_err());
    }
}
