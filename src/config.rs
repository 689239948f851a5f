//! Configuration module for the retrieval service.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RAG_` and use double underscores
//! to separate nested levels:
//! - `RAG_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`
//! - `RAG_EMBEDDING__MODEL=e5-small` sets `embedding.model`
//! - `RAG_SERVER__BIND=0.0.0.0:8000` sets `server.bind`

use crate::answer::PromptConfig;
use crate::corpus::ChunkerConfig;
use crate::error::{RagError, RagResult};
use crate::vector::{DEFAULT_BATCH_SIZE, EmbeddingModelName};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding `settings.toml`, searched for from the cwd upwards.
pub const CONFIG_DIR: &str = ".support-rag";
pub const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "RAG_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory of scraped `*.json` pages
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding index generations
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .support-rag is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chunking: ChunkerConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub answer: PromptConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Model used for builds and as the default for queries
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Where model weights are downloaded; platform cache dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Bound on a single model load in seconds, 0 disables it
    #[serde(default = "default_model_load_timeout")]
    pub load_timeout_secs: u64,

    #[serde(default)]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Bound on loading an index generation in seconds, 0 disables it
    #[serde(default = "default_index_load_timeout")]
    pub load_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// HTTP server bind address
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data/jiopay")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("data/index")
}
fn default_embedding_model() -> String {
    EmbeddingModelName::AllMiniLmL6V2.to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_model_load_timeout() -> u64 {
    300
}
fn default_top_k() -> usize {
    5
}
fn default_index_load_timeout() -> u64 {
    30
}
fn default_bind_address() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            index_path: default_index_path(),
            workspace_root: None,
            debug: false,
            embedding: EmbeddingConfig::default(),
            chunking: ChunkerConfig::default(),
            retrieval: RetrievalConfig::default(),
            answer: PromptConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            cache_dir: None,
            load_timeout_secs: default_model_load_timeout(),
            show_download_progress: false,
        }
    }
}

impl EmbeddingConfig {
    pub fn load_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.load_timeout_secs)
    }

    /// Model weight directory: configured, else the platform cache dir.
    pub fn models_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("support-rag").join("models"))
                .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("models"))
        })
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            load_timeout_secs: default_index_load_timeout(),
        }
    }
}

impl RetrievalConfig {
    pub fn load_timeout(&self) -> Option<Duration> {
        timeout_from_secs(self.load_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .support-rag directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::layered(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::layered(path.as_ref()).extract().map_err(Box::new)
    }

    fn layered(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores stay
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace config by looking for .support-rag directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .support-rag is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolve a configured path against the workspace root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Check values that parse fine but cannot work.
    pub fn validate(&self) -> RagResult<()> {
        EmbeddingModelName::parse(&self.embedding.model)?;
        if self.embedding.batch_size == 0 {
            return Err(RagError::invalid_argument("embedding.batch_size must be positive"));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::invalid_argument("retrieval.top_k must be positive"));
        }
        self.chunking.validate()?;
        if !(0.0..=1.0).contains(&self.answer.min_score) {
            return Err(RagError::invalid_argument("answer.min_score must be within [0, 1]"));
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::init_config_file_in(Path::new("."), force)
    }

    /// Write the commented template under `root/.support-rag/`.
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        // Create parent directory if needed
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let defaults = Settings::default();
        let template = format!(
            r#"# support-rag configuration

# Version of the configuration schema
version = {version}

# Directory of scraped pages (*.json with url, title, text)
data_dir = "{data_dir}"

# Directory holding index generations (relative to workspace root)
index_path = "{index_path}"

# Verbose logging
debug = false

[embedding]
# One of: {models}
model = "{model}"

# Texts per embedding call
batch_size = {batch_size}

# Where model weights are downloaded; defaults to the platform cache dir
# cache_dir = "/path/to/models"

# Seconds before a model load is abandoned (0 = wait forever)
load_timeout_secs = {model_timeout}

show_download_progress = false

[chunking]
max_chars = {max_chars}
overlap_chars = {overlap_chars}
min_chars = {min_chars}

[retrieval]
top_k = {top_k}

# Seconds before loading an index generation is abandoned (0 = wait forever)
load_timeout_secs = {index_timeout}

[answer]
product = "{product}"
fallback = "{fallback}"
max_context_chars = {max_context}
snippet_chars = {snippet}
min_score = {min_score}
max_sentences = {max_sentences}

[server]
bind = "{bind}"
allowed_origins = ["{origin}"]
"#,
            version = defaults.version,
            data_dir = defaults.data_dir.display(),
            index_path = defaults.index_path.display(),
            models = EmbeddingModelName::supported_list(),
            model = defaults.embedding.model,
            batch_size = defaults.embedding.batch_size,
            model_timeout = defaults.embedding.load_timeout_secs,
            max_chars = defaults.chunking.max_chars,
            overlap_chars = defaults.chunking.overlap_chars,
            min_chars = defaults.chunking.min_chars,
            top_k = defaults.retrieval.top_k,
            index_timeout = defaults.retrieval.load_timeout_secs,
            product = defaults.answer.product,
            fallback = defaults.answer.fallback,
            max_context = defaults.answer.max_context_chars,
            snippet = defaults.answer.snippet_chars,
            min_score = defaults.answer.min_score,
            max_sentences = defaults.answer.max_sentences,
            bind = defaults.server.bind,
            origin = default_allowed_origins().join("\", \""),
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}
