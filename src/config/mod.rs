// Configuration management module
// Handles TOML configuration for the corpus, embedding backend, and retrieval


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

/// File name of the persisted vector index inside the index directory.
pub const INDEX_FILE_NAME: &str = "vectors.bin";
/// File name of the persisted metadata store inside the index directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid top-k: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid preview length: {0} (must be between 1 and 100000 characters)")]
    InvalidPreviewChars(usize),
    #[error("Invalid context length: {0} (must be between 1 and 1000000 characters)")]
    InvalidContextChars(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    /// Directory this configuration was loaded from; artifacts live beneath it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "all-minilm:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Locations of the two corpus directories scanned at build time.
/// Relative paths resolve against the working directory of the build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorpusConfig {
    pub laws_dir: PathBuf,
    pub qa_dir: PathBuf,
}

impl Default for CorpusConfig {
    #[inline]
    fn default() -> Self {
        Self {
            laws_dir: PathBuf::from("data/laws"),
            qa_dir: PathBuf::from("data/qa"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of passages returned per query.
    pub top_k: usize,
    /// Characters of normalized text kept in the metadata store at build time.
    pub stored_preview_chars: usize,
    /// Characters of each passage shown in search output.
    pub display_preview_chars: usize,
    /// Characters of each passage used when assembling a context block.
    pub context_chars: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 10,
            stored_preview_chars: 500,
            display_preview_chars: 300,
            context_chars: 1200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the persisted index pair. Relative paths resolve
    /// against the configuration directory; unset means `<config dir>/index`.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `config.toml` under the given directory,
    /// falling back to defaults when no file exists yet.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Validate and write the configuration to its `config.toml`.
    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Cannot save invalid configuration")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Default per-user configuration directory.
    #[inline]
    pub fn config_dir() -> std::result::Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("lexrag"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.ollama.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Directory holding the persisted index pair.
    #[inline]
    pub fn index_dir(&self) -> PathBuf {
        match &self.index.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.join("index"),
        }
    }

    #[inline]
    pub fn vectors_path(&self) -> PathBuf {
        self.index_dir().join(INDEX_FILE_NAME)
    }

    #[inline]
    pub fn metadata_path(&self) -> PathBuf {
        self.index_dir().join(METADATA_FILE_NAME)
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.base_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    /// Base URL of the Ollama server this configuration points at.
    #[inline]
    pub fn base_url(&self) -> std::result::Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > 1000 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if self.stored_preview_chars == 0 || self.stored_preview_chars > 100_000 {
            return Err(ConfigError::InvalidPreviewChars(self.stored_preview_chars));
        }

        if self.display_preview_chars == 0 || self.display_preview_chars > 100_000 {
            return Err(ConfigError::InvalidPreviewChars(self.display_preview_chars));
        }

        if self.context_chars == 0 || self.context_chars > 1_000_000 {
            return Err(ConfigError::InvalidContextChars(self.context_chars));
        }

        Ok(())
    }
}

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> std::result::Result<PathBuf, ConfigError> {
    Config::config_dir()
}
