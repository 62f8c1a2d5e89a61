use thiserror::Error;

pub type Result<T> = std::result::Result<T, LexragError>;

#[derive(Error, Debug)]
pub enum LexragError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Index build produced no usable documents: {0}")]
    EmptyCorpus(String),

    #[error("Failed to load index artifacts: {0}")]
    Load(String),

    #[error("Corrupt index: no metadata entry for document id {0}")]
    CorruptIndex(i64),

    #[error("Metadata entry not found for document id {0}")]
    NotFound(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for LexragError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod builder;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod metadata;
pub mod retriever;
