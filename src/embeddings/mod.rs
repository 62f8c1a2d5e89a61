// Embeddings module
// Handles Ollama integration for document and query embeddings

pub mod ollama;

pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient, l2_normalize};
